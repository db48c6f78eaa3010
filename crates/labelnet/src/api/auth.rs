//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs whose `sub` claim is the profile name. A profile is
//! created the first time its name is seen.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use labelnet_structs::{PROFILE_NAME_MAX_LEN, Profile, check_name};
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Profile name
    pub sub: String,
    pub exp: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("malformed authorization header")]
    MalformedHeader,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("invalid profile name")]
    InvalidName,
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        tracing::debug!(error = %e, "Rejected credentials");
        Self::Unauthorized
    }
}

/// A logged-in caller.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Profile);

/// A caller who may be anonymous.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Profile>);

impl MaybeUser {
    pub fn id(&self) -> Option<i64> {
        self.0.as_ref().map(|p| p.id)
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?.ok_or(ApiError::Unauthorized)?;
        Ok(Self(authenticate(token, &state.jwt_secret).await?))
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    /// A present but invalid token is rejected rather than treated as anonymous.
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer_token(parts)? {
            Some(token) => Ok(Self(Some(authenticate(token, &state.jwt_secret).await?))),
            None => Ok(Self(None)),
        }
    }
}

fn bearer_token(parts: &Parts) -> Result<Option<&str>, AuthError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(Some)
        .ok_or(AuthError::MalformedHeader)
}

/// Checks the signature and expiry of a token and returns its claims.
///
/// # Errors
///
/// Returns an error if the token is malformed, expired or signed with another key.
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let validation = Validation::new(Algorithm::HS256);
    let key = DecodingKey::from_secret(secret.as_bytes());
    Ok(decode::<Claims>(token, &key, &validation)?.claims)
}

async fn authenticate(token: &str, secret: &str) -> Result<Profile, ApiError> {
    let claims = decode_token(token, secret)?;
    check_name("sub", &claims.sub, PROFILE_NAME_MAX_LEN).map_err(|_| AuthError::InvalidName)?;

    Ok(database::profile::get_or_create_profile(claims.sub.trim()).await?)
}

#[cfg(test)]
pub(crate) mod tests {
    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::*;

    pub(crate) fn token(sub: &str, secret: &str, exp: u64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    const FAR_FUTURE: u64 = 4_102_444_800;

    #[test]
    fn test_decode_valid_token() {
        let claims = decode_token(&token("alice", "secret", FAR_FUTURE), "secret").unwrap();
        assert_eq!(claims.sub, "alice");
    }

    #[test]
    fn test_decode_rejects_wrong_secret() {
        assert!(matches!(
            decode_token(&token("alice", "secret", FAR_FUTURE), "other"),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_decode_rejects_expired_token() {
        assert!(decode_token(&token("alice", "secret", 1_000), "secret").is_err());
    }

    #[test]
    fn test_bearer_token_parsing() {
        let (mut parts, ()) = axum::http::Request::new(()).into_parts();
        assert!(matches!(bearer_token(&parts), Ok(None)));

        parts
            .headers
            .insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert!(matches!(bearer_token(&parts), Ok(Some("abc"))));

        parts.headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(matches!(bearer_token(&parts), Err(AuthError::MalformedHeader)));
    }
}
