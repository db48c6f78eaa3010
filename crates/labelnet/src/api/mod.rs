//! HTTP API.

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use config::Config;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod access;
mod areas;
mod auth;
mod datasets;
mod elements;
mod error;
mod forms;
mod health;
mod labels;
mod layers;
mod models;
mod profiles;
mod training;

pub use auth::{AuthError, Claims, CurrentUser, MaybeUser, decode_token};
pub use error::ApiError;

/// Shared state of the HTTP handlers. The database pool and object store are process globals.
#[derive(Debug, Clone)]
pub struct AppState {
    pub jwt_secret: Arc<str>,
    pub max_training_epochs: usize,
}

impl AppState {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            jwt_secret: Arc::from(config.jwt_secret.as_str()),
            max_training_epochs: config.max_training_epochs,
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let api = Router::new()
        .merge(profiles::router())
        .merge(datasets::router())
        .merge(elements::router())
        .merge(labels::router())
        .merge(areas::router())
        .merge(models::router())
        .merge(layers::router())
        .merge(training::router());

    Router::new()
        .nest("/api", api)
        .merge(health::router())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        router(
            AppState {
                jwt_secret: Arc::from("test-secret"),
                max_training_epochs: 10,
            },
            1024 * 1024,
        )
    }

    async fn send(request: Request<Body>) -> (StatusCode, String) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "healthy");
    }

    #[tokio::test]
    async fn test_anonymous_current_profile_is_null() {
        let (status, body) = send(get("/api/current-profile/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "null");
    }

    #[tokio::test]
    async fn test_login_required_routes_reject_anonymous_callers() {
        for request in [
            get("/api/my-datasets/"),
            get("/api/my-models/"),
            get("/api/datasets/1"),
            post_json("/api/create-label/", r##"{"dataset": 1, "name": "cat", "color": "#ffffff"}"##),
            post_json("/api/create-layer/", r#"{"model": 1, "type": "dense", "nodes_count": 8}"#),
            post_json("/api/build-model/", r#"{"id": 1, "optimizer": "adam", "loss": "mse"}"#),
            post_json("/api/datasets/delete/1/", ""),
        ] {
            let uri = request.uri().to_string();
            let (status, body) = send(request).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(body, r#"{"message":"must be logged in"}"#, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected_on_optional_routes() {
        let request = Request::get("/api/current-profile/")
            .header(header::AUTHORIZATION, "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_token_signed_with_other_secret_is_rejected() {
        let token = auth::tests::token("alice", "other-secret", 4_102_444_800);
        let request = Request::get("/api/my-datasets/")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let (status, _) = send(get("/api/nothing-here/")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
