use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use database::ReorderError;
use image_pipeline::PipelineError;
use labelnet_structs::{LayerError, ValidationError};
use serde::Serialize;

use crate::workflow::WorkflowError;

/// Error returned by every handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("must be logged in")]
    Unauthorized,

    /// The caller is logged in but does not own the resource.
    #[error("{0}")]
    NotOwner(&'static str),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    message: &'a str,
}

impl ApiError {
    pub fn not_found(what: &str, id: i64) -> Self {
        Self::NotFound(format!("could not find {what} with the id {id}"))
    }

    const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized | Self::NotOwner(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(e) = &self {
            tracing::error!(error = ?e, "Request failed");
        }

        (
            self.status_code(),
            Json(ErrorResponse {
                message: self.to_string().as_str(),
            }),
        )
            .into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound("not found".to_string()),
            e => Self::Internal(e.into()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<LayerError> for ApiError {
    fn from(e: LayerError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl From<ReorderError> for ApiError {
    fn from(e: ReorderError) -> Self {
        match e {
            ReorderError::ForeignId(_) => Self::BadRequest(e.to_string()),
            ReorderError::Database(e) => e.into(),
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        if e.is_client_error() {
            Self::BadRequest(e.to_string())
        } else {
            Self::Internal(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::NotOwner("no").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::not_found("dataset", 3).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(sqlx::Error::RowNotFound).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(ReorderError::ForeignId(9)).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(WorkflowError::NotBuilt).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_internal_message_is_generic() {
        let error = ApiError::from(anyhow::anyhow!("password=hunter2"));
        assert_eq!(error.to_string(), "internal server error");
    }
}
