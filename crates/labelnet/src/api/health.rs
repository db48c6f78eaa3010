use axum::Router;
use axum::routing::get;

use super::AppState;

pub async fn health_handler() -> &'static str {
    "healthy"
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
