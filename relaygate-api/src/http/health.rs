//! Health check endpoint for monitoring probes

use axum::{response::IntoResponse, routing::get, Router};

/// Health check router, usable with any router state
pub fn create_health_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health_check))
}

/// Always returns OK while the server is running
pub async fn health_check() -> impl IntoResponse {
    "OK"
}
