//! Demo routes protected by the rate limiter.

use std::sync::Arc;

use axum::extract::State;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use super::middleware::rate_limit;
use super::AppState;

/// Build the application router with the rate limit layer applied to every
/// route.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/data", get(data))
        .route("/api/user-data", get(user_data))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .with_state(state)
}

async fn root() -> &'static str {
    "Hello from Slidegate!"
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "tracked_keys": state.policy.tracked_keys(),
        "scopes": state.policy.scope_names(),
    }))
}

async fn data() -> impl IntoResponse {
    Json(json!({ "data": "Some protected data" }))
}

async fn user_data() -> impl IntoResponse {
    Json(json!({ "message": "User-specific rate-limited data" }))
}
