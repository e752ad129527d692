use crate::handlers::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
}

/// Liveness: the process is up.
#[utoipa::path(get, path = "/health", responses((status = 200, description = "Service is alive")), tag = "Health")]
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Readiness: the database answers.
#[utoipa::path(get, path = "/health/ready", responses(
    (status = 200, description = "Service is ready"),
    (status = 503, description = "Database unreachable")
), tag = "Health")]
pub async fn ready(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match state.db.ping().await {
        Ok(()) => Ok(Json(json!({ "status": "ready" }))),
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}
