//! Health check endpoint.

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::instrument;

/// Handle `GET /health`.
///
/// Pings the backing store; reports 503 when it is unreachable so load
/// balancers stop routing traffic here.
#[instrument(skip_all, name = "broker.handlers.health")]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
                store: "connected".to_string(),
            }),
        ),
        Err(err) => {
            tracing::warn!(
                target: "broker.handlers.health",
                error = %err,
                "Store ping failed"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded".to_string(),
                    store: "disconnected".to_string(),
                }),
            )
        }
    }
}
