//! Session endpoints.

use crate::errors::BrokerError;
use crate::middleware::RequestIdentity;
use crate::models::{ApiData, SessionData};
use crate::routes::AppState;
use axum::{extract::State, response::IntoResponse, Extension, Json};
use tracing::instrument;

/// Handle `GET /auth`.
///
/// Creates a session for the caller's IP. Presenting an existing valid
/// token rotates it; the old token is revoked and a fresh one returned.
#[instrument(skip_all, name = "broker.handlers.create_session")]
pub async fn create_session(
    State(state): State<AppState>,
    Extension(identity): Extension<RequestIdentity>,
) -> Result<impl IntoResponse, BrokerError> {
    let data: SessionData = state
        .auth
        .create_session(&identity.ip, identity.session.as_ref())
        .await?;

    Ok(Json(ApiData::ok(data)))
}
