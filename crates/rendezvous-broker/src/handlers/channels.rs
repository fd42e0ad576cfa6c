//! Channel pairing endpoints.

use crate::errors::BrokerError;
use crate::middleware::RequestIdentity;
use crate::models::{ApiData, ApiMessage, SessionToken};
use crate::routes::AppState;
use crate::services::DisconnectOutcome;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use tracing::instrument;

/// Pull the validated session out of the identity.
///
/// The middleware only lets token-less requests through for session
/// creation, so channel handlers always see a session; this guards the
/// invariant rather than panicking on it.
fn require_session(identity: &RequestIdentity) -> Result<&SessionToken, BrokerError> {
    identity
        .session
        .as_ref()
        .ok_or_else(|| BrokerError::BadRequest("Invalid token supplied.".to_string()))
}

/// Handle `GET /channels/:endpoint`.
///
/// Pairs the caller with the named endpoint and returns the caller's
/// capability token plus the channel name.
#[instrument(skip_all, name = "broker.handlers.connect_channel")]
pub async fn connect(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    Extension(identity): Extension<RequestIdentity>,
) -> Result<impl IntoResponse, BrokerError> {
    let session = require_session(&identity)?;
    let data = state.pairing.pair(session, &endpoint).await?;
    Ok(Json(ApiData::ok(data)))
}

/// Handle `POST /channels/refresh`.
///
/// Re-mints the caller's capability token for its live channel.
#[instrument(skip_all, name = "broker.handlers.refresh_channel")]
pub async fn refresh(
    State(state): State<AppState>,
    Extension(identity): Extension<RequestIdentity>,
) -> Result<impl IntoResponse, BrokerError> {
    let session = require_session(&identity)?;
    let data = state.pairing.refresh(session).await?;
    Ok(Json(ApiData::ok(data)))
}

/// Handle `GET /channels/disconnect`.
///
/// Tears down the caller's live channel. Disconnecting when no channel
/// exists is informational, not an error.
#[instrument(skip_all, name = "broker.handlers.disconnect_channel")]
pub async fn disconnect(
    State(state): State<AppState>,
    Extension(identity): Extension<RequestIdentity>,
) -> Result<impl IntoResponse, BrokerError> {
    let session = require_session(&identity)?;

    let message = match state.pairing.disconnect(session).await? {
        DisconnectOutcome::Disconnected => "Channel was successfully disconnected.",
        DisconnectOutcome::AlreadyDisconnected => "Channel was disconnected previously.",
    };

    Ok(Json(ApiMessage::ok(message)))
}
