//! Identity-resolution middleware for protected routes.
//!
//! Extracts and normalizes the client IP, resolves the bearer session
//! token through [`AuthService`], and injects a [`RequestIdentity`] into
//! request extensions for downstream handlers. The new-session route is
//! the only protected route allowed through without a bearer token; it
//! gets the per-IP quota check instead.

use crate::errors::BrokerError;
use crate::models::SessionToken;
use crate::routes::AppState;
use crate::services::auth::clean_ip;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::Method,
    middleware::Next,
    response::IntoResponse,
};
use std::net::SocketAddr;
use tracing::instrument;

/// Resolved caller identity, available to handlers via request extensions.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    /// Normalized client IP (no port, no IPv6-mapped prefix).
    pub ip: String,
    /// Validated session, absent only for an unauthenticated new-session
    /// request.
    pub session: Option<SessionToken>,
}

/// Extract the client IP, preferring the first `X-Forwarded-For` entry
/// over the socket peer address.
fn extract_ip(req: &Request) -> Result<String, BrokerError> {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    let raw = match forwarded {
        Some(ip) => ip.to_string(),
        None => req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string())
            .ok_or_else(|| {
                tracing::debug!(target: "broker.middleware.auth", "No client IP on request");
                BrokerError::BadRequest("Client IP is missing or invalid.".to_string())
            })?,
    };

    let cleaned = clean_ip(&raw);
    if cleaned.is_empty() {
        return Err(BrokerError::BadRequest(
            "Client IP is missing or invalid.".to_string(),
        ));
    }

    Ok(cleaned)
}

/// Extract the bearer token from the Authorization header, if present.
fn extract_bearer(req: &Request) -> Option<&str> {
    req.headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Identity-resolution middleware.
///
/// # Response
///
/// - 400 if the client IP cannot be determined, or a non-new-session
///   request carries no bearer token, or the new-session quota is hit
/// - 401 if the token is bound to another IP or the IP is banned
/// - Continues with [`RequestIdentity`] in extensions otherwise
#[instrument(skip_all, name = "broker.middleware.auth")]
pub async fn resolve_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, BrokerError> {
    let ip = extract_ip(&req)?;
    let bearer = extract_bearer(&req).map(str::to_string);

    let wants_new_session = req.method() == Method::GET && req.uri().path() == "/auth";

    let session = state
        .auth
        .resolve(&ip, bearer.as_deref(), wants_new_session)
        .await?;

    req.extensions_mut().insert(RequestIdentity { ip, session });

    Ok(next.run(req).await)
}
