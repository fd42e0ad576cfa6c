//! Route table and shared application state.

use crate::handlers;
use crate::middleware::auth::resolve_identity;
use crate::services::{AuthService, PairingService};
use crate::store::HashStore;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Request timeout for all routes.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn HashStore>,
    pub auth: AuthService,
    pub pairing: PairingService,
}

/// Build the full route table.
///
/// `/health` is public; everything else passes through the
/// identity-resolution middleware. `/channels/disconnect` and
/// `/channels/refresh` are literal routes, so they are never captured by
/// the `/channels/:endpoint` parameter.
pub fn build_routes(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth", get(handlers::auth::create_session))
        .route("/channels/disconnect", get(handlers::channels::disconnect))
        .route("/channels/refresh", post(handlers::channels::refresh))
        .route("/channels/:endpoint", get(handlers::channels::connect))
        .route_layer(from_fn_with_state(state.clone(), resolve_identity));

    Router::new()
        .route("/health", get(handlers::health::health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .with_state(state)
}
