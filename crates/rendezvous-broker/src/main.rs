//! Rendezvous Broker
//!
//! Entry point for the rendezvous broker service. Wires configuration,
//! the Redis-backed hash store, the capability token issuer and the HTTP
//! router together, then serves until a shutdown signal arrives.

use rendezvous_broker::config::Config;
use rendezvous_broker::repositories::{BanRepository, ChannelRepository, TokenRepository};
use rendezvous_broker::routes::{self, AppState};
use rendezvous_broker::services::{AblyIssuer, AuthService, PairingService};
use rendezvous_broker::store::{HashStore, RedisStore};
use rendezvous_broker::tasks;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rendezvous_broker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Rendezvous Broker");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        store_host = %config.store_host,
        store_port = config.store_port,
        max_tokens_per_ip = config.max_tokens_per_ip,
        sweep_interval_seconds = config.sweep_interval_seconds,
        "Configuration loaded successfully"
    );

    // Connect to the backing store
    info!("Connecting to store...");
    let store: Arc<dyn HashStore> = Arc::new(RedisStore::connect(&config).await.map_err(|e| {
        error!("Failed to connect to store: {}", e);
        e
    })?);
    info!("Store connection established");

    let issuer = Arc::new(AblyIssuer::new(
        config.fabric_rest_url.clone(),
        &config.fabric_api_key,
    )?);

    let tokens = TokenRepository::new(store.clone());
    let bans = BanRepository::new(store.clone());
    let channels = ChannelRepository::new(store.clone());

    let auth = AuthService::new(tokens.clone(), bans.clone(), config.max_tokens_per_ip);
    let pairing = PairingService::new(channels, tokens.clone(), issuer);

    let bind_address = config.bind_address.clone();
    let sweep_interval_seconds = config.sweep_interval_seconds;

    let state = AppState {
        store,
        auth,
        pairing,
    };

    // Start the expiry reaper
    let cancel_token = CancellationToken::new();
    let reaper_handle = tokio::spawn(tasks::start_expiry_reaper(
        tokens,
        bans,
        sweep_interval_seconds,
        cancel_token.clone(),
    ));

    let app = routes::build_routes(state);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Rendezvous Broker listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Stop the reaper and wait for it to finish its iteration
    cancel_token.cancel();
    if let Err(e) = reaper_handle.await {
        error!("Expiry reaper task panicked: {}", e);
    }

    info!("Rendezvous Broker shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
