//! Test server harness for E2E testing
//!
//! Provides `TestBrokerServer` for spawning real broker instances in
//! tests, backed by an in-memory store and a mock capability issuer.

use rendezvous_broker::repositories::{BanRepository, ChannelRepository, TokenRepository};
use rendezvous_broker::routes::{self, AppState};
use rendezvous_broker::services::{AuthService, MockIssuer, PairingService};
use rendezvous_broker::store::{HashStore, MemoryStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the broker in E2E tests.
///
/// Requests reach the real router, middleware and services; only the
/// store and the capability issuer are swapped for test doubles. Client
/// IPs are simulated by sending an `X-Forwarded-For` header.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_session_flow_e2e() -> Result<(), anyhow::Error> {
///     let server = TestBrokerServer::spawn().await?;
///     let client = reqwest::Client::new();
///
///     let response = client
///         .get(format!("{}/auth", server.url()))
///         .header("X-Forwarded-For", "10.0.0.1")
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestBrokerServer {
    addr: SocketAddr,
    store: Arc<MemoryStore>,
    issuer: Arc<MockIssuer>,
    _handle: JoinHandle<()>,
}

impl TestBrokerServer {
    /// Spawn a broker instance on a random port with default quota.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with_quota(rendezvous_broker::config::DEFAULT_MAX_TOKENS_PER_IP).await
    }

    /// Spawn a broker instance with an explicit per-IP session quota.
    pub async fn spawn_with_quota(max_tokens_per_ip: u32) -> Result<Self, anyhow::Error> {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn HashStore> = memory.clone();
        let issuer = Arc::new(MockIssuer::new());

        let tokens = TokenRepository::new(store.clone());
        let bans = BanRepository::new(store.clone());
        let channels = ChannelRepository::new(store.clone());

        let auth = AuthService::new(tokens.clone(), bans, max_tokens_per_ip);
        let pairing = PairingService::new(channels, tokens, issuer.clone());

        let state = AppState {
            store,
            auth,
            pairing,
        };

        let app = routes::build_routes(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        // Spawn server in background
        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            store: memory,
            issuer,
            _handle: handle,
        })
    }

    /// Base URL of the running server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The in-memory store, for seeding fixtures and asserting state.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// The mock issuer, for failure injection and mint counting.
    pub fn issuer(&self) -> &Arc<MockIssuer> {
        &self.issuer
    }
}

impl Drop for TestBrokerServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
