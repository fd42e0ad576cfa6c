//! Capability-token issuer client for the external messaging fabric.
//!
//! Given a principal id, a channel name, a fixed ability set and a TTL, the
//! fabric returns an opaque signed token or fails. Issuer failures abort
//! the calling mutation and surface as internal errors; nothing is retried
//! here.
//!
//! # Security
//!
//! - The broker authenticates with its fabric API key (basic auth)
//! - Timeouts prevent hanging connections
//! - Failures are logged server-side with generic client messages

use crate::errors::BrokerError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Default timeout for issuer requests in seconds.
const ISSUER_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Abilities granted on the shared channel.
const CHANNEL_ABILITIES: [&str; 3] = ["publish", "subscribe", "presence"];

/// Capability token TTL in milliseconds (24 h).
const CAPABILITY_TOKEN_TTL_MS: u64 = 1000 * 60 * 60 * 24;

/// External service that mints capability tokens scoped to one channel.
#[async_trait]
pub trait CapabilityIssuer: Send + Sync {
    /// Request an opaque capability token for `client_id`, scoped to
    /// publish/subscribe/presence on `channel`, valid for 24 h.
    async fn request_token(&self, client_id: &str, channel: &str)
        -> Result<String, BrokerError>;
}

/// Token request body for the fabric REST API.
#[derive(Debug, Serialize)]
struct TokenRequestBody<'a> {
    /// Principal the token is minted for.
    #[serde(rename = "clientId")]
    client_id: &'a str,

    /// Capability map serialized as a JSON string, per the fabric's API.
    capability: String,

    /// Token TTL in milliseconds.
    ttl: u64,
}

/// HTTP client for an Ably-style REST token endpoint.
#[derive(Clone)]
pub struct AblyIssuer {
    /// HTTP client with configured timeouts.
    client: Client,

    /// Fabric REST base URL.
    base_url: String,

    /// API key name (first half of `name:secret`).
    key_name: String,

    /// API key secret (second half of `name:secret`).
    key_secret: String,
}

impl AblyIssuer {
    /// Create a new issuer client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Fabric REST base URL (e.g., "https://rest.ably.io")
    /// * `api_key` - Fabric API key in `name:secret` form
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Internal` if the key is malformed or the HTTP
    /// client cannot be built.
    pub fn new(base_url: String, api_key: &str) -> Result<Self, BrokerError> {
        let (key_name, key_secret) = api_key.split_once(':').ok_or_else(|| {
            error!(
                target: "broker.services.issuer",
                "Fabric API key is not in name:secret form"
            );
            BrokerError::Internal
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(ISSUER_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "broker.services.issuer", error = %e, "Failed to build HTTP client");
                BrokerError::Internal
            })?;

        Ok(Self {
            client,
            base_url,
            key_name: key_name.to_string(),
            key_secret: key_secret.to_string(),
        })
    }

    fn capability_for(channel: &str) -> String {
        serde_json::json!({ channel: CHANNEL_ABILITIES }).to_string()
    }
}

#[async_trait]
impl CapabilityIssuer for AblyIssuer {
    #[instrument(skip(self), fields(channel = %channel))]
    async fn request_token(
        &self,
        client_id: &str,
        channel: &str,
    ) -> Result<String, BrokerError> {
        let url = format!("{}/keys/{}/requestToken", self.base_url, self.key_name);

        let body = TokenRequestBody {
            client_id,
            capability: Self::capability_for(channel),
            ttl: CAPABILITY_TOKEN_TTL_MS,
        };

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_name, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "broker.services.issuer", error = %e, "Issuer request failed");
                BrokerError::Internal
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                target: "broker.services.issuer",
                status = %status,
                "Issuer rejected token request"
            );
            return Err(BrokerError::Internal);
        }

        // The signed token details are treated as one opaque string
        response.text().await.map_err(|e| {
            error!(target: "broker.services.issuer", error = %e, "Failed to read issuer response");
            BrokerError::Internal
        })
    }
}

/// Deterministic in-process issuer for tests and local development.
///
/// Mints a distinct token on every call and can be switched into a failing
/// mode to exercise abort paths.
#[derive(Debug, Default)]
pub struct MockIssuer {
    counter: AtomicU64,
    fail: AtomicBool,
}

impl MockIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// An issuer whose every request fails.
    pub fn failing() -> Self {
        let issuer = Self::default();
        issuer.fail.store(true, Ordering::SeqCst);
        issuer
    }

    /// Toggle the failure mode.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Number of tokens minted so far.
    pub fn issued_count(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilityIssuer for MockIssuer {
    async fn request_token(
        &self,
        client_id: &str,
        channel: &str,
    ) -> Result<String, BrokerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BrokerError::Internal);
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("cap-{n}:{client_id}:{channel}"))
    }
}
