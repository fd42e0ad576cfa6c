//! Session token repository.
//!
//! Owns the session-token lifecycle: creation, lookup, deletion and expiry
//! sweep. Lookups never return expired tokens; an expired record found on
//! the read path is purged lazily. Per-IP quota enforcement is the
//! orchestrator's responsibility, not the repository's.

use crate::errors::BrokerError;
use crate::idgen;
use crate::models::{SessionToken, TOKEN_KEY_PREFIX};
use crate::store::HashStore;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Session token time-to-live.
const TOKEN_TTL_HOURS: i64 = 24;

/// Repository for session token records (`TOKEN:<id>`).
#[derive(Clone)]
pub struct TokenRepository {
    store: Arc<dyn HashStore>,
}

impl TokenRepository {
    pub fn new(store: Arc<dyn HashStore>) -> Self {
        Self { store }
    }

    /// All stored tokens. Records failing the shape check are skipped with
    /// a warning rather than failing the whole scan.
    #[instrument(skip_all)]
    pub async fn get_all(&self) -> Result<Vec<SessionToken>, BrokerError> {
        let keys = self.store.keys(&format!("{TOKEN_KEY_PREFIX}*")).await?;
        let records = self.store.hash_get_many(&keys).await?;

        let mut tokens = Vec::with_capacity(records.len());
        for (key, fields) in keys.iter().zip(records.iter()) {
            match SessionToken::from_fields(fields) {
                Some(token) => tokens.push(token),
                None => {
                    warn!(
                        target: "broker.repository.tokens",
                        key = %key,
                        "Skipping token record that fails the shape check"
                    );
                }
            }
        }

        Ok(tokens)
    }

    /// Look up one token by its (already sanitized) id.
    ///
    /// # Errors
    ///
    /// - `BadRequest` if the id is unknown or the token has expired
    /// - `Internal` if the stored record fails the shape check
    #[instrument(skip_all)]
    pub async fn get(&self, id: &str) -> Result<SessionToken, BrokerError> {
        let fields = self
            .store
            .hash_get_all(&SessionToken::key(id))
            .await?
            .ok_or_else(invalid_token)?;

        let token = SessionToken::from_fields(&fields).ok_or_else(|| {
            warn!(
                target: "broker.repository.tokens",
                "Token record fails the shape check, treating as store corruption"
            );
            BrokerError::Internal
        })?;

        // Expired entities are never returned by lookups
        if token.is_expired(Utc::now()) {
            self.delete(id).await?;
            return Err(invalid_token());
        }

        Ok(token)
    }

    /// Build and persist a fresh token for a cleaned client IP: unique
    /// session id, unique endpoint code, 24 h expiry.
    ///
    /// The final write is an atomic create-if-absent; a lost id race is
    /// retried with a fresh candidate.
    #[instrument(skip_all)]
    pub async fn create(&self, ip: &str) -> Result<SessionToken, BrokerError> {
        for _ in 0..idgen::MAX_GENERATE_ATTEMPTS {
            let id = idgen::generate_session_id(|candidate| async move {
                self.exists(&candidate).await
            })
            .await?;

            let endpoint = idgen::generate_endpoint(|candidate| async move {
                self.endpoint_in_use(&candidate).await
            })
            .await?;

            let token = SessionToken {
                id,
                ip: ip.to_string(),
                endpoint,
                expire_at: Utc::now() + Duration::hours(TOKEN_TTL_HOURS),
            };

            let created = self
                .store
                .hash_create(&SessionToken::key(&token.id), &token.to_fields())
                .await?;

            if created {
                return Ok(token);
            }

            debug!(
                target: "broker.repository.tokens",
                "Lost session id race, regenerating"
            );
        }

        Err(BrokerError::Internal)
    }

    /// Idempotent upsert of a token record.
    #[instrument(skip_all)]
    pub async fn set(&self, token: &SessionToken) -> Result<(), BrokerError> {
        self.store
            .hash_set(&SessionToken::key(&token.id), &token.to_fields())
            .await?;
        Ok(())
    }

    /// Delete-if-present: true whether or not the token existed.
    #[instrument(skip_all)]
    pub async fn delete(&self, id: &str) -> Result<bool, BrokerError> {
        self.store.delete(&SessionToken::key(id)).await?;
        Ok(true)
    }

    /// Whether a token record exists for this id.
    #[instrument(skip_all)]
    pub async fn exists(&self, id: &str) -> Result<bool, BrokerError> {
        Ok(self.store.exists(&SessionToken::key(id)).await?)
    }

    /// Whether any live token is bound to this endpoint code.
    #[instrument(skip_all)]
    pub async fn endpoint_in_use(&self, endpoint: &str) -> Result<bool, BrokerError> {
        let now = Utc::now();
        Ok(self
            .get_all()
            .await?
            .iter()
            .any(|t| t.endpoint == endpoint && !t.is_expired(now)))
    }

    /// Count live tokens bound to this cleaned IP.
    #[instrument(skip_all)]
    pub async fn count_for_ip(&self, ip: &str) -> Result<usize, BrokerError> {
        let now = Utc::now();
        Ok(self
            .get_all()
            .await?
            .iter()
            .filter(|t| t.ip == ip && !t.is_expired(now))
            .count())
    }

    /// Sweep every stored token, deleting the stale ones. Returns the
    /// number of tokens purged.
    #[instrument(skip_all)]
    pub async fn remove_expired(&self) -> Result<u64, BrokerError> {
        let now = Utc::now();
        let mut purged = 0;

        for token in self.get_all().await? {
            if token.is_expired(now) {
                self.delete(&token.id).await?;
                purged += 1;
            }
        }

        if purged > 0 {
            debug!(
                target: "broker.repository.tokens",
                purged = purged,
                "Purged expired session tokens"
            );
        }

        Ok(purged)
    }
}

fn invalid_token() -> BrokerError {
    BrokerError::BadRequest("Invalid token supplied.".to_string())
}
