//! IP ban repository.
//!
//! Owns the ban lifecycle: ban, lookup, expiry sweep. A ban older than its
//! expiry is inert: it is treated as absent and lazily purged. Ban lookups
//! are consulted on every token validation and never cached across
//! requests.

use crate::errors::BrokerError;
use crate::models::{Ban, BAN_KEY_PREFIX};
use crate::store::HashStore;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Ban time-to-live (one month).
const BAN_TTL_DAYS: i64 = 30;

/// Repository for ban records (`BAN:<ip>`).
#[derive(Clone)]
pub struct BanRepository {
    store: Arc<dyn HashStore>,
}

impl BanRepository {
    pub fn new(store: Arc<dyn HashStore>) -> Self {
        Self { store }
    }

    /// Upsert a ban with a 30-day expiry from now. Re-banning an already
    /// banned IP resets the window.
    #[instrument(skip_all)]
    pub async fn ban(&self, ip: &str) -> Result<(), BrokerError> {
        let ban = Ban {
            ip: ip.to_string(),
            expire_at: Utc::now() + Duration::days(BAN_TTL_DAYS),
        };

        self.store
            .hash_set(&Ban::key(&ban.ip), &ban.to_fields())
            .await?;

        warn!(target: "broker.repository.bans", "Banned client IP");
        Ok(())
    }

    /// Whether this IP is currently banned. Expired bans are treated as
    /// absent and purged on the spot.
    #[instrument(skip_all)]
    pub async fn is_banned(&self, ip: &str) -> Result<bool, BrokerError> {
        let Some(fields) = self.store.hash_get_all(&Ban::key(ip)).await? else {
            return Ok(false);
        };

        let ban = Ban::from_fields(&fields).ok_or_else(|| {
            warn!(
                target: "broker.repository.bans",
                "Ban record fails the shape check, treating as store corruption"
            );
            BrokerError::Internal
        })?;

        if ban.is_expired(Utc::now()) {
            self.delete(ip).await?;
            return Ok(false);
        }

        Ok(true)
    }

    /// All stored bans, sweeping expired ones first.
    #[instrument(skip_all)]
    pub async fn get_all(&self) -> Result<Vec<Ban>, BrokerError> {
        self.remove_expired().await?;
        self.scan().await
    }

    /// Look up one ban by IP, sweeping expired bans first.
    ///
    /// # Errors
    ///
    /// `BadRequest` if the IP is not banned.
    #[instrument(skip_all)]
    pub async fn get(&self, ip: &str) -> Result<Ban, BrokerError> {
        self.remove_expired().await?;

        let fields = self
            .store
            .hash_get_all(&Ban::key(ip))
            .await?
            .ok_or_else(|| BrokerError::BadRequest("Invalid IP supplied.".to_string()))?;

        Ban::from_fields(&fields).ok_or(BrokerError::Internal)
    }

    /// Delete-if-present: true whether or not the ban existed.
    #[instrument(skip_all)]
    pub async fn delete(&self, ip: &str) -> Result<bool, BrokerError> {
        self.store.delete(&Ban::key(ip)).await?;
        Ok(true)
    }

    /// Sweep every stored ban, deleting the stale ones. Returns the number
    /// of bans purged.
    #[instrument(skip_all)]
    pub async fn remove_expired(&self) -> Result<u64, BrokerError> {
        let now = Utc::now();
        let mut purged = 0;

        for ban in self.scan().await? {
            if ban.is_expired(now) {
                self.delete(&ban.ip).await?;
                purged += 1;
            }
        }

        if purged > 0 {
            debug!(
                target: "broker.repository.bans",
                purged = purged,
                "Purged expired bans"
            );
        }

        Ok(purged)
    }

    async fn scan(&self) -> Result<Vec<Ban>, BrokerError> {
        let keys = self.store.keys(&format!("{BAN_KEY_PREFIX}*")).await?;
        let records = self.store.hash_get_many(&keys).await?;

        let mut bans = Vec::with_capacity(records.len());
        for (key, fields) in keys.iter().zip(records.iter()) {
            match Ban::from_fields(fields) {
                Some(ban) => bans.push(ban),
                None => {
                    warn!(
                        target: "broker.repository.bans",
                        key = %key,
                        "Skipping ban record that fails the shape check"
                    );
                }
            }
        }

        Ok(bans)
    }
}
