//! Channel repository.
//!
//! Owns persistence of pairing records. The channel name is the store key
//! (already `CHANNEL:`-namespaced by the identifier generator). Lookups by
//! participant scan the channel namespace; absence is a normal `None`,
//! never an error.

use crate::errors::BrokerError;
use crate::models::{Channel, CHANNEL_KEY_PREFIX};
use crate::store::HashStore;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Repository for channel records.
#[derive(Clone)]
pub struct ChannelRepository {
    store: Arc<dyn HashStore>,
}

impl ChannelRepository {
    pub fn new(store: Arc<dyn HashStore>) -> Self {
        Self { store }
    }

    /// All stored channels. Records failing the shape check are skipped
    /// with a warning.
    #[instrument(skip_all)]
    pub async fn get_all(&self) -> Result<Vec<Channel>, BrokerError> {
        let keys = self.store.keys(&format!("{CHANNEL_KEY_PREFIX}*")).await?;
        let records = self.store.hash_get_many(&keys).await?;

        let mut channels = Vec::with_capacity(records.len());
        for (key, fields) in keys.iter().zip(records.iter()) {
            match Channel::from_fields(fields) {
                Some(channel) => channels.push(channel),
                None => {
                    warn!(
                        target: "broker.repository.channels",
                        key = %key,
                        "Skipping channel record that fails the shape check"
                    );
                }
            }
        }

        Ok(channels)
    }

    /// Look up one channel by name. `None` if absent.
    ///
    /// # Errors
    ///
    /// `Internal` if the stored record fails the shape check.
    #[instrument(skip_all)]
    pub async fn get(&self, name: &str) -> Result<Option<Channel>, BrokerError> {
        let Some(fields) = self.store.hash_get_all(name).await? else {
            return Ok(None);
        };

        let channel = Channel::from_fields(&fields).ok_or_else(|| {
            warn!(
                target: "broker.repository.channels",
                "Channel record fails the shape check, treating as store corruption"
            );
            BrokerError::Internal
        })?;

        Ok(Some(channel))
    }

    /// The live channel initiated by this endpoint (`from == endpoint`).
    #[instrument(skip_all)]
    pub async fn find_by_initiator(&self, endpoint: &str) -> Result<Option<Channel>, BrokerError> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .find(|c| c.from == endpoint))
    }

    /// The live channel targeting this endpoint (`to == endpoint`).
    #[instrument(skip_all)]
    pub async fn find_by_target(&self, endpoint: &str) -> Result<Option<Channel>, BrokerError> {
        Ok(self.get_all().await?.into_iter().find(|c| c.to == endpoint))
    }

    /// The live channel this endpoint participates in, on either side.
    /// The initiator side is checked first.
    #[instrument(skip_all)]
    pub async fn find_for_endpoint(&self, endpoint: &str) -> Result<Option<Channel>, BrokerError> {
        if let Some(channel) = self.find_by_initiator(endpoint).await? {
            return Ok(Some(channel));
        }
        self.find_by_target(endpoint).await
    }

    /// Atomically create a channel record if its name is unclaimed.
    /// Returns `false` when the name was concurrently taken; the caller
    /// retries with a fresh name.
    #[instrument(skip_all)]
    pub async fn create(&self, channel: &Channel) -> Result<bool, BrokerError> {
        Ok(self
            .store
            .hash_create(&channel.channel, &channel.to_fields())
            .await?)
    }

    /// Overwrite the initiator-side capability token. Returns `false` if
    /// the channel no longer exists; the write must not recreate a channel
    /// deleted between the caller's lookup and the rotation.
    #[instrument(skip_all)]
    pub async fn set_token(&self, name: &str, token: &str) -> Result<bool, BrokerError> {
        Ok(self
            .store
            .hash_update(name, &[("token".to_string(), token.to_string())])
            .await?)
    }

    /// Overwrite (or populate) the target-side capability token. Returns
    /// `false` if the channel no longer exists.
    #[instrument(skip_all)]
    pub async fn set_token_to(&self, name: &str, token: &str) -> Result<bool, BrokerError> {
        Ok(self
            .store
            .hash_update(name, &[("tokenTo".to_string(), token.to_string())])
            .await?)
    }

    /// Whether a channel record exists under this name.
    #[instrument(skip_all)]
    pub async fn exists(&self, name: &str) -> Result<bool, BrokerError> {
        Ok(self.store.exists(name).await?)
    }

    /// Delete-if-present: true whether or not the channel existed.
    #[instrument(skip_all)]
    pub async fn delete(&self, name: &str) -> Result<bool, BrokerError> {
        self.store.delete(name).await?;
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn repo() -> (ChannelRepository, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ChannelRepository::new(store.clone()), store)
    }

    fn sample_channel(name: &str, from: &str, to: &str) -> Channel {
        Channel {
            channel: name.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            token: "cap-token".to_string(),
            token_to: None,
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let (repo, _) = repo();
        let channel = sample_channel("CHANNEL:x.y.z.a.bcd.efg.h.ijk.lmn", "a.bcd.efg", "h.ijk.lmn");

        assert!(repo.create(&channel).await.unwrap());

        let fetched = repo.get(&channel.channel).await.unwrap().unwrap();
        assert_eq!(fetched, channel);
    }

    #[tokio::test]
    async fn test_create_is_rejected_when_name_taken() {
        let (repo, _) = repo();
        let channel = sample_channel("CHANNEL:x", "a.bcd.efg", "h.ijk.lmn");

        assert!(repo.create(&channel).await.unwrap());
        assert!(!repo.create(&channel).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_absent_channel_is_none() {
        let (repo, _) = repo();
        assert!(repo.get("CHANNEL:missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_participant() {
        let (repo, _) = repo();
        let channel = sample_channel("CHANNEL:x", "a.bcd.efg", "h.ijk.lmn");
        repo.create(&channel).await.unwrap();

        let by_from = repo.find_by_initiator("a.bcd.efg").await.unwrap();
        assert_eq!(by_from.unwrap().channel, "CHANNEL:x");

        let by_to = repo.find_by_target("h.ijk.lmn").await.unwrap();
        assert_eq!(by_to.unwrap().channel, "CHANNEL:x");

        assert!(repo.find_by_initiator("h.ijk.lmn").await.unwrap().is_none());
        assert!(repo.find_by_target("a.bcd.efg").await.unwrap().is_none());

        let either = repo.find_for_endpoint("h.ijk.lmn").await.unwrap();
        assert_eq!(either.unwrap().channel, "CHANNEL:x");
    }

    #[tokio::test]
    async fn test_token_rotation_writes() {
        let (repo, _) = repo();
        let channel = sample_channel("CHANNEL:x", "a.bcd.efg", "h.ijk.lmn");
        repo.create(&channel).await.unwrap();

        assert!(repo.set_token("CHANNEL:x", "fresh").await.unwrap());
        assert!(repo.set_token_to("CHANNEL:x", "fresh-to").await.unwrap());

        let fetched = repo.get("CHANNEL:x").await.unwrap().unwrap();
        assert_eq!(fetched.token, "fresh");
        assert_eq!(fetched.token_to.as_deref(), Some("fresh-to"));
    }

    #[tokio::test]
    async fn test_token_rotation_does_not_revive_deleted_channel() {
        let (repo, store) = repo();
        let channel = sample_channel("CHANNEL:x", "a.bcd.efg", "h.ijk.lmn");
        repo.create(&channel).await.unwrap();
        repo.delete("CHANNEL:x").await.unwrap();

        assert!(!repo.set_token("CHANNEL:x", "fresh").await.unwrap());
        assert!(!repo.set_token_to("CHANNEL:x", "fresh-to").await.unwrap());

        // No partial record came back into existence
        assert!(!store.contains_key("CHANNEL:x"));
        assert!(repo.get("CHANNEL:x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_frees_the_name() {
        let (repo, _) = repo();
        let channel = sample_channel("CHANNEL:x", "a.bcd.efg", "h.ijk.lmn");
        repo.create(&channel).await.unwrap();

        assert!(repo.delete("CHANNEL:x").await.unwrap());
        assert!(!repo.exists("CHANNEL:x").await.unwrap());

        // Deleting again is still a success
        assert!(repo.delete("CHANNEL:x").await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_internal_error() {
        let (repo, store) = repo();
        store.seed_hash("CHANNEL:broken", &[("from", "a.bcd.efg")]);

        let result = repo.get("CHANNEL:broken").await;
        assert!(matches!(result, Err(BrokerError::Internal)));
    }
}
