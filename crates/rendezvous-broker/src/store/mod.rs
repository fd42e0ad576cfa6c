//! Hash-oriented key-value store abstraction.
//!
//! All broker state (session tokens, bans, channels) lives in flat
//! string-keyed hashes behind the [`HashStore`] trait. Production uses the
//! Redis-backed [`RedisStore`]; tests use the in-memory [`MemoryStore`].

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

pub mod client;
mod lua;
pub mod memory;

pub use client::RedisStore;
pub use memory::MemoryStore;

/// Store-level error. Converted to `BrokerError::Store` at the seam.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Store command failed: {0}")]
    Command(String),
}

impl From<StoreError> for crate::errors::BrokerError {
    fn from(err: StoreError) -> Self {
        crate::errors::BrokerError::Store(err.to_string())
    }
}

/// Hash-oriented store operations the broker relies on.
///
/// Contract notes:
/// - Absence is a normal outcome: `hash_get_all` returns `None` for a
///   missing key, never an error.
/// - `hash_create` is the atomic "create if absent" primitive that closes
///   the check-then-write race in identifier generation.
#[async_trait]
pub trait HashStore: Send + Sync {
    /// Liveness probe against the store.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Read all fields of a hash. `None` if the key does not exist.
    async fn hash_get_all(&self, key: &str)
        -> Result<Option<HashMap<String, String>>, StoreError>;

    /// Upsert fields into a hash (creates the key if absent).
    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError>;

    /// Atomically create a hash with the given fields only if the key does
    /// not already exist. Returns `true` if created, `false` if the key was
    /// already present.
    async fn hash_create(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<bool, StoreError>;

    /// Atomically write fields into a hash only if the key already exists.
    /// Returns `true` if updated, `false` if the key was absent (nothing
    /// written). Unlike `hash_set`, this never resurrects a deleted key.
    async fn hash_update(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<bool, StoreError>;

    /// Delete a key. Returns `true` if a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Whether a key exists.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// List keys matching a `<prefix>*` pattern.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Atomic multi-get of several hashes (missing keys yield empty maps).
    async fn hash_get_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<HashMap<String, String>>, StoreError>;
}
