//! In-memory [`HashStore`] implementation for tests.

use crate::store::{HashStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

type Hashes = HashMap<String, HashMap<String, String>>;

/// In-memory hash store with the same observable semantics as the Redis
/// client: missing keys read as `None`, `hash_create` and `hash_update`
/// are atomic under the store lock, `keys` supports `<prefix>*` patterns.
#[derive(Default)]
pub struct MemoryStore {
    hashes: RwLock<Hashes>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a hash directly, bypassing the `HashStore` API. Intended for
    /// arranging test fixtures (expired or corrupt records included).
    pub fn seed_hash(&self, key: &str, fields: &[(&str, &str)]) {
        let mut hashes = self.write();
        let entry = hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert((*field).to_string(), (*value).to_string());
        }
    }

    /// Whether a key is present, without going through the async API.
    pub fn contains_key(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Hashes> {
        self.hashes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Hashes> {
        self.hashes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl HashStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn hash_get_all(
        &self,
        key: &str,
    ) -> Result<Option<HashMap<String, String>>, StoreError> {
        Ok(self.read().get(key).cloned())
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        let mut hashes = self.write();
        let entry = hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn hash_create(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<bool, StoreError> {
        let mut hashes = self.write();
        if hashes.contains_key(key) {
            return Ok(false);
        }
        hashes.insert(key.to_string(), fields.iter().cloned().collect());
        Ok(true)
    }

    async fn hash_update(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<bool, StoreError> {
        let mut hashes = self.write();
        let Some(entry) = hashes.get_mut(key) else {
            return Ok(false);
        };
        for (field, value) in fields {
            entry.insert(field.clone(), value.clone());
        }
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.write().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.read().contains_key(key))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        Ok(self
            .read()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn hash_get_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<HashMap<String, String>>, StoreError> {
        let hashes = self.read();
        Ok(keys
            .iter()
            .map(|key| hashes.get(key).cloned().unwrap_or_default())
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_create_refuses_existing_key() {
        let store = MemoryStore::new();
        let fields = vec![("f".to_string(), "v".to_string())];

        assert!(store.hash_create("k", &fields).await.unwrap());
        assert!(!store.hash_create("k", &fields).await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_update_refuses_missing_key() {
        let store = MemoryStore::new();
        let fields = vec![("f".to_string(), "v".to_string())];

        assert!(!store.hash_update("k", &fields).await.unwrap());
        assert!(!store.contains_key("k"));

        store.seed_hash("k", &[("f", "old")]);
        assert!(store.hash_update("k", &fields).await.unwrap());
        let hash = store.hash_get_all("k").await.unwrap().unwrap();
        assert_eq!(hash.get("f").map(String::as_str), Some("v"));
    }

    #[tokio::test]
    async fn test_keys_matches_prefix_pattern() {
        let store = MemoryStore::new();
        store.seed_hash("TOKEN:a", &[("ID", "a")]);
        store.seed_hash("TOKEN:b", &[("ID", "b")]);
        store.seed_hash("BAN:c", &[("IP", "c")]);

        let mut keys = store.keys("TOKEN:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["TOKEN:a", "TOKEN:b"]);
    }

    #[tokio::test]
    async fn test_missing_hash_reads_as_none() {
        let store = MemoryStore::new();
        assert!(store.hash_get_all("nope").await.unwrap().is_none());

        let many = store.hash_get_many(&["nope".to_string()]).await.unwrap();
        assert_eq!(many.len(), 1);
        assert!(many.first().is_some_and(HashMap::is_empty));
    }
}
