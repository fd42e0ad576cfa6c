//! Redis-backed store implementation.
//!
//! # Connection Pattern
//!
//! The redis-rs `ConnectionManager` is the process-wide store handle: it is
//! cheap to clone, safe to use concurrently, and reconnects with backoff on
//! connection loss. Callers observe failures as returned errors, never
//! silent data loss. Each operation clones the manager rather than sharing
//! via a lock.

use crate::config::Config;
use crate::store::{lua, HashStore, StoreError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::collections::HashMap;
use tracing::{debug, error, instrument};

/// Redis-backed [`HashStore`].
#[derive(Clone)]
pub struct RedisStore {
    /// Managed connection (cheaply cloneable, reconnects automatically).
    manager: ConnectionManager,
    /// Precompiled create-if-absent script.
    create_script: Script,
    /// Precompiled set-if-exists script.
    update_script: Script,
}

impl RedisStore {
    /// Connect to the store described by the configuration.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Connection` if the initial connection fails.
    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        let info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(config.store_host.clone(), config.store_port),
            redis: redis::RedisConnectionInfo {
                password: Some(config.store_password.clone()),
                ..Default::default()
            },
        };

        let client = Client::open(info).map_err(|e| {
            // Do NOT log connection info, it carries the password
            error!(target: "broker.store.client", error = %e, "Failed to open store client");
            StoreError::Connection(format!("Failed to open store client: {e}"))
        })?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            error!(target: "broker.store.client", error = %e, "Failed to connect to store");
            StoreError::Connection(format!("Failed to connect to store: {e}"))
        })?;

        debug!(target: "broker.store.client", "Store connection established");

        Ok(Self {
            manager,
            create_script: Script::new(lua::HASH_CREATE_IF_ABSENT),
            update_script: Script::new(lua::HASH_SET_IF_EXISTS),
        })
    }
}

fn command_error(op: &str, err: redis::RedisError) -> StoreError {
    StoreError::Command(format!("{op} failed: {err}"))
}

#[async_trait]
impl HashStore for RedisStore {
    #[instrument(skip_all)]
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| command_error("PING", e))?;
        Ok(())
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn hash_get_all(
        &self,
        key: &str,
    ) -> Result<Option<HashMap<String, String>>, StoreError> {
        let mut conn = self.manager.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(key)
            .await
            .map_err(|e| command_error("HGETALL", e))?;

        // HGETALL yields an empty map for a missing key
        Ok(if fields.is_empty() { None } else { Some(fields) })
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        conn.hset_multiple::<_, _, _, ()>(key, fields)
            .await
            .map_err(|e| command_error("HSET", e))
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn hash_create(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();

        let mut invocation = self.create_script.key(key);
        for (field, value) in fields {
            invocation.arg(field).arg(value);
        }

        let created: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| command_error("create-if-absent script", e))?;

        Ok(created == 1)
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn hash_update(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();

        let mut invocation = self.update_script.key(key);
        for (field, value) in fields {
            invocation.arg(field).arg(value);
        }

        let updated: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| command_error("set-if-exists script", e))?;

        Ok(updated == 1)
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn.del(key).await.map_err(|e| command_error("DEL", e))?;
        Ok(removed > 0)
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();
        conn.exists(key).await.map_err(|e| command_error("EXISTS", e))
    }

    #[instrument(skip_all, fields(pattern = %pattern))]
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.manager.clone();
        conn.keys(pattern).await.map_err(|e| command_error("KEYS", e))
    }

    #[instrument(skip_all, fields(count = keys.len()))]
    async fn hash_get_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<HashMap<String, String>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in keys {
            pipe.hgetall(key);
        }

        pipe.query_async(&mut conn)
            .await
            .map_err(|e| command_error("pipelined HGETALL", e))
    }
}
