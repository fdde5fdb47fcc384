//! Thin contract over the staging store.
//!
//! The pipeline only ever needs four operations against Redis, so they sit
//! behind a trait object: the committer and sweeper run against
//! [`MockStagingStore`] in tests without a live server.
use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};

use crate::error::AutosaveError;

#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Upsert. Resets the TTL countdown even when the key already exists.
    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AutosaveError>;

    async fn get(&self, key: &str) -> Result<Option<String>, AutosaveError>;

    /// Idempotent; deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), AutosaveError>;

    /// Key enumeration for the reconciliation sweep. Cursor-based, never
    /// KEYS.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, AutosaveError>;
}

pub struct RedisStagingStore {
    connection: ConnectionManager,
}

impl RedisStagingStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl StagingStore for RedisStagingStore {
    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AutosaveError> {
        let mut connection = self.connection.clone();
        let _: () = connection.set_ex(key, value, ttl_secs).await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AutosaveError> {
        let mut connection = self.connection.clone();
        let value: Option<String> = connection.get(key).await?;

        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<(), AutosaveError> {
        let mut connection = self.connection.clone();
        let _: () = connection.del(key).await?;

        Ok(())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, AutosaveError> {
        let mut connection = self.connection.clone();
        let mut keys = Vec::new();

        let mut iter: redis::AsyncIter<String> = connection.scan_match(pattern).await?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }

        Ok(keys)
    }
}
