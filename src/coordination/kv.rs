//! Shared key-value store abstraction.
//!
//! This is the only cross-process coordination channel (§5): per-feed
//! cursors, the leader lock, the serialised metrics snapshot and the
//! public-to-private scroll id mapping all live here. A trait lets tests
//! substitute an in-memory store instead of standing up Redis.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("kv store transport error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;

    /// Atomic `SET key value NX EX ttl`; `true` iff this call set the key.
    async fn set_nx_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError>;

    async fn delete(&self, key: &str) -> Result<(), KvError>;
}

/// Redis-backed store. `redis::aio::ConnectionManager` reconnects
/// transparently, which matters here: a feed worker or the lock renewer
/// should not die because Redis briefly dropped a TCP connection.
#[derive(Clone)]
pub struct RedisKvStore {
    manager: redis::aio::ConnectionManager,
}

impl RedisKvStore {
    pub async fn connect(uri: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(uri)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.manager.clone();
        Ok(redis::cmd("GET").arg(key).query_async(&mut conn).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_nx_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut conn = self.manager.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL").arg(key).query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

/// In-memory fake used by tests; not exposed outside `#[cfg(test)]` builds
/// elsewhere in the crate, but kept public here so integration tests in
/// `tests/` can use it too.
#[derive(Default, Clone)]
pub struct InMemoryKvStore {
    entries: std::sync::Arc<DashMap<String, Entry>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if entry.expires_at.is_some_and(|at| Instant::now() >= at) {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(self.live_value(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_nx_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        if self.live_value(key).is_some() {
            return Ok(false);
        }
        self.set_with_ttl(key, value, ttl).await?;
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_nx_ttl_only_succeeds_once() {
        let store = InMemoryKvStore::new();
        assert!(store.set_nx_ttl("lock", "a", Duration::from_secs(10)).await.unwrap());
        assert!(!store.set_nx_ttl("lock", "b", Duration::from_secs(10)).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap(), Some("a".to_string()));
    }

    #[tokio::test]
    async fn expired_entry_is_treated_as_absent() {
        let store = InMemoryKvStore::new();
        store
            .set_with_ttl("k", "v", Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn plain_set_has_no_expiry() {
        let store = InMemoryKvStore::new();
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }
}
