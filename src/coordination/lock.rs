//! Cross-process single-leader lease (§4.5).
//!
//! Only the leader runs the Ingestion Engine and the Metrics Sampler; every
//! instance runs the read façade. The lease is never explicitly deleted on
//! shutdown — its TTL alone bounds how long a crashed leader's lock persists
//! before another instance can take over.

use super::kv::KvStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid_like::process_token;

const LOCK_KEY: &str = "lock";

/// Handle to a held lease. Dropping or cancelling the token stops the
/// background renewer; it does not release the key in the store.
pub struct LockHandle {
    renewer: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

impl LockHandle {
    pub fn stop_renewing(&self) {
        self.cancel.cancel();
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.renewer.abort();
    }
}

/// Block until the lock is acquired, retrying on the given backoff schedule
/// (same semantics as the Supervisor's), then start a background renewer
/// that re-sets the TTL at `ttl / 2`. Returns once acquired; the renewer
/// keeps running until `cancel` fires or the handle is dropped.
#[tracing::instrument(skip(store, retry_schedule, cancel))]
pub async fn acquire_and_keep(
    store: Arc<dyn KvStore>,
    ttl: Duration,
    retry_schedule: &[u64],
    cancel: CancellationToken,
) -> LockHandle {
    let token = process_token();
    let mut consecutive_failures: usize = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        match store.set_nx_ttl(LOCK_KEY, &token, ttl).await {
            Ok(true) => {
                info!("acquired leader lock");
                break;
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "lock acquisition attempt failed"),
        }

        let index = consecutive_failures.min(retry_schedule.len().saturating_sub(1));
        let delay = Duration::from_secs(*retry_schedule.get(index).unwrap_or(&1));
        consecutive_failures += 1;

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => break,
        }
    }

    let renewer_cancel = cancel.clone();
    let renewer_store = store.clone();
    let renew_interval = ttl / 2;
    let renewer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(renew_interval) => {
                    if let Err(e) = renewer_store.set_with_ttl(LOCK_KEY, &token, ttl).await {
                        warn!(error = %e, "lock renewal failed");
                    }
                }
                _ = renewer_cancel.cancelled() => break,
            }
        }
    });

    LockHandle { renewer, cancel }
}

/// A process-unique token, distinct enough to tell two leaders apart in
/// logs without pulling in a dedicated UUID dependency for one call site.
mod uuid_like {
    use rand::Rng;

    pub fn process_token() -> String {
        let mut rng = rand::thread_rng();
        let bytes: [u8; 16] = rng.gen();
        hex::encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::kv::InMemoryKvStore;

    #[tokio::test]
    async fn acquires_immediately_when_key_is_free() {
        let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let cancel = CancellationToken::new();
        let handle = acquire_and_keep(store.clone(), Duration::from_secs(10), &[1], cancel.clone()).await;
        assert!(store.get("lock").await.unwrap().is_some());
        handle.stop_renewing();
    }

    #[tokio::test]
    async fn renewer_refreshes_ttl_before_it_would_expire() {
        let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let cancel = CancellationToken::new();
        let handle = acquire_and_keep(
            store.clone(),
            Duration::from_millis(60),
            &[1],
            cancel.clone(),
        )
        .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.get("lock").await.unwrap().is_some());
        handle.stop_renewing();
    }

    #[tokio::test]
    async fn cancellation_during_acquisition_returns_promptly() {
        let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        store
            .set_with_ttl("lock", "someone-else", Duration::from_secs(60))
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel_clone.cancel();
        });
        let started = tokio::time::Instant::now();
        let handle = acquire_and_keep(store, Duration::from_secs(10), &[30], cancel).await;
        assert!(started.elapsed() < Duration::from_secs(1));
        handle.stop_renewing();
    }
}
