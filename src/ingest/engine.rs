//! Wires together startup GC and the per-feed supervised loops.

use super::error::IngestError;
use super::{full, updates, FeedContext};
use crate::coordination::KvStore;
use crate::feeds::config::FeedConfig;
use crate::metrics::Metrics;
use crate::search::gateway::SearchGateway;
use crate::supervisor;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct IngestionEngine {
    gateway: Arc<SearchGateway>,
    kv: Arc<dyn KvStore>,
    client: reqwest::Client,
    metrics: Arc<Metrics>,
    feeds: Vec<FeedConfig>,
}

impl IngestionEngine {
    pub fn new(
        gateway: Arc<SearchGateway>,
        kv: Arc<dyn KvStore>,
        client: reqwest::Client,
        metrics: Arc<Metrics>,
        feeds: Vec<FeedConfig>,
    ) -> Self {
        Self {
            gateway,
            kv,
            client,
            metrics,
            feeds,
        }
    }

    /// §4.7.1: delete every index whose `feed_id_*` substring doesn't match
    /// a currently configured feed.
    pub async fn startup_gc(&self) -> Result<(), IngestError> {
        let listing = self.gateway.list_indexes().await?;
        let feed_ids: Vec<&str> = self.feeds.iter().map(|f| f.unique_id.as_str()).collect();
        let orphaned = SearchGateway::indexes_matching_no_feeds(&listing, feed_ids.into_iter());

        for name in &orphaned {
            info!(index = %name, "deleting index for decommissioned feed");
            self.gateway.delete_index(name, true).await?;
        }
        Ok(())
    }

    /// Spawn the full-ingest and updates supervised loops for every
    /// configured feed. Returns the join handles so the caller can await
    /// clean shutdown after cancelling `cancel`.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for feed_config in self.feeds.clone() {
            let feed_id = feed_config.unique_id.clone();
            let schedule = feed_config.exception_backoff_schedule.clone();
            let ctx = FeedContext::new(feed_config);

            let engine = self.clone();
            let ctx_full = ctx.clone();
            let cancel_full = cancel.clone();
            let schedule_full = schedule.clone();
            let task_name_full = format!("full-ingest:{feed_id}");
            handles.push(tokio::spawn(async move {
                supervisor::repeat_until_cancelled(&task_name_full, &schedule_full, cancel_full, move || {
                    let engine = engine.clone();
                    let ctx = ctx_full.clone();
                    async move {
                        full::run_once(&ctx, &engine.gateway, engine.kv.as_ref(), &engine.client, &engine.metrics)
                            .await
                    }
                })
                .await;
            }));

            let engine = self.clone();
            let ctx_updates = ctx;
            let cancel_updates = cancel.clone();
            let task_name_updates = format!("updates:{feed_id}");
            handles.push(tokio::spawn(async move {
                supervisor::repeat_until_cancelled(&task_name_updates, &schedule, cancel_updates, move || {
                    let engine = engine.clone();
                    let ctx = ctx_updates.clone();
                    async move {
                        updates::run_once(&ctx, &engine.gateway, engine.kv.as_ref(), &engine.client, &engine.metrics)
                            .await
                    }
                })
                .await;
            }));
        }

        handles
    }
}
