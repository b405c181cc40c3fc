//! Periodic metrics sampling (§4.8): searchable/nonsearchable counts,
//! per-feed breakdowns, and verification feed staleness, serialised into the
//! shared KV store for every instance's `/metrics` endpoint to serve.

use crate::coordination::KvStore;
use crate::feeds::config::FeedConfig;
use crate::metrics::Metrics;
use crate::search::gateway::{SearchError, SearchGateway};
use crate::search::index_name::{self, ALIAS};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const METRICS_INTERVAL: Duration = Duration::from_secs(1);
const KV_KEY: &str = "metrics";

/// The `object.type` value whose freshest `published` we track as a
/// pipeline staleness signal.
const VERIFICATION_OBJECT_TYPE: &str = "dit:activityStreamVerificationFeed:Verifier";

pub struct MetricsSampler {
    gateway: Arc<SearchGateway>,
    kv: Arc<dyn KvStore>,
    metrics: Arc<Metrics>,
    feeds: Vec<FeedConfig>,
}

impl MetricsSampler {
    pub fn new(
        gateway: Arc<SearchGateway>,
        kv: Arc<dyn KvStore>,
        metrics: Arc<Metrics>,
        feeds: Vec<FeedConfig>,
    ) -> Self {
        Self {
            gateway,
            kv,
            metrics,
            feeds,
        }
    }

    /// One sampling pass. Returns `Ok` even when individual metrics were
    /// unavailable — that case is carved out by the spec as "silently
    /// skipped", not an error the supervisor should back off on.
    pub async fn sample_once(&self) -> Result<(), SearchError> {
        self.sample_totals().await?;
        self.sample_per_feed().await?;
        self.sample_verification_age().await;

        let snapshot = self.metrics.render();
        self.kv
            .set(KV_KEY, &snapshot)
            .await
            .map_err(|_| SearchError::MetricsUnavailable)?;
        Ok(())
    }

    async fn sample_totals(&self) -> Result<(), SearchError> {
        match self.gateway.count(ALIAS, "").await {
            Ok(n) => self.metrics.searchable_total.set(n as i64),
            Err(SearchError::MetricsUnavailable) => {}
            Err(e) => return Err(e),
        }

        let listing = self.gateway.list_indexes().await?;
        let mut nonsearchable = 0i64;
        for index in &listing.without_alias {
            match self.gateway.count(index, "").await {
                Ok(n) => nonsearchable += n as i64,
                Err(SearchError::MetricsUnavailable) => {}
                Err(e) => return Err(e),
            }
        }
        self.metrics.nonsearchable_total.set(nonsearchable);
        Ok(())
    }

    async fn sample_per_feed(&self) -> Result<(), SearchError> {
        let listing = self.gateway.list_indexes().await?;

        for feed in &self.feeds {
            let mut searchable = 0i64;
            for index in listing.with_alias.iter().filter(|n| index_name::matches_feed(n, &feed.unique_id)) {
                match self.gateway.count(index, "").await {
                    Ok(n) => searchable += n as i64,
                    Err(SearchError::MetricsUnavailable) => {}
                    Err(e) => return Err(e),
                }
            }
            self.metrics
                .feed_searchable_total
                .with_label_values(&[feed.unique_id.as_str()])
                .set(searchable);

            let mut nonsearchable = 0i64;
            for index in listing
                .without_alias
                .iter()
                .filter(|n| index_name::matches_feed(n, &feed.unique_id))
            {
                match self.gateway.count(index, "").await {
                    Ok(n) => nonsearchable += n as i64,
                    Err(SearchError::MetricsUnavailable) => {}
                    Err(e) => return Err(e),
                }
            }
            self.metrics
                .feed_nonsearchable_total
                .with_label_values(&[feed.unique_id.as_str()])
                .set(nonsearchable);
        }
        Ok(())
    }

    async fn sample_verification_age(&self) {
        let body = json!({
            "size": 0,
            "query": { "term": { "object.type": VERIFICATION_OBJECT_TYPE } },
            "aggs": { "latest": { "max": { "field": "published" } } }
        });

        let response = match self.gateway.search(ALIAS, "", body).await {
            Ok(r) => r,
            Err(SearchError::MetricsUnavailable) => return,
            Err(e) => {
                debug!(error = %e, "verification age query failed, skipping this sample");
                return;
            }
        };

        let Some(value_millis) = response["aggregations"]["latest"]["value"].as_f64() else {
            // absent aggregation result: no verification activity indexed yet.
            return;
        };

        let now_millis = chrono::Utc::now().timestamp_millis() as f64;
        let age_seconds = ((now_millis - value_millis) / 1000.0).max(0.0) as i64;
        self.metrics.verification_age_seconds.set(age_seconds);
    }
}
