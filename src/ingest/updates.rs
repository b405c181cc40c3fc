//! Updates loop (§4.7.3): incremental walk into whatever indexes currently
//! hold the feed, live or still building.

use super::error::IngestError;
use super::{fetch_page, updates_seed_key, updates_url_key, FeedContext, UNSET_SEED_SENTINEL};
use crate::coordination::KvStore;
use crate::metrics::Metrics;
use crate::search::gateway::SearchGateway;
use crate::search::index_name;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

const INGEST_TYPE: &str = "updates";
pub const UPDATES_INTERVAL: Duration = Duration::from_secs(1);

#[instrument(skip(ctx, gateway, kv, client, metrics), fields(feed_id = %ctx.config.unique_id))]
pub async fn run_once(
    ctx: &Arc<FeedContext>,
    gateway: &SearchGateway,
    kv: &dyn KvStore,
    client: &reqwest::Client,
    metrics: &Metrics,
) -> Result<(), IngestError> {
    let feed_id = ctx.config.unique_id.as_str();

    let mut start_url = load_cursor(feed_id, kv).await?;
    while start_url.is_none() {
        tokio::time::sleep(UPDATES_INTERVAL).await;
        start_url = load_cursor(feed_id, kv).await?;
    }
    let mut current_url = start_url.expect("loop only exits once Some");

    let listing = gateway.list_indexes().await?;
    let targets: Vec<String> = listing
        .without_alias
        .iter()
        .chain(listing.with_alias.iter())
        .filter(|name| index_name::matches_feed(name, feed_id))
        .cloned()
        .collect();

    loop {
        let total_start = Instant::now();

        let pull_start = Instant::now();
        let page = fetch_page(ctx, client, &current_url).await?;
        metrics
            .stage_duration_seconds
            .with_label_values(&[feed_id, INGEST_TYPE, "pull"])
            .observe(pull_start.elapsed().as_secs_f64());

        let items = ctx.adapter.convert_to_bulk(&page, &targets);
        let item_count = items.len() as u64;

        let push_start = Instant::now();
        gateway.bulk(&items).await?;
        metrics
            .stage_duration_seconds
            .with_label_values(&[feed_id, INGEST_TYPE, "push"])
            .observe(push_start.elapsed().as_secs_f64());
        metrics
            .items_pushed_total
            .with_label_values(&[feed_id])
            .inc_by(item_count);

        metrics
            .stage_duration_seconds
            .with_label_values(&[feed_id, INGEST_TYPE, "total"])
            .observe(total_start.elapsed().as_secs_f64());

        let next = ctx.adapter.next_href(&page);
        current_url = if next.is_empty() {
            break;
        } else {
            next
        };
        // No inter-page sleep here: updates passes are assumed small (§4.7.3).
    }

    let live: Vec<&String> = listing
        .with_alias
        .iter()
        .filter(|name| index_name::matches_feed(name, feed_id))
        .collect();
    for index in live {
        gateway.refresh(index).await?;
    }

    kv.set(&updates_url_key(feed_id), &current_url).await?;

    tokio::time::sleep(UPDATES_INTERVAL).await;
    Ok(())
}

/// `feed_updates_url` if present, else `feed_updates_seed_url` unless it's
/// still the unset sentinel (full ingest hasn't produced a starting point).
async fn load_cursor(feed_id: &str, kv: &dyn KvStore) -> Result<Option<String>, IngestError> {
    if let Some(url) = kv.get(&updates_url_key(feed_id)).await? {
        return Ok(Some(url));
    }
    match kv.get(&updates_seed_key(feed_id)).await? {
        Some(seed) if seed != UNSET_SEED_SENTINEL => Ok(Some(seed)),
        _ => Ok(None),
    }
}
