//! Full ingest loop (§4.7.2): `init → scrub → create → page_loop → refresh
//! → cutover → record_cursor → sleep`.

use super::error::IngestError;
use super::{fetch_page, updates_seed_key, FeedContext, UNSET_SEED_SENTINEL};
use crate::coordination::KvStore;
use crate::metrics::Metrics;
use crate::search::gateway::SearchGateway;
use crate::search::index_name;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

const INGEST_TYPE: &str = "full";

#[instrument(skip(ctx, gateway, kv, client, metrics), fields(feed_id = %ctx.config.unique_id))]
pub async fn run_once(
    ctx: &Arc<FeedContext>,
    gateway: &SearchGateway,
    kv: &dyn KvStore,
    client: &reqwest::Client,
    metrics: &Metrics,
) -> Result<(), IngestError> {
    let feed_id = ctx.config.unique_id.as_str();
    let seed_key = updates_seed_key(feed_id);

    // init
    kv.set(&seed_key, UNSET_SEED_SENTINEL).await?;

    // scrub: delete every building index left over from an incomplete prior full ingest.
    let listing = gateway.list_indexes().await?;
    for stale in listing
        .without_alias
        .iter()
        .filter(|name| index_name::matches_feed(name, feed_id))
    {
        gateway.delete_index(stale, true).await?;
    }

    // create
    let new_index = index_name::new_index_name(feed_id, chrono::Utc::now());
    gateway.create_index(&new_index).await?;
    gateway.put_mapping(&new_index).await?;
    let targets = vec![new_index.clone()];

    // page_loop
    let mut current_url = ctx.config.seed_url.clone();
    let mut updates_seed = current_url.clone();

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
        updates_seed = current_url;

        if next.is_empty() {
            break;
        }
        current_url = next;
        tokio::time::sleep(ctx.config.polling_page_interval).await;
    }

    // refresh
    gateway.refresh(&new_index).await?;

    // cutover
    gateway
        .alias_flip(&new_index, &index_name::feed_alias_removal_pattern(feed_id))
        .await?;

    // record_cursor
    kv.set(&seed_key, &updates_seed).await?;

    info!(feed_id, index = %new_index, "full ingest complete");

    // sleep: periodicity resolved to the feed's own polling_seed_interval —
    // the supervisor treats this Ok(()) return as a clean-but-unexpected
    // completion and restarts immediately with no backoff.
    tokio::time::sleep(ctx.config.polling_seed_interval).await;

    Ok(())
}
