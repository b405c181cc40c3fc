//! Orchestrates the full and updates pipelines, index lifecycle, and alias
//! flips (§4.7) — the core state machine.

pub mod engine;
pub mod error;
pub mod full;
pub mod updates;

use crate::feeds::config::FeedConfig;
use crate::feeds::{build_adapter, FeedAdapter};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Sentinel written to `feed_updates_seed_url:<id>` by `init` (§4.7.2 step 1)
/// and read back by the updates loop (§4.7.3 step 1) to detect that no full
/// ingest has completed yet.
pub const UNSET_SEED_SENTINEL: &str = "__unset__";

/// Per-feed state shared between the full and updates loops: the adapter
/// and the fetch mutex that bounds outbound concurrency to one request at a
/// time for this feed (§6, "per-feed mutual exclusion of outbound fetches
/// is mandatory").
pub struct FeedContext {
    pub config: FeedConfig,
    pub adapter: Box<dyn FeedAdapter>,
    pub fetch_mutex: Arc<Mutex<()>>,
}

impl FeedContext {
    pub fn new(config: FeedConfig) -> Arc<Self> {
        let adapter = build_adapter(&config);
        Arc::new(Self {
            config,
            adapter,
            fetch_mutex: Arc::new(Mutex::new(())),
        })
    }
}

pub fn updates_seed_key(feed_id: &str) -> String {
    format!("feed_updates_seed_url:{feed_id}")
}

pub fn updates_url_key(feed_id: &str) -> String {
    format!("feed_updates_url:{feed_id}")
}

/// Pull one page: acquire the per-feed fetch mutex only for the HTTP call
/// itself (§4.7 intro), release it before returning so parse/push never
/// blocks a sibling loop's next fetch.
pub async fn fetch_page(
    ctx: &FeedContext,
    client: &reqwest::Client,
    url: &str,
) -> Result<serde_json::Value, error::IngestError> {
    let headers = ctx.adapter.auth_headers(url)?;
    let headers: Vec<(&str, String)> = headers.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();

    let (status, body) = {
        let _guard = ctx.fetch_mutex.lock().await;
        crate::http_client::request(client, reqwest::Method::GET, url, &headers, Vec::new()).await?
    };

    if !status.is_success() {
        return Err(error::IngestError::Feed {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }

    Ok(serde_json::from_slice(&body)?)
}
