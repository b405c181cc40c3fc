//! Per-feed-type parsing into bulk-index records, next-page extraction, and
//! outbound auth (§4.4).

pub mod activity_stream;
pub mod common;
pub mod config;
pub mod zendesk;

use crate::search::gateway::BulkItem;
use crate::signing::SigningError;
use config::{FeedConfig, FeedType};
use serde_json::Value;

/// Capability set every feed type must implement. `auth_headers` is sync —
/// Hawk signing needs only the clock and the feed's own credentials, no I/O.
pub trait FeedAdapter: Send + Sync {
    fn auth_headers(&self, url: &str) -> Result<Vec<(String, String)>, SigningError>;

    /// Empty string means pagination has terminated.
    fn next_href(&self, page: &Value) -> String;

    fn convert_to_bulk(&self, page: &Value, index_names: &[String]) -> Vec<BulkItem>;
}

pub fn build_adapter(config: &FeedConfig) -> Box<dyn FeedAdapter> {
    match config.feed_type {
        FeedType::ActivityStream => Box::new(activity_stream::ActivityStreamAdapter::new(config)),
        FeedType::Zendesk => Box::new(zendesk::ZendeskAdapter::new(config)),
    }
}
