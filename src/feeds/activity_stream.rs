//! The `activity_stream` feed type: `{"orderedItems": [...], "next_url": ...}`.

use super::common::fan_out;
use super::config::FeedConfig;
use super::FeedAdapter;
use crate::search::gateway::BulkItem;
use crate::signing::hawk::{self, HawkCredentials};
use crate::signing::SigningError;
use serde_json::Value;

pub struct ActivityStreamAdapter {
    credentials: HawkCredentials,
}

impl ActivityStreamAdapter {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            credentials: HawkCredentials {
                id: config.access_key_id.clone(),
                key: config.secret_access_key.clone(),
            },
        }
    }
}

impl FeedAdapter for ActivityStreamAdapter {
    fn auth_headers(&self, url: &str) -> Result<Vec<(String, String)>, SigningError> {
        let header = hawk::sign(&self.credentials, "GET", url, b"", "")?;
        Ok(vec![("authorization".to_string(), header)])
    }

    fn next_href(&self, page: &Value) -> String {
        page.get("next_url")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    }

    fn convert_to_bulk(&self, page: &Value, index_names: &[String]) -> Vec<BulkItem> {
        page.get("orderedItems")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .flat_map(|item| fan_out(item.clone(), index_names))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter() -> ActivityStreamAdapter {
        ActivityStreamAdapter::new(&FeedConfig {
            unique_id: "F1".to_string(),
            feed_type: super::super::config::FeedType::ActivityStream,
            seed_url: "http://feed/1".to_string(),
            access_key_id: "id".to_string(),
            secret_access_key: "secret".to_string(),
            polling_page_interval: std::time::Duration::from_secs(1),
            polling_seed_interval: std::time::Duration::from_secs(5),
            exception_backoff_schedule: vec![1],
        })
    }

    #[test]
    fn next_href_defaults_to_empty_string() {
        let page = json!({ "orderedItems": [] });
        assert_eq!(adapter().next_href(&page), "");
    }

    #[test]
    fn convert_to_bulk_fans_out_to_every_index() {
        let page = json!({ "orderedItems": [{ "id": "a" }, { "id": "b" }] });
        let items = adapter().convert_to_bulk(&page, &["idx1".to_string(), "idx2".to_string()]);
        assert_eq!(items.len(), 4);
    }
}
