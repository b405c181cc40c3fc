//! Shared helpers for the feed adapter implementations.

use crate::search::gateway::BulkItem;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Use the activity's own `id` if it has one and it is a string; otherwise
/// hash the whole serialised record so indexing stays idempotent even for
/// feeds that don't surface a stable identifier.
pub fn stable_id(item: &Value) -> String {
    match item.get("id") {
        Some(Value::String(id)) => return id.clone(),
        Some(Value::Number(id)) => return id.to_string(),
        _ => {}
    }
    let serialised = serde_json::to_vec(item).unwrap_or_default();
    hex::encode(Sha256::digest(serialised))
}

/// Fan `item` out to every target index, one bulk pair per index.
pub fn fan_out(item: Value, index_names: &[String]) -> Vec<BulkItem> {
    let id = stable_id(&item);
    index_names
        .iter()
        .map(|index| BulkItem {
            action: json!({ "index": { "_id": id, "_index": index } }),
            source: item.clone(),
        })
        .collect()
}
