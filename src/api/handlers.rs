//! Route handlers for the read façade, the incoming endpoint, and the
//! metrics page.

use super::{ApiState, SCROLL_MAPPING_TTL};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::Rng;
use serde_json::{json, Value};

pub const SCROLL_TTL: &str = "1m";
const PAGE_SIZE: u64 = 100;

fn private_scroll_key(public_id: &str) -> String {
    format!("private-scroll-id-{public_id}")
}

fn random_public_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Build an ActivityStreams `Collection` from a raw search/scroll response,
/// registering a fresh public scroll token for `next` when the backend
/// handed back a scroll id and there were items on this page.
async fn collection_response(state: &ApiState, response: &Value) -> Result<Value, Response> {
    let hits = response["hits"]["hits"].as_array().cloned().unwrap_or_default();
    let ordered_items: Vec<Value> = hits
        .into_iter()
        .map(|hit| hit.get("_source").cloned().unwrap_or(Value::Null))
        .collect();

    let mut collection = json!({ "orderedItems": ordered_items });

    if !ordered_items_is_empty(&collection) {
        if let Some(scroll_id) = response["_scroll_id"].as_str() {
            let public_id = random_public_id();
            state
                .kv
                .set_with_ttl(&private_scroll_key(&public_id), scroll_id, SCROLL_MAPPING_TTL)
                .await
                .map_err(|_| (StatusCode::SERVICE_UNAVAILABLE, "scroll store unavailable").into_response())?;
            collection["next"] = Value::String(format!("/v1/objects/{public_id}"));
        }
    }

    Ok(collection)
}

fn ordered_items_is_empty(collection: &Value) -> bool {
    collection["orderedItems"]
        .as_array()
        .map(Vec::is_empty)
        .unwrap_or(true)
}

pub async fn list_objects(State(state): State<ApiState>) -> Response {
    let body = json!({ "size": PAGE_SIZE, "query": { "match_all": {} } });
    let response = match state.gateway.search(crate::search::index_name::ALIAS, &format!("scroll={SCROLL_TTL}"), body).await {
        Ok(r) => r,
        Err(e) => return (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    };

    match collection_response(&state, &response).await {
        Ok(collection) => Json(collection).into_response(),
        Err(response) => response,
    }
}

pub async fn scroll_objects(State(state): State<ApiState>, Path(public_scroll_id): Path<String>) -> Response {
    let private_id = match state.kv.get(&private_scroll_key(&public_scroll_id)).await {
        Ok(Some(id)) => id,
        Ok(None) => return (StatusCode::NOT_FOUND, "unknown or expired scroll id").into_response(),
        Err(_) => return (StatusCode::SERVICE_UNAVAILABLE, "scroll store unavailable").into_response(),
    };

    let response = match state.gateway.scroll(&private_id, SCROLL_TTL).await {
        Ok(r) => r,
        Err(e) => return (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    };

    match collection_response(&state, &response).await {
        Ok(collection) => Json(collection).into_response(),
        Err(response) => response,
    }
}

pub async fn incoming(State(_state): State<ApiState>, _body: axum::body::Bytes) -> Response {
    StatusCode::ACCEPTED.into_response()
}

pub async fn metrics(State(state): State<ApiState>) -> Response {
    let rendered = match state.kv.get("metrics").await {
        Ok(Some(snapshot)) => snapshot,
        _ => state.metrics.render(),
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        rendered,
    )
        .into_response()
}
