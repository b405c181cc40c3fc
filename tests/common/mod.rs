//! Shared test infrastructure: in-process fake search backend and feed
//! server, standing in for the real Elasticsearch-compatible backend and an
//! upstream activity feed. Grounded in the upstream `run_es_application` /
//! `run_feed_application` test helpers, which did the same thing with
//! `aiohttp.web` instead of `axum`.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// One index's state in the fake backend: alias membership and the source
/// documents bulked into it so far.
#[derive(Default, Clone)]
struct IndexEntry {
    has_alias: bool,
    docs: Vec<Value>,
}

#[derive(Default)]
struct BackendState {
    indices: HashMap<String, IndexEntry>,
    requests: Vec<(Method, String)>,
    fail_once: HashSet<(Method, String)>,
}

#[derive(Clone)]
struct Shared(Arc<Mutex<BackendState>>);

/// A running fake search backend. Holds the listener's join handle so the
/// server is torn down when the test's handle is dropped.
pub struct FakeSearchBackend {
    pub addr: SocketAddr,
    state: Shared,
    server: JoinHandle<()>,
}

impl Drop for FakeSearchBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl FakeSearchBackend {
    pub async fn spawn() -> Self {
        let state = Shared(Arc::new(Mutex::new(BackendState::default())));
        let app = Router::new()
            .route("/_aliases", get(list_indexes).post(alias_flip))
            .route("/_bulk", post(bulk))
            .route("/_search/scroll", post(scroll))
            .route("/:name", put(create_index).delete(delete_index))
            .route("/:name/_mapping/_doc", put(put_mapping))
            .route("/:name/_refresh", post(refresh))
            .route("/:name/_count", get(count))
            .route("/:name/_search", post(search))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake backend");
        let addr = listener.local_addr().expect("local addr");
        let server = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.ok();
        });

        Self { addr, state, server }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Host:port pair the way `ElasticsearchConfig` splits it.
    pub fn host_port(&self) -> (String, String) {
        (self.addr.ip().to_string(), self.addr.port().to_string())
    }

    pub async fn index_exists(&self, name: &str) -> bool {
        self.state.0.lock().await.indices.contains_key(name)
    }

    pub async fn index_has_alias(&self, name: &str) -> bool {
        self.state
            .0
            .lock()
            .await
            .indices
            .get(name)
            .map(|entry| entry.has_alias)
            .unwrap_or(false)
    }

    pub async fn docs_in(&self, name: &str) -> Vec<Value> {
        self.state
            .0
            .lock()
            .await
            .indices
            .get(name)
            .map(|entry| entry.docs.clone())
            .unwrap_or_default()
    }

    pub async fn request_log(&self) -> Vec<(Method, String)> {
        self.state.0.lock().await.requests.clone()
    }

    pub async fn request_count(&self, method: Method, path: &str) -> usize {
        self.state
            .0
            .lock()
            .await
            .requests
            .iter()
            .filter(|(m, p)| *m == method && p == path)
            .count()
    }

    /// Arrange for the next request matching `method`/`path` to receive a
    /// 503, simulating a transient backend outage. One-shot: consumed by
    /// the first matching request, so later requests to the same path
    /// succeed normally.
    pub async fn fail_once(&self, method: Method, path: impl Into<String>) {
        self.state.0.lock().await.fail_once.insert((method, path.into()));
    }
}

async fn record(state: &Shared, method: Method, path: String) {
    state.0.lock().await.requests.push((method, path));
}

/// Consumes a pending fault injection for `method`/`path`, if any. Returns
/// whether the caller should answer this request with a 503.
async fn take_failure(state: &Shared, method: &Method, path: &str) -> bool {
    state.0.lock().await.fail_once.remove(&(method.clone(), path.to_string()))
}

async fn list_indexes(State(state): State<Shared>) -> Response {
    record(&state, Method::GET, "/_aliases".to_string()).await;
    let guard = state.0.lock().await;
    let mut body = serde_json::Map::new();
    for (name, entry) in &guard.indices {
        let aliases = if entry.has_alias {
            json!({ "activities": {} })
        } else {
            json!({})
        };
        body.insert(name.clone(), json!({ "aliases": aliases }));
    }
    Json(Value::Object(body)).into_response()
}

async fn create_index(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    record(&state, Method::PUT, format!("/{name}")).await;
    state.0.lock().await.indices.entry(name).or_default();
    Json(json!({})).into_response()
}

async fn delete_index(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    record(&state, Method::DELETE, format!("/{name}")).await;
    let removed = state.0.lock().await.indices.remove(&name).is_some();
    if removed {
        Json(json!({})).into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(json!({"error": "index_not_found"}))).into_response()
    }
}

async fn put_mapping(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    record(&state, Method::PUT, format!("/{name}/_mapping/_doc")).await;
    Json(json!({})).into_response()
}

async fn refresh(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    record(&state, Method::POST, format!("/{name}/_refresh")).await;
    Json(json!({})).into_response()
}

async fn count(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    let path = format!("/{name}/_count");
    record(&state, Method::GET, path.clone()).await;
    if take_failure(&state, &Method::GET, &path).await {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let guard = state.0.lock().await;
    let n: usize = if name == "activities" {
        guard.indices.values().filter(|e| e.has_alias).map(|e| e.docs.len()).sum()
    } else {
        guard.indices.get(&name).map(|e| e.docs.len()).unwrap_or(0)
    };
    Json(json!({ "count": n })).into_response()
}

async fn search(
    State(state): State<Shared>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let path = format!("/{name}/_search");
    record(&state, Method::POST, path.clone()).await;
    if take_failure(&state, &Method::POST, &path).await {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let guard = state.0.lock().await;
    let docs: Vec<Value> = if name == "activities" {
        guard
            .indices
            .values()
            .filter(|e| e.has_alias)
            .flat_map(|e| e.docs.clone())
            .collect()
    } else {
        guard.indices.get(&name).map(|e| e.docs.clone()).unwrap_or_default()
    };
    drop(guard);

    let hits: Vec<Value> = docs.iter().cloned().map(|source| json!({ "_source": source })).collect();
    let mut response = json!({ "hits": { "hits": hits } });
    if params.contains_key("scroll") {
        response["_scroll_id"] = json!("fake-scroll-id");
    }

    // A minimal stand-in for a single `max` metric aggregation: every doc
    // whose query term matched is already in `docs`, so this just reduces
    // over whichever field the request asked for.
    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    if let Some(field) = request["aggs"]["latest"]["max"]["field"].as_str() {
        let max = docs
            .iter()
            .filter_map(|doc| doc.get(field))
            .filter_map(Value::as_f64)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
        response["aggregations"] = json!({ "latest": { "value": max } });
    }

    Json(response).into_response()
}

async fn scroll(State(state): State<Shared>) -> Response {
    record(&state, Method::POST, "/_search/scroll".to_string()).await;
    // A fake scroll always reports exhausted: no further hits.
    Json(json!({ "hits": { "hits": [] } })).into_response()
}

async fn alias_flip(State(state): State<Shared>, body: Bytes) -> Response {
    record(&state, Method::POST, "/_aliases".to_string()).await;
    let parsed: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let mut guard = state.0.lock().await;

    if let Some(actions) = parsed["actions"].as_array() {
        for action in actions {
            if let Some(remove) = action.get("remove") {
                let pattern = remove["index"].as_str().unwrap_or_default();
                let prefix = pattern.trim_end_matches('*');
                for (name, entry) in guard.indices.iter_mut() {
                    if name.starts_with(prefix) {
                        entry.has_alias = false;
                    }
                }
            }
            if let Some(add) = action.get("add") {
                let name = add["index"].as_str().unwrap_or_default();
                guard.indices.entry(name.to_string()).or_default().has_alias = true;
            }
        }
    }
    Json(json!({})).into_response()
}

async fn bulk(State(state): State<Shared>, body: Bytes) -> Response {
    record(&state, Method::POST, "/_bulk".to_string()).await;
    let text = String::from_utf8_lossy(&body);
    let mut lines = text.lines();
    let mut guard = state.0.lock().await;

    while let (Some(action_line), Some(source_line)) = (lines.next(), lines.next()) {
        let action: Value = serde_json::from_str(action_line).unwrap_or(Value::Null);
        let source: Value = serde_json::from_str(source_line).unwrap_or(Value::Null);
        let index_name = action["index"]["_index"]
            .as_str()
            .or_else(|| action["create"]["_index"].as_str())
            .unwrap_or_default();
        guard.indices.entry(index_name.to_string()).or_default().docs.push(source);
    }
    Json(json!({ "errors": false, "items": [] })).into_response()
}

/// A running fake upstream feed server: serves canned JSON pages by path,
/// recording every request it receives.
pub struct FakeFeed {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    server: JoinHandle<()>,
}

impl Drop for FakeFeed {
    fn drop(&mut self) {
        self.server.abort();
    }
}

#[derive(Clone)]
struct FeedShared {
    pages: Arc<HashMap<String, Value>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeFeed {
    /// `pages` maps a path (e.g. `"page1.json"`) to the JSON body served for
    /// `GET /page1.json`.
    pub async fn spawn(pages: HashMap<String, Value>) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let shared = FeedShared {
            pages: Arc::new(pages),
            requests: requests.clone(),
        };

        let app = Router::new()
            .route("/:page", get(serve_feed_page))
            .with_state(shared);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake feed");
        let addr = listener.local_addr().expect("local addr");
        let server = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.ok();
        });

        Self { addr, requests, server }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url_for(&self, page: &str) -> String {
        format!("{}/{page}", self.base_url())
    }

    pub async fn request_log(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }
}

async fn serve_feed_page(State(shared): State<FeedShared>, Path(page): Path<String>) -> Response {
    shared.requests.lock().await.push(page.clone());
    match shared.pages.get(&page) {
        Some(body) => Json(body.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// The set of indices in `backend` whose name contains `marker`.
pub async fn indices_matching(backend: &FakeSearchBackend, marker: &str) -> HashSet<String> {
    backend
        .state
        .0
        .lock()
        .await
        .indices
        .keys()
        .filter(|name| name.contains(marker))
        .cloned()
        .collect()
}
