//! Updates loop against an already-live index created out of band (as if a
//! prior full ingest had completed).

mod common;

use activity_stream::config::ElasticsearchConfig;
use activity_stream::coordination::kv::InMemoryKvStore;
use activity_stream::coordination::KvStore;
use activity_stream::feeds::config::{FeedConfig, FeedType};
use activity_stream::ingest::{updates, FeedContext};
use activity_stream::metrics::Metrics;
use activity_stream::search::gateway::SearchGateway;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

#[tokio::test]
async fn updates_loop_walks_pages_and_bulks_into_the_live_index() {
    let search_backend = common::FakeSearchBackend::spawn().await;
    let (host, port) = search_backend.host_port();

    let es_config = ElasticsearchConfig {
        host,
        port,
        protocol: "http".to_string(),
        region: "us-east-1".to_string(),
        access_key_id: "es-id".to_string(),
        secret_access_key: "es-secret".to_string(),
    };
    let client = activity_stream::http_client::build_client().unwrap();
    let gateway = SearchGateway::new(client.clone(), es_config);

    let index_name = "activities__feed_id_F1__date_2026-07-30__timestamp_1__batch_id_aaaaaaaaaa__";
    gateway.create_index(index_name).await.unwrap();
    gateway.alias_flip(index_name, "activities__feed_id_NOBODY__*").await.unwrap();
    assert!(search_backend.index_has_alias(index_name).await);

    let mut pages = HashMap::new();
    pages.insert(
        "updates_page1.json".to_string(),
        json!({ "orderedItems": [{ "id": "new-item" }], "next_url": null }),
    );
    let feed = common::FakeFeed::spawn(pages).await;

    let config = FeedConfig {
        unique_id: "F1".to_string(),
        feed_type: FeedType::ActivityStream,
        seed_url: "unused".to_string(),
        access_key_id: "feed-id".to_string(),
        secret_access_key: "feed-secret".to_string(),
        polling_page_interval: Duration::from_millis(1),
        polling_seed_interval: Duration::from_millis(1),
        exception_backoff_schedule: vec![1],
    };
    let ctx = FeedContext::new(config);

    let kv = InMemoryKvStore::new();
    kv.set("feed_updates_seed_url:F1", &feed.url_for("updates_page1.json")).await.unwrap();

    let metrics = Metrics::new();

    updates::run_once(&ctx, &gateway, &kv, &client, &metrics).await.unwrap();

    let docs = search_backend.docs_in(index_name).await;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["id"], "new-item");

    let recorded_url = kv.get("feed_updates_url:F1").await.unwrap();
    assert_eq!(recorded_url.as_deref(), Some(feed.url_for("updates_page1.json").as_str()));

    assert!(search_backend.request_count(axum::http::Method::POST, &format!("/{index_name}/_refresh")).await >= 1);
}

#[tokio::test]
async fn updates_loop_waits_for_a_cursor_before_the_first_fetch() {
    let search_backend = common::FakeSearchBackend::spawn().await;
    let (host, port) = search_backend.host_port();
    let es_config = ElasticsearchConfig {
        host,
        port,
        protocol: "http".to_string(),
        region: "us-east-1".to_string(),
        access_key_id: "es-id".to_string(),
        secret_access_key: "es-secret".to_string(),
    };
    let client = activity_stream::http_client::build_client().unwrap();
    let gateway = SearchGateway::new(client.clone(), es_config);

    let config = FeedConfig {
        unique_id: "F2".to_string(),
        feed_type: FeedType::ActivityStream,
        seed_url: "unused".to_string(),
        access_key_id: "feed-id".to_string(),
        secret_access_key: "feed-secret".to_string(),
        polling_page_interval: Duration::from_millis(1),
        polling_seed_interval: Duration::from_millis(1),
        exception_backoff_schedule: vec![1],
    };
    let ctx = FeedContext::new(config);
    let kv = InMemoryKvStore::new();
    let metrics = Metrics::new();

    // No cursor is ever written. `run_once` must not return an error: it
    // should be cancellable by its caller (the supervisor) rather than
    // busy-erroring, so bound the wait with a timeout from the test side.
    let result = tokio::time::timeout(
        Duration::from_millis(200),
        updates::run_once(&ctx, &gateway, &kv, &client, &metrics),
    )
    .await;
    assert!(result.is_err(), "run_once should still be waiting for a cursor when the timeout fires");
}
