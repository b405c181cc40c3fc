//! External interface only (§4.9): the read façade, the incoming endpoint,
//! and the metrics page. Everything upstream of this module is internal.

pub mod auth;
pub mod handlers;
pub mod ip_allowlist;

use crate::config::IncomingConfig;
use crate::coordination::KvStore;
use crate::metrics::Metrics;
use crate::search::gateway::SearchGateway;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct ApiState {
    pub incoming: Arc<IncomingConfig>,
    pub kv: Arc<dyn KvStore>,
    pub gateway: Arc<SearchGateway>,
    pub metrics: Arc<Metrics>,
}

/// Scroll context TTL: must be >= the backend scroll timeout we request
/// (`1m`, see [`handlers::SCROLL_TTL`]) so a public token never outlives the
/// private cursor it maps to.
pub const SCROLL_MAPPING_TTL: std::time::Duration = std::time::Duration::from_secs(120);

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/objects", get(handlers::list_objects))
        .route("/v1/objects/:public_scroll_id", get(handlers::scroll_objects))
        .route("/", post(handlers::incoming))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn_with_state(state.clone(), auth::hawk_auth_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), ip_allowlist::ip_allowlist_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
