//! `INCOMING_IP_WHITELIST` enforcement. An empty whitelist allows any
//! source — the whitelist is opt-in hardening, not the primary auth layer
//! (Hawk is). The client address is read from `X-Forwarded-For` (this
//! service sits behind a load balancer in practice), falling back to the
//! socket's peer address when the header is absent.

use super::ApiState;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;

fn client_ip(request: &Request<axum::body::Body>, connect_info: Option<&ConnectInfo<SocketAddr>>) -> Option<String> {
    if let Some(forwarded) = request.headers().get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    connect_info.map(|ConnectInfo(addr)| addr.ip().to_string())
}

pub async fn ip_allowlist_middleware(
    State(state): State<ApiState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if state.incoming.ip_whitelist.is_empty() {
        return next.run(request).await;
    }

    let Some(addr) = client_ip(&request, connect_info.as_ref()) else {
        return next.run(request).await;
    };

    let allowed = state.incoming.ip_whitelist.iter().any(|ip| ip == &addr);

    if allowed {
        next.run(request).await
    } else {
        (axum::http::StatusCode::FORBIDDEN, "source address not allow-listed").into_response()
    }
}
