//! Hawk verification for every request to the read façade and the incoming
//! endpoint (§4.9, §6 external interfaces). Exact rejection copy matches the
//! spec's required response bodies.

use super::ApiState;
use crate::signing::hawk::{self, HawkCredentials};
use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

fn unauthorized(message: &'static str) -> Response {
    (StatusCode::UNAUTHORIZED, message).into_response()
}

pub async fn hawk_auth_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    let Some(authorization) = parts.headers.get("authorization").and_then(|v| v.to_str().ok()) else {
        return unauthorized("Authentication credentials were not provided.");
    };

    // Content-Type must be *present*, even as an empty string; its absence
    // (not its value) is what's being checked here.
    let Some(content_type_header) = parts.headers.get("content-type") else {
        return unauthorized("Content-Type header was not set. It must be set for authentication, even if as the empty string.");
    };
    let content_type = content_type_header.to_str().unwrap_or_default().to_string();

    let Some(host) = parts.headers.get("host").and_then(|v| v.to_str().ok()) else {
        return unauthorized("Incorrect authentication credentials.");
    };

    let body_bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return unauthorized("Incorrect authentication credentials."),
    };

    let mut full_url = format!("http://{host}{}", parts.uri.path());
    if let Some(query) = parts.uri.query() {
        full_url.push('?');
        full_url.push_str(query);
    }

    let incoming = state.incoming.clone();
    let verified = hawk::verify(
        authorization,
        parts.method.as_str(),
        &full_url,
        &body_bytes,
        &content_type,
        |id| {
            incoming
                .access_key_pairs
                .iter()
                .find(|pair| pair.key_id == id)
                .map(|pair| HawkCredentials {
                    id: pair.key_id.clone(),
                    key: pair.secret_key.clone(),
                })
        },
    );

    let credentials = match verified {
        Ok(c) => c,
        Err(_) => return unauthorized("Incorrect authentication credentials."),
    };

    let permitted = state
        .incoming
        .access_key_pairs
        .iter()
        .find(|pair| pair.key_id == credentials.id)
        .map(|pair| pair.permissions.iter().any(|p| p == parts.method.as_str()))
        .unwrap_or(false);

    if !permitted {
        return unauthorized("Incorrect authentication credentials.");
    }

    let request = Request::from_parts(parts, Body::from(body_bytes));
    next.run(request).await
}
