//! Shared outbound HTTP client.
//!
//! One `reqwest::Client` is built at startup and cloned into every feed
//! worker and the search gateway — `reqwest::Client` is internally an
//! `Arc` over a connection pool, so cloning is cheap and keeps us to one
//! pool per process. Each response body is fully read into memory before
//! we return from a call: feed pages and search responses are bounded by
//! the backend's own page/result-size limits, so nothing here streams.

use reqwest::{Method, StatusCode};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the client used for every outbound request. No automatic retry and
/// no idle-connection keep-alive across requests to the same feed host: a
/// feed that goes away should fail the next poll rather than hand back a
/// response from a connection it no longer owns.
pub fn build_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .pool_max_idle_per_host(0)
        .build()
}

/// The one primitive every outbound caller goes through. `headers` is an
/// ordered list so callers (signers) control exact casing and duplication.
/// The body is read fully before this returns, even on non-2xx.
pub async fn request(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    headers: &[(&str, String)],
    body: Vec<u8>,
) -> reqwest::Result<(StatusCode, Vec<u8>)> {
    let mut builder = client.request(method, url).body(body);
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    let response = builder.send().await?;
    let status = response.status();
    let bytes = response.bytes().await?.to_vec();
    Ok((status, bytes))
}
