//! Hawk request signing and verification (https://github.com/hueniverse/hawk).
//!
//! Used in two directions: we *sign* outgoing GETs to feed endpoints (§4.1,
//! SHA-256, empty body, empty content-type), and we *verify* incoming
//! requests to the read facade and the incoming endpoint (§4.9) against a
//! per-key-id credential table.
//!
//! `seen_nonce` is intentionally always `false` here (see spec Open
//! Questions) — this accepts the first valid signature within the timestamp
//! skew window and does not persist nonces against replay. A production
//! replay guard is the read facade's own concern.

use super::SigningError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Allowed clock skew between the signer's timestamp and our wall clock.
pub const TIMESTAMP_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct HawkCredentials {
    pub id: String,
    pub key: String,
}

struct UrlParts {
    path_and_query: String,
    host: String,
    port: u16,
}

fn split_url(url: &str) -> Result<UrlParts, SigningError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| SigningError::InvalidHeaderValue(format!("invalid url {url}: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| SigningError::InvalidHeaderValue(format!("url has no host: {url}")))?
        .to_string();
    let port = parsed
        .port_or_known_default()
        .ok_or_else(|| SigningError::InvalidHeaderValue(format!("url has no port: {url}")))?;
    let mut path_and_query = parsed.path().to_string();
    if let Some(q) = parsed.query() {
        path_and_query.push('?');
        path_and_query.push_str(q);
    }
    Ok(UrlParts {
        path_and_query,
        host,
        port,
    })
}

fn payload_hash(content_type: &str, content: &[u8]) -> String {
    let normalized = format!(
        "hawk.1.payload\n{}\n{}\n",
        content_type,
        String::from_utf8_lossy(content)
    );
    BASE64.encode(Sha256::digest(normalized.as_bytes()))
}

#[allow(clippy::too_many_arguments)]
fn mac_normalized_string(
    kind: &str,
    ts: &str,
    nonce: &str,
    method: &str,
    path_and_query: &str,
    host: &str,
    port: u16,
    hash: &str,
    ext: &str,
) -> String {
    format!(
        "hawk.1.{kind}\n{ts}\n{nonce}\n{method}\n{path_and_query}\n{host}\n{port}\n{hash}\n{ext}\n",
    )
}

fn compute_mac(key: &str, normalized: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(normalized.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

fn random_nonce() -> String {
    let mut bytes = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Produce an `Authorization: Hawk ...` header value for an outgoing
/// request. `ext` is an opaque application extension string, empty unless
/// the caller has one.
pub fn sign(
    credentials: &HawkCredentials,
    method: &str,
    url: &str,
    content: &[u8],
    content_type: &str,
) -> Result<String, SigningError> {
    let parts = split_url(url)?;
    let ts = now_unix().to_string();
    let nonce = random_nonce();
    let hash = payload_hash(content_type, content);
    let ext = "";

    let normalized = mac_normalized_string(
        "header",
        &ts,
        &nonce,
        method,
        &parts.path_and_query,
        &parts.host,
        parts.port,
        &hash,
        ext,
    );
    let mac = compute_mac(&credentials.key, &normalized);

    Ok(format!(
        r#"Hawk id="{}", ts="{}", nonce="{}", hash="{}", ext="{}", mac="{}""#,
        credentials.id, ts, nonce, hash, ext, mac
    ))
}

fn parse_header(header: &str) -> Result<HashMap<String, String>, SigningError> {
    let rest = header
        .trim()
        .strip_prefix("Hawk ")
        .ok_or_else(|| SigningError::InvalidHeaderValue("not a Hawk header".to_string()))?;

    let mut fields = HashMap::new();
    for part in rest.split(',') {
        let part = part.trim();
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        fields.insert(key.to_string(), value.to_string());
    }
    Ok(fields)
}

#[derive(Debug, thiserror::Error)]
pub enum HawkVerifyError {
    #[error("malformed Authorization header")]
    Malformed,
    #[error("unknown credential id")]
    UnknownId,
    #[error("timestamp outside allowed skew")]
    StaleTimestamp,
    #[error("mac does not match")]
    BadMac,
}

/// Verify an incoming Hawk `Authorization` header against a credential
/// lookup function. `lookup` returns `None` for an unrecognised id.
pub fn verify(
    header: &str,
    method: &str,
    url: &str,
    content: &[u8],
    content_type: &str,
    lookup: impl Fn(&str) -> Option<HawkCredentials>,
) -> Result<HawkCredentials, HawkVerifyError> {
    let fields = parse_header(header).map_err(|_| HawkVerifyError::Malformed)?;
    let id = fields.get("id").ok_or(HawkVerifyError::Malformed)?;
    let ts = fields.get("ts").ok_or(HawkVerifyError::Malformed)?;
    let nonce = fields.get("nonce").ok_or(HawkVerifyError::Malformed)?;
    let mac = fields.get("mac").ok_or(HawkVerifyError::Malformed)?;
    let ext = fields.get("ext").cloned().unwrap_or_default();

    let credentials = lookup(id).ok_or(HawkVerifyError::UnknownId)?;

    let ts_value: i64 = ts.parse().map_err(|_| HawkVerifyError::Malformed)?;
    if (now_unix() - ts_value).abs() > TIMESTAMP_SKEW_SECS {
        return Err(HawkVerifyError::StaleTimestamp);
    }

    let parts = split_url(url).map_err(|_| HawkVerifyError::Malformed)?;
    let hash = payload_hash(content_type, content);

    let normalized = mac_normalized_string(
        "header",
        ts,
        nonce,
        method,
        &parts.path_and_query,
        &parts.host,
        parts.port,
        &hash,
        &ext,
    );
    let expected_mac = compute_mac(&credentials.key, &normalized);

    if expected_mac != *mac {
        return Err(HawkVerifyError::BadMac);
    }

    Ok(credentials)
}

/// `seen_nonce` callback, hard-coded to `false` per the upstream source and
/// the spec's own framing of replay protection as out of scope here.
pub fn seen_nonce(_id: &str, _nonce: &str, _ts: i64) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> HawkCredentials {
        HawkCredentials {
            id: "feed-some-id".to_string(),
            key: "feed-some-secret".to_string(),
        }
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let header = sign(&creds(), "GET", "http://feed.example/1", b"", "").unwrap();
        let verified = verify(&header, "GET", "http://feed.example/1", b"", "", |id| {
            if id == "feed-some-id" {
                Some(creds())
            } else {
                None
            }
        })
        .unwrap();
        assert_eq!(verified.id, "feed-some-id");
    }

    #[test]
    fn tampered_method_fails_verification() {
        let header = sign(&creds(), "GET", "http://feed.example/1", b"", "").unwrap();
        let result = verify(&header, "POST", "http://feed.example/1", b"", "", |_| Some(creds()));
        assert!(matches!(result, Err(HawkVerifyError::BadMac)));
    }

    #[test]
    fn unknown_id_is_rejected() {
        let header = sign(&creds(), "GET", "http://feed.example/1", b"", "").unwrap();
        let result = verify(&header, "GET", "http://feed.example/1", b"", "", |_| None);
        assert!(matches!(result, Err(HawkVerifyError::UnknownId)));
    }

    #[test]
    fn seen_nonce_always_false() {
        assert!(!seen_nonce("any-id", "any-nonce", 0));
    }
}
