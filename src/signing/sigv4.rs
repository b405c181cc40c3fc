//! AWS SigV4 request signing for the search backend.
//!
//! The backend only ever receives `content-type`, `host` and `x-amz-date`
//! as signed headers — the same three the upstream Elasticsearch client
//! signs over (`aws_auth_headers` in the Python original). This mirrors the
//! canonicalization steps the read facade already verifies incoming
//! requests with, run in the opposite direction: we are the signer here,
//! not the verifier.

use super::SigningError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

#[derive(Debug, Clone)]
pub struct SigV4Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub service: String,
}

/// Headers to attach to the outgoing request, in the order they should be
/// sent (not that order matters over the wire, but it keeps request
/// construction and tests deterministic).
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub host: String,
    pub x_amz_date: String,
    pub authorization: String,
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/')
        .map(|segment| uri_encode(segment, true))
        .collect::<Vec<_>>()
        .join("/")
}

/// Sorted, percent-encoded `k=v&k=v` query string per SigV4 canonicalization.
fn canonical_query_string(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }
    let mut pairs: Vec<(String, String)> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", uri_encode(&k, true), uri_encode(&v, true)))
        .collect::<Vec<_>>()
        .join("&")
}

fn derive_signing_key(secret_access_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret_access_key}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Sign one request, returning the three headers the caller must attach:
/// `host`, `x-amz-date` and `authorization`.
///
/// `path` and `query` come from the target URL (query without the leading
/// `?`); `body` is the exact bytes that will be sent, since the payload
/// hash is part of the signed canonical request.
pub fn sign(
    credentials: &SigV4Credentials,
    method: &str,
    host: &str,
    path: &str,
    query: &str,
    content_type: &str,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<SignedHeaders, SigningError> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();

    let mut canonical_headers: BTreeMap<&str, String> = BTreeMap::new();
    canonical_headers.insert("content-type", content_type.to_string());
    canonical_headers.insert("host", host.to_string());
    canonical_headers.insert("x-amz-date", amz_date.clone());

    let canonical_headers_str: String = canonical_headers
        .iter()
        .map(|(k, v)| format!("{k}:{}\n", v.trim()))
        .collect();
    let signed_headers = "content-type;host;x-amz-date";

    let canonical_request = format!(
        "{method}\n{}\n{}\n{canonical_headers_str}\n{signed_headers}\n{}",
        canonical_uri(path),
        canonical_query_string(query),
        sha256_hex(body),
    );

    let credential_scope = format!(
        "{date_stamp}/{}/{}/aws4_request",
        credentials.region, credentials.service
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{credential_scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(
        &credentials.secret_access_key,
        &date_stamp,
        &credentials.region,
        &credentials.service,
    );
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    let authorization = format!(
        "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
        credentials.access_key_id
    );

    Ok(SignedHeaders {
        host: host.to_string(),
        x_amz_date: amz_date,
        authorization,
    })
}
