//! Outbound request signing: Hawk (feed GETs) and AWS SigV4 (search backend).

pub mod hawk;
pub mod sigv4;

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("invalid header value produced during signing: {0}")]
    InvalidHeaderValue(String),
}
