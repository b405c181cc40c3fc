//! Errors escaping the ingestion pipeline. Per §7, none of these are
//! recovered locally — they all propagate to the enclosing supervisor.

use crate::coordination::kv::KvError;
use crate::search::gateway::SearchError;
use crate::signing::SigningError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("search backend error: {0}")]
    Search(#[from] SearchError),

    #[error("feed returned {status}: {body}")]
    Feed { status: u16, body: String },

    #[error("request signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("transport error fetching feed page: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("kv store error: {0}")]
    Kv(#[from] KvError),

    #[error("feed page was not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
