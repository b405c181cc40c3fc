//! Per-feed descriptor, parsed from one `FEEDS__<n>__...` environment group.

use crate::config::env_tree::EnvNode;
use crate::config::ConfigError;
use std::time::Duration;

/// Default exception backoff schedule when a feed doesn't override it.
/// Matches the outer application supervisor schedule so a feed that never
/// configures its own intervals backs off the same way the rest of the
/// system does.
pub const DEFAULT_EXCEPTION_BACKOFF_SCHEDULE: &[u64] = &[1, 2, 4, 8, 16, 32, 64];

const DEFAULT_POLLING_PAGE_INTERVAL_SECS: u64 = 1;
const DEFAULT_POLLING_SEED_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedType {
    ActivityStream,
    Zendesk,
}

impl FeedType {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "activity_stream" => Ok(FeedType::ActivityStream),
            "zendesk" => Ok(FeedType::Zendesk),
            other => Err(ConfigError::UnknownFeedType(other.to_string())),
        }
    }
}

/// Immutable per-feed configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub unique_id: String,
    pub feed_type: FeedType,
    pub seed_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub polling_page_interval: Duration,
    pub polling_seed_interval: Duration,
    pub exception_backoff_schedule: Vec<u64>,
}

impl FeedConfig {
    /// Parse one `FEEDS__<n>__...` branch. `unique_id` defaults to `<n>`
    /// itself if `UNIQUE_ID` is not given, since the numeral is already a
    /// stable per-feed identifier in the environment.
    pub fn from_tree(group_key: &str, node: &EnvNode) -> Result<Self, ConfigError> {
        let leaf = |name: &str| -> Result<String, ConfigError> {
            node.get(name)
                .and_then(EnvNode::as_leaf)
                .map(str::to_string)
                .ok_or_else(|| ConfigError::MissingKey(format!("FEEDS__{group_key}__{name}")))
        };

        let unique_id = node
            .get("unique_id")
            .and_then(EnvNode::as_leaf)
            .map(str::to_string)
            .unwrap_or_else(|| group_key.to_string());

        let feed_type = FeedType::parse(&leaf("type")?)?;
        let seed_url = leaf("seed")?;
        let access_key_id = leaf("access_key_id")?;
        let secret_access_key = leaf("secret_access_key")?;

        let polling_page_interval = node
            .get("polling_page_interval_seconds")
            .and_then(EnvNode::as_leaf)
            .map(parse_secs)
            .transpose()?
            .unwrap_or(DEFAULT_POLLING_PAGE_INTERVAL_SECS);

        let polling_seed_interval = node
            .get("polling_seed_interval_seconds")
            .and_then(EnvNode::as_leaf)
            .map(parse_secs)
            .transpose()?
            .unwrap_or(DEFAULT_POLLING_SEED_INTERVAL_SECS);

        let exception_backoff_schedule = match node
            .get("exception_backoff_schedule")
            .and_then(EnvNode::as_leaf)
        {
            Some(raw) => parse_schedule(raw)?,
            None => DEFAULT_EXCEPTION_BACKOFF_SCHEDULE.to_vec(),
        };

        Ok(FeedConfig {
            unique_id,
            feed_type,
            seed_url,
            access_key_id,
            secret_access_key,
            polling_page_interval: Duration::from_secs(polling_page_interval),
            polling_seed_interval: Duration::from_secs(polling_seed_interval),
            exception_backoff_schedule,
        })
    }
}

fn parse_secs(raw: &str) -> Result<u64, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::InvalidValue(format!("not an integer: {raw}")))
}

fn parse_schedule(raw: &str) -> Result<Vec<u64>, ConfigError> {
    let schedule: Result<Vec<u64>, _> = raw.split(',').map(|s| s.trim().parse::<u64>()).collect();
    let schedule = schedule.map_err(|_| {
        ConfigError::InvalidValue(format!("exception_backoff_schedule not all integers: {raw}"))
    })?;
    if schedule.is_empty() {
        return Err(ConfigError::InvalidValue(
            "exception_backoff_schedule must not be empty".to_string(),
        ));
    }
    Ok(schedule)
}
