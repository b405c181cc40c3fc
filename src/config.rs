//! Environment-first hierarchical configuration.
//!
//! `A__B__C=v` environment variables are folded into a nested tree (see
//! [`env_tree`]) and then validated into a strongly-typed [`Config`]. A
//! `--config` TOML file, when given, is merged in as a flat key=value
//! overlay on top of the process environment before normalisation, mirroring
//! the file-then-environment precedence the teacher's `Config::load` uses.

pub mod env_tree;

use crate::feeds::config::FeedConfig;
use env_tree::{normalise, EnvNode};
use std::collections::HashMap;
use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration key: {0}")]
    MissingKey(String),

    #[error("invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("unknown feed type: {0}")]
    UnknownFeedType(String),

    #[error("no feeds configured")]
    NoFeeds,

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    pub host: String,
    pub port: String,
    pub protocol: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl ElasticsearchConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct IncomingKeyPair {
    pub key_id: String,
    pub secret_key: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IncomingConfig {
    pub access_key_pairs: Vec<IncomingKeyPair>,
    pub ip_whitelist: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SentryConfig {
    pub dsn: String,
    pub environment: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub elasticsearch: ElasticsearchConfig,
    pub feeds: Vec<FeedConfig>,
    pub incoming: IncomingConfig,
    pub sentry: Option<SentryConfig>,
    pub redis_uri: String,
}

impl Config {
    /// Build configuration from a pre-normalised environment tree (see
    /// [`env_tree::normalise`]). Kept separate from [`Config::load`] so tests
    /// can construct a `Config` from an in-memory map of env vars.
    pub fn from_tree(tree: &EnvNode) -> Result<Self, ConfigError> {
        let leaf = |path: &[&str]| -> Result<String, ConfigError> {
            let mut node = tree;
            for segment in path {
                node = node
                    .get(segment)
                    .ok_or_else(|| ConfigError::MissingKey(path.join("__").to_uppercase()))?;
            }
            node.as_leaf()
                .map(str::to_string)
                .ok_or_else(|| ConfigError::MissingKey(path.join("__").to_uppercase()))
        };

        let port = leaf(&["port"]).unwrap_or_else(|_| "8080".to_string());
        let listen_addr: SocketAddr = format!("0.0.0.0:{port}")
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("invalid PORT: {port}")))?;

        let elasticsearch = ElasticsearchConfig {
            host: leaf(&["elasticsearch", "host"])?,
            port: leaf(&["elasticsearch", "port"])?,
            protocol: leaf(&["elasticsearch", "protocol"])?,
            region: leaf(&["elasticsearch", "region"])?,
            access_key_id: leaf(&["elasticsearch", "aws_access_key_id"])?,
            secret_access_key: leaf(&["elasticsearch", "aws_secret_access_key"])?,
        };

        let feeds = match tree.get("feeds") {
            Some(feeds_node) => {
                let mut feeds = Vec::new();
                for key in feeds_node.numeric_child_keys() {
                    let group = feeds_node.get(&key).expect("key came from this node");
                    feeds.push(FeedConfig::from_tree(&key, group)?);
                }
                feeds
            }
            None => Vec::new(),
        };
        if feeds.is_empty() {
            return Err(ConfigError::NoFeeds);
        }

        let incoming = parse_incoming(tree)?;

        let sentry = match (
            tree.get("sentry_dsn").and_then(EnvNode::as_leaf),
            tree.get("sentry_environment").and_then(EnvNode::as_leaf),
        ) {
            (Some(dsn), Some(environment)) if !dsn.is_empty() => Some(SentryConfig {
                dsn: dsn.to_string(),
                environment: environment.to_string(),
            }),
            _ => None,
        };

        let redis_uri = resolve_redis_uri(tree)?;

        Ok(Config {
            listen_addr,
            elasticsearch,
            feeds,
            incoming,
            sentry,
            redis_uri,
        })
    }

    /// Load from the process environment, with an optional TOML file overlay.
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut vars: HashMap<String, String> = std::env::vars().collect();

        if let Some(path) = config_file {
            let contents =
                std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_string(),
                    source,
                })?;
            let overlay: HashMap<String, String> =
                toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_string(),
                    source,
                })?;
            vars.extend(overlay);
        }

        let tree = normalise(vars);
        Self::from_tree(&tree)
    }
}

fn parse_incoming(tree: &EnvNode) -> Result<IncomingConfig, ConfigError> {
    let mut access_key_pairs = Vec::new();
    if let Some(pairs_node) = tree.get("incoming_access_key_pairs") {
        for key in pairs_node.numeric_child_keys() {
            let group = pairs_node.get(&key).expect("key came from this node");
            let key_id = group
                .get("key_id")
                .and_then(EnvNode::as_leaf)
                .map(str::to_string)
                .ok_or_else(|| {
                    ConfigError::MissingKey(format!("INCOMING_ACCESS_KEY_PAIRS__{key}__KEY_ID"))
                })?;
            let secret_key = group
                .get("secret_key")
                .and_then(EnvNode::as_leaf)
                .map(str::to_string)
                .ok_or_else(|| {
                    ConfigError::MissingKey(format!(
                        "INCOMING_ACCESS_KEY_PAIRS__{key}__SECRET_KEY"
                    ))
                })?;
            let permissions = group
                .get("permissions")
                .map(|node| {
                    node.numeric_child_keys()
                        .into_iter()
                        .filter_map(|k| node.get(&k).and_then(EnvNode::as_leaf))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            access_key_pairs.push(IncomingKeyPair {
                key_id,
                secret_key,
                permissions,
            });
        }
    }

    let ip_whitelist = tree
        .get("incoming_ip_whitelist")
        .map(|node| {
            node.numeric_child_keys()
                .into_iter()
                .filter_map(|k| node.get(&k).and_then(EnvNode::as_leaf))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(IncomingConfig {
        access_key_pairs,
        ip_whitelist,
    })
}

/// Resolve the shared KV store URI. Per spec, this normally arrives nested
/// inside Cloud Foundry's `VCAP_SERVICES` JSON blob; a flat `REDIS_URI` is
/// also accepted (used by tests and non-CF deployments).
fn resolve_redis_uri(tree: &EnvNode) -> Result<String, ConfigError> {
    if let Some(uri) = tree.get("redis_uri").and_then(EnvNode::as_leaf) {
        return Ok(uri.to_string());
    }

    let raw = tree
        .get("vcap_services")
        .and_then(EnvNode::as_leaf)
        .ok_or_else(|| ConfigError::MissingKey("VCAP_SERVICES".to_string()))?;

    let parsed: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| ConfigError::InvalidValue(format!("VCAP_SERVICES is not valid JSON: {e}")))?;

    parsed["redis"][0]["credentials"]["uri"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            ConfigError::InvalidValue(
                "VCAP_SERVICES.redis[0].credentials.uri not present".to_string(),
            )
        })
}
