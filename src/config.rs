//! Configuration management for floodgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{FloodgateError, Result};
use crate::ratelimit::RouteRule;

/// Main configuration for floodgate.
///
/// The rate-limiting surface (`enabled`, `headers`, `status_message`,
/// `routes`) mirrors what the gate consumes per request; `store` and
/// `listen_addr` only matter to the binary. All process-wide state is read
/// once at startup and passed in as an immutable object, never mutated
/// afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Global kill switch. When false the gate passes every request through.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Emit `x-ratelimit-*` observability headers on every gated response.
    #[serde(default = "default_headers")]
    pub headers: bool,

    /// Body of the 429 rejection. The `:value:` placeholder is replaced with
    /// the seconds remaining until the window resets.
    #[serde(default = "default_status_message")]
    pub status_message: String,

    /// Store failure policy: admit requests when the store is unreachable
    /// (true) or reject them with a server error (false).
    #[serde(default = "default_fail_open")]
    pub fail_open: bool,

    /// Minimum TTL (seconds) applied to store writes. Some managed stores
    /// refuse short expirations; the clamp affects storage lifetime only,
    /// never the reset arithmetic returned to clients. 0 disables the floor.
    #[serde(default)]
    pub minimum_ttl_seconds: u64,

    /// Route patterns and their quotas, matched in declaration order.
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteRule>,

    /// Key-value store backend selection.
    #[serde(default)]
    pub store: StoreConfig,

    /// Address the server binary binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for FloodgateConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            headers: default_headers(),
            status_message: default_status_message(),
            fail_open: default_fail_open(),
            minimum_ttl_seconds: 0,
            routes: default_routes(),
            store: StoreConfig::default(),
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_headers() -> bool {
    true
}

fn default_status_message() -> String {
    "Too many requests. Please try again in :value: seconds.".to_string()
}

fn default_fail_open() -> bool {
    true
}

fn default_routes() -> Vec<RouteRule> {
    vec![RouteRule {
        pattern: "/api/**".to_string(),
        max_requests: 100,
        interval_seconds: 60,
    }]
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

/// Key-value store backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Which backend to use
    #[serde(default)]
    pub backend: StoreBackend,

    /// Connection URL, required for the redis backend
    #[serde(default)]
    pub url: Option<String>,
}

/// Supported key-value store backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store, per-instance counters only
    #[default]
    Memory,
    /// Redis-backed store, shared across instances
    Redis,
}

impl FloodgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FloodgateConfig =
            serde_yaml::from_str(yaml).map_err(|e| FloodgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate quotas and backend selection.
    ///
    /// Violations are fatal at startup; nothing here can surface mid-request.
    pub fn validate(&self) -> Result<()> {
        for rule in &self.routes {
            if rule.pattern.is_empty() {
                return Err(FloodgateError::Config(
                    "route pattern must not be empty".to_string(),
                ));
            }
            if rule.max_requests == 0 {
                return Err(FloodgateError::Config(format!(
                    "route {}: max_requests must be at least 1",
                    rule.pattern
                )));
            }
            if rule.interval_seconds == 0 {
                return Err(FloodgateError::Config(format!(
                    "route {}: interval_seconds must be at least 1",
                    rule.pattern
                )));
            }
        }

        if self.store.backend == StoreBackend::Redis && self.store.url.is_none() {
            return Err(FloodgateError::Config(
                "store.url is required for the redis backend".to_string(),
            ));
        }

        Ok(())
    }
}
