//! Beacon Configuration
//!
//! TOML-based configuration loading with sensible defaults. A minimal
//! config only needs the bus and state-store addresses:
//!
//! ```toml
//! [bus]
//! url = "nats://127.0.0.1:4222"
//!
//! [state_store]
//! url = "http://127.0.0.1:8889"
//! ```
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use beacon_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[bus]\nurl = \"nats://127.0.0.1:4222\"").unwrap();
//! assert_eq!(config.emitter.sync_interval_secs, 60);
//! ```

mod error;

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

pub use error::{ConfigError, Result};

/// Main configuration structure
///
/// All sections are optional with sensible defaults except the addresses
/// of the bus and the state store, which `validate` insists on.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Emitter cadence and modes
    pub emitter: EmitterConfig,

    /// Message bus connection
    pub bus: BusConfig,

    /// Cluster state store connection
    pub state_store: StateStoreConfig,

    /// Optional TCP routing API; absent means no TCP emission
    pub routing_api: Option<RoutingApiConfig>,

    /// Logging
    pub logging: LogConfig,

    /// Metrics reporting
    pub metrics: MetricsConfig,
}

/// Emitter cadence and operating modes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    /// How often full reconciliation runs, in seconds
    pub sync_interval_secs: u64,

    /// Also perform the service-discovery handshake and emit internal
    /// sync/emit events
    pub wait_for_internal_routes_greeting: bool,

    /// Publish per-sync HTTP/TCP route-count gauges
    pub local_mode: bool,

    /// TTL stamped on TCP route mappings, in seconds
    pub tcp_route_ttl_secs: u64,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: 60,
            wait_for_internal_routes_greeting: false,
            local_mode: false,
            tcp_route_ttl_secs: 120,
        }
    }
}

impl EmitterConfig {
    /// The sync interval as a duration
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// The TCP mapping TTL as a duration
    pub fn tcp_route_ttl(&self) -> Duration {
        Duration::from_secs(self.tcp_route_ttl_secs)
    }
}

/// Message bus connection
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Bus address, `nats://host:port`
    pub url: String,
}

impl BusConfig {
    /// The address without the scheme prefix
    pub fn addr(&self) -> &str {
        self.url
            .strip_prefix("nats://")
            .unwrap_or(self.url.as_str())
    }
}

/// Cluster state store connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateStoreConfig {
    /// Base URL of the state store API
    pub url: String,

    /// Per-request timeout, in seconds
    pub request_timeout_secs: u64,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            request_timeout_secs: 30,
        }
    }
}

impl StateStoreConfig {
    /// The request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// TCP routing API connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingApiConfig {
    /// Base URL of the routing API
    pub url: String,

    /// Per-request timeout, in seconds
    pub request_timeout_secs: u64,
}

impl Default for RoutingApiConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            request_timeout_secs: 10,
        }
    }
}

impl RoutingApiConfig {
    /// The request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,

    /// Reporting interval, in seconds
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
        }
    }
}

impl MetricsConfig {
    /// The reporting interval as a duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        contents.parse()
    }

    /// Check invariants that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        if self.bus.url.is_empty() {
            return Err(ConfigError::missing("bus.url"));
        }
        if self.state_store.url.is_empty() {
            return Err(ConfigError::missing("state_store.url"));
        }
        if self.emitter.sync_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "emitter.sync_interval_secs",
                "must be at least 1",
            ));
        }
        if self.emitter.tcp_route_ttl_secs == 0 {
            return Err(ConfigError::invalid(
                "emitter.tcp_route_ttl_secs",
                "must be at least 1",
            ));
        }
        if let Some(routing_api) = &self.routing_api {
            if routing_api.url.is_empty() {
                return Err(ConfigError::missing("routing_api.url"));
            }
        }
        if self.metrics.enabled && self.metrics.interval_secs == 0 {
            return Err(ConfigError::invalid(
                "metrics.interval_secs",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(ConfigError::Parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = Config::from_str(
            r#"
            [bus]
            url = "nats://127.0.0.1:4222"

            [state_store]
            url = "http://127.0.0.1:8889"
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.emitter.sync_interval(), Duration::from_secs(60));
        assert_eq!(config.emitter.tcp_route_ttl(), Duration::from_secs(120));
        assert!(!config.emitter.local_mode);
        assert!(!config.emitter.wait_for_internal_routes_greeting);
        assert!(config.routing_api.is_none());
        assert!(config.metrics.enabled);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.bus.addr(), "127.0.0.1:4222");
    }

    #[test]
    fn full_config_round_trips() {
        let config = Config::from_str(
            r#"
            [emitter]
            sync_interval_secs = 30
            wait_for_internal_routes_greeting = true
            local_mode = true
            tcp_route_ttl_secs = 90

            [bus]
            url = "nats://nats.cluster.internal:4222"

            [state_store]
            url = "http://bbs.cluster.internal:8889"
            request_timeout_secs = 10

            [routing_api]
            url = "http://routing-api.cluster.internal:3000"
            request_timeout_secs = 5

            [logging]
            level = "debug"

            [metrics]
            enabled = true
            interval_secs = 15
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.emitter.sync_interval_secs, 30);
        assert!(config.emitter.wait_for_internal_routes_greeting);
        assert!(config.emitter.local_mode);
        assert_eq!(
            config.routing_api.as_ref().unwrap().request_timeout(),
            Duration::from_secs(5)
        );
        assert_eq!(config.metrics.interval(), Duration::from_secs(15));
    }

    #[test]
    fn validation_requires_addresses() {
        let config = Config::from_str("[bus]\nurl = \"nats://x:4222\"").unwrap();
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("state_store.url"));

        let config = Config::default();
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("bus.url"));
    }

    #[test]
    fn validation_rejects_zero_intervals() {
        let config = Config::from_str(
            r#"
            [emitter]
            sync_interval_secs = 0

            [bus]
            url = "nats://x:4222"

            [state_store]
            url = "http://y:8889"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(Config::from_str("invalid { toml").is_err());
    }

    #[test]
    fn loads_from_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[bus]\nurl = \"nats://127.0.0.1:4222\"\n[state_store]\nurl = \"http://h:1\""
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn load_of_a_missing_file_is_an_error() {
        let error = Config::load("/definitely/not/here.toml").unwrap_err();
        assert!(error.to_string().contains("not/here.toml"));
    }
}
