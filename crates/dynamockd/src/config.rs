//! Daemon configuration from the environment.
//!
//! | Variable                | Default                  |
//! |-------------------------|--------------------------|
//! | `DYNA_MOCK_API_FOLDER`  | `/var/dynamocker/mocks/` |
//! | `DYNA_POLLING_INTERVAL` | `60` (seconds)           |
//! | `DYNA_LOG_LEVEL`        | `info`                   |
//! | `DYNA_REQUIRE_WATCH`    | `false`                  |
//! | `DYNA_UNIQUE_ROUTES`    | `false`                  |
//!
//! Empty values count as unset.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::api::{DefinitionService, RoutePolicy};
use crate::sync::{SyncConfig, Synchronizer};

pub const ENV_MOCK_DIR: &str = "DYNA_MOCK_API_FOLDER";
pub const ENV_POLL_INTERVAL: &str = "DYNA_POLLING_INTERVAL";
pub const ENV_LOG_LEVEL: &str = "DYNA_LOG_LEVEL";
pub const ENV_REQUIRE_WATCH: &str = "DYNA_REQUIRE_WATCH";
pub const ENV_UNIQUE_ROUTES: &str = "DYNA_UNIQUE_ROUTES";

pub const DEFAULT_MOCK_DIR: &str = "/var/dynamocker/mocks/";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_LOG_LEVEL: &str = "info";

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// An environment variable with an unusable value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a positive number of seconds, got {value:?}")]
    InvalidInterval { var: &'static str, value: String },

    #[error("{var} must be one of trace, debug, info, warn, error, off; got {value:?}")]
    InvalidLogLevel { var: &'static str, value: String },

    #[error("{var} must be a boolean (true/false, yes/no, on/off, 1/0), got {value:?}")]
    InvalidBool { var: &'static str, value: String },
}

/// Settings resolved once at daemon startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub mock_dir: PathBuf,
    pub poll_interval: Duration,
    /// Lowercase tracing level name
    pub log_level: String,
    pub require_watch: bool,
    pub route_policy: RoutePolicy,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            mock_dir: PathBuf::from(DEFAULT_MOCK_DIR),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            require_watch: false,
            route_policy: RoutePolicy::AllowDuplicates,
        }
    }
}

impl DaemonConfig {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for the first variable with an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolves the configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for the first variable with an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = get(ENV_MOCK_DIR) {
            config.mock_dir = PathBuf::from(dir);
        }

        if let Some(value) = get(ENV_POLL_INTERVAL) {
            config.poll_interval = parse_interval(ENV_POLL_INTERVAL, &value)?;
        }

        if let Some(value) = get(ENV_LOG_LEVEL) {
            config.log_level = parse_log_level(&value)?;
        }

        if let Some(value) = get(ENV_REQUIRE_WATCH) {
            config.require_watch = parse_bool(ENV_REQUIRE_WATCH, &value)?;
        }

        if let Some(value) = get(ENV_UNIQUE_ROUTES) {
            if parse_bool(ENV_UNIQUE_ROUTES, &value)? {
                config.route_policy = RoutePolicy::RejectDuplicates;
            }
        }

        Ok(config)
    }

    /// Synchronizer settings for this configuration.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::new(&self.mock_dir)
            .with_reconcile_interval(self.poll_interval)
            .with_require_watch(self.require_watch)
    }

    /// Definition API over `synchronizer` with the configured route policy.
    pub fn service(&self, synchronizer: &Synchronizer) -> DefinitionService {
        synchronizer.service(self.route_policy)
    }
}

/// Parses a whole number of seconds greater than zero.
///
/// # Errors
///
/// Returns `ConfigError::InvalidInterval` otherwise.
pub fn parse_interval(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidInterval {
            var,
            value: value.to_string(),
        }),
    }
}

fn parse_log_level(value: &str) -> Result<String, ConfigError> {
    let level = value.trim().to_ascii_lowercase();
    if LOG_LEVELS.contains(&level.as_str()) {
        Ok(level)
    } else {
        Err(ConfigError::InvalidLogLevel {
            var: ENV_LOG_LEVEL,
            value: value.to_string(),
        })
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var,
            value: value.to_string(),
        }),
    }
}
