//! Configuration management for sdnfuzz
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence)
//! 2. Environment variables (SDNFUZZ_* prefix, `__` between section and key)
//! 3. sdnfuzz.local.toml (gitignored, local overrides)
//! 4. sdnfuzz.toml (git-tracked, project config)
//! 5. ~/.config/sdnfuzz/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::{ConfigLoader, load_file};
pub use paths::Paths;

/// Main sdnfuzz configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdnfuzzConfig {
    pub replay: ReplaySettings,
    pub logging: LoggingSettings,
}

/// How the replay driver treats events that are not ready yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    /// Pause between two attempts of a pending event.
    pub retry_interval_ms: u64,
    /// Attempts allowed per event; 0 retries forever.
    pub max_attempts: u32,
    /// Wall-clock budget per event; 0 retries forever.
    pub event_timeout_secs: u64,
    /// Treat every `CheckInvariants` as if it had `fail_on_error` set.
    pub fail_on_invariant_violation: bool,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            retry_interval_ms: 10,
            max_attempts: 0,
            event_timeout_secs: 0,
            fail_on_invariant_violation: false,
        }
    }
}

impl ReplaySettings {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn max_attempts(&self) -> Option<u32> {
        (self.max_attempts > 0).then_some(self.max_attempts)
    }

    pub fn event_timeout(&self) -> Option<Duration> {
        (self.event_timeout_secs > 0).then(|| Duration::from_secs(self.event_timeout_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default `tracing` filter directive, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl SdnfuzzConfig {
    /// Load configuration from current directory
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.replay.retry_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "replay.retry_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "logging.filter must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Render as TOML, e.g. for `sdnfuzz config`.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
