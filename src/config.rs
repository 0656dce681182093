//! Configuration loading using Figment.
//!
//! Configuration is loaded from:
//! 1. `config/gomer.toml` (base configuration)
//! 2. Environment variables prefixed with `GOMER_`
//!
//! Every section and field has a default, so a missing file yields a usable
//! configuration that connects to the robot's default address.
//!
//! # Example
//! ```no_run
//! use gomer::config::GomerConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GomerConfig::load()?;
//! config.validate()?;
//! println!("Robot at {}", config.link.address);
//! # Ok(())
//! # }
//! ```
//!
//! Environment overrides use `__` between section and key, e.g.
//! `GOMER_LINK__ADDRESS=10.0.0.7:9000` or `GOMER_ENGINE__ACK_TIMEOUT_MS=0`.

use crate::error::{GomerError, GomerResult};
use crate::logging::OutputFormat;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use gomer_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/gomer.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GomerConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Device link settings
    pub link: LinkConfig,
    /// Correlation engine tuning
    pub engine: EngineConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: OutputFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "gomer".to_string(),
            log_level: "info".to_string(),
            log_format: OutputFormat::Pretty,
        }
    }
}

/// Device link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Robot address as `host:port`
    pub address: String,
    /// Robot name, used only in logs
    pub device_name: Option<String>,
    /// Pause after connecting before the version query, in milliseconds
    pub settle_delay_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            address: "192.168.1.1:9000".to_string(),
            device_name: None,
            settle_delay_ms: 500,
        }
    }
}

impl LinkConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl GomerConfig {
    /// Load configuration from `config/gomer.toml` and environment variables
    pub fn load() -> GomerResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> GomerResult<Self> {
        let config = Figment::from(Serialized::defaults(GomerConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("GOMER_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> GomerResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(GomerError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.link.address.trim().is_empty() {
            return Err(GomerError::Configuration(
                "link.address cannot be empty".to_string(),
            ));
        }

        if self.engine.poll_interval_ms == 0 {
            return Err(GomerError::Configuration(
                "engine.poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.engine.minimum_firmware().is_err() {
            return Err(GomerError::Configuration(format!(
                "Invalid engine.minimum_firmware '{}'. Expected major.minor.patch",
                self.engine.minimum_firmware
            )));
        }

        Ok(())
    }
}
