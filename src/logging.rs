//! Tracing setup.
//!
//! The engine emits structured events carrying `seq`, `opcode`, `group` and
//! `block` fields. [`init_from_config`] installs a `tracing-subscriber`
//! registry that prints them in the configured [`OutputFormat`].
//!
//! Without `RUST_LOG`, the configured level applies to the Gomer crates only
//! and everything else is held at `warn`.
//!
//! # Example
//! ```no_run
//! use gomer::{config::GomerConfig, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GomerConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::info!("Robot SDK started");
//! # Ok(())
//! # }
//! ```

use crate::config::GomerConfig;
use crate::error::{GomerError, GomerResult};
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const GOMER_TARGETS: [&str; 3] = ["gomer", "gomer_core", "gomer_driver_mock"];

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Multi-line, coloured.
    #[default]
    Pretty,
    /// One line per event, no colour.
    Compact,
    /// One JSON object per event.
    Json,
}

/// Install the global subscriber described by `config.application`.
///
/// Calling it again once a subscriber is installed is a no-op.
pub fn init_from_config(config: &GomerConfig) -> GomerResult<()> {
    let level = parse_log_level(&config.application.log_level)?;
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().or_else(|_| default_filter(level))?;
    let layer = match config.application.log_format {
        OutputFormat::Pretty => fmt::layer().pretty().with_filter(filter).boxed(),
        OutputFormat::Compact => fmt::layer()
            .compact()
            .with_ansi(false)
            .with_filter(filter)
            .boxed(),
        OutputFormat::Json => fmt::layer().json().with_filter(filter).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| GomerError::Configuration(format!("Failed to initialize tracing: {}", e)))
}

fn default_filter(level: Level) -> GomerResult<EnvFilter> {
    let level = level.as_str().to_lowercase();
    let directives = GOMER_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .chain(std::iter::once("warn".to_string()))
        .collect::<Vec<_>>()
        .join(",");
    EnvFilter::try_new(&directives)
        .map_err(|e| GomerError::Configuration(format!("Invalid log filter '{}': {}", directives, e)))
}

fn parse_log_level(level: &str) -> GomerResult<Level> {
    level.parse().map_err(|_| {
        GomerError::Configuration(format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        ))
    })
}
