//! Error types for the Gomer SDK.
//!
//! [`GomerError`] is the single error type returned by the domain commands,
//! the robot facade and configuration loading.
//!
//! ## Error Hierarchy
//!
//! - **`Link`**: Wraps [`gomer_core::LinkError`], everything the correlation
//!   engine can report: an incompatible device, a rejected or failed command,
//!   an interruption by a newer command in the same group, a timeout, or a
//!   closed link.
//! - **`Config`**: Wraps `figment` errors from parsing configuration files and
//!   environment overrides.
//! - **`Configuration`**: Semantic errors in a configuration that parsed fine,
//!   caught by `validate()`.
//! - **`InvalidParameter`**: A domain argument outside the range the device
//!   accepts. Raised before anything is sent.
//! - **`Io`** and **`Json`**: Wrapped standard and `serde_json` errors, e.g.
//!   from decoding detection results.
//!
//! By using `#[from]`, `GomerError` is created from the underlying error types
//! with the `?` operator.

use gomer_core::LinkError;
use thiserror::Error;

/// Convenience alias for results using the SDK error type.
pub type GomerResult<T> = std::result::Result<T, GomerError>;

#[derive(Error, Debug)]
pub enum GomerError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Completion for opcode {opcode} is missing {field}")]
    MissingResult { opcode: i64, field: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GomerError {
    /// Returns `true` when the link itself is unusable and the robot must be
    /// reconnected.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GomerError::Link(err) if err.is_fatal())
    }
}
