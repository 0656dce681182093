//! Engine configuration.
//!
//! All fields have defaults, so an empty `[engine]` table (or none at all) is
//! a valid configuration. Timeouts are in milliseconds; `0` means wait
//! indefinitely, which reproduces an unbounded device link.
//!
//! ```toml
//! [engine]
//! sequence_base = 1000
//! poll_interval_ms = 10
//! ack_timeout_ms = 5000
//! completion_timeout_ms = 60000
//! minimum_firmware = "3.0.0"
//! ```

use crate::error::LinkResult;
use crate::sequence::DEFAULT_SEQUENCE_BASE;
use crate::version::FirmwareVersion;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for the correlation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Last-issued value of a fresh sequence allocator.
    pub sequence_base: u64,
    /// Fall-back re-check interval for the group gate.
    pub poll_interval_ms: u64,
    /// Bound on waiting for a same-group AUTO operation to finish.
    pub gate_timeout_ms: u64,
    /// Bound on waiting for an acknowledgment.
    pub ack_timeout_ms: u64,
    /// Bound on waiting for an ALL-mode completion.
    pub completion_timeout_ms: u64,
    /// Bound on waiting for the firmware version report.
    pub handshake_timeout_ms: u64,
    /// Minimum accepted firmware version.
    pub minimum_firmware: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sequence_base: DEFAULT_SEQUENCE_BASE,
            poll_interval_ms: 10,
            gate_timeout_ms: 60_000,
            ack_timeout_ms: 5_000,
            completion_timeout_ms: 60_000,
            handshake_timeout_ms: 5_000,
            minimum_firmware: "3.0.0".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn gate_timeout(&self) -> Option<Duration> {
        bound(self.gate_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Option<Duration> {
        bound(self.ack_timeout_ms)
    }

    pub fn completion_timeout(&self) -> Option<Duration> {
        bound(self.completion_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        bound(self.handshake_timeout_ms)
    }

    /// Parsed minimum firmware version.
    pub fn minimum_firmware(&self) -> LinkResult<FirmwareVersion> {
        self.minimum_firmware.parse()
    }

    /// Disable every timeout.
    pub fn unbounded(mut self) -> Self {
        self.gate_timeout_ms = 0;
        self.ack_timeout_ms = 0;
        self.completion_timeout_ms = 0;
        self.handshake_timeout_ms = 0;
        self
    }
}

fn bound(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_means_unbounded() {
        let config = EngineConfig::default().unbounded();
        assert_eq!(config.ack_timeout(), None);
        assert_eq!(config.completion_timeout(), None);
        assert_eq!(
            EngineConfig::default().ack_timeout(),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_partial_table_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"ack_timeout_ms": 250, "minimum_firmware": "3.1.0"}"#)
                .unwrap();
        assert_eq!(config.ack_timeout_ms, 250);
        assert_eq!(config.poll_interval_ms, 10);
        assert_eq!(
            config.minimum_firmware().unwrap(),
            FirmwareVersion::new(3, 1, 0)
        );
    }
}
