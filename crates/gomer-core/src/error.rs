//! Error types for the correlation engine.
//!
//! Every failure a caller of [`crate::dispatch::Dispatcher::submit`] can observe
//! is a [`LinkError`]. Errors are local to the operation that raised them: a
//! rejection or failed completion terminates only the submission waiting on it,
//! never the ingestion loop or other operations in flight.
//!
//! ## Error Categories
//!
//! 1. **Fatal link errors** - `DeviceIncompatible`, `Disconnected`
//!    - Raised once for the whole link; every later submission fails fast
//!    - Recovery: update device firmware or reconnect
//!
//! 2. **Per-operation errors** - `OperationRejected`, `OperationFailed`,
//!    `Interrupted`, `Timeout`
//!    - Surface only to the caller that submitted the operation
//!    - Recovery: resubmit if desired, the engine never retries
//!
//! 3. **Codec and transport errors** - `Decode`, `Transport`, `Io`, `InvalidVersion`

use std::fmt;
use thiserror::Error;

/// Convenience alias for results produced by the engine.
pub type LinkResult<T> = std::result::Result<T, LinkError>;

/// The point in the submission protocol at which a wait gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStage {
    /// Waiting for a same-group AUTO operation to release its group.
    GroupGate,
    /// Waiting for the device to acknowledge the command.
    Acknowledgment,
    /// Waiting for the completion report of an ALL-mode command.
    Completion,
    /// Waiting for the firmware version report after connecting.
    Handshake,
}

impl fmt::Display for WaitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WaitStage::GroupGate => "group gate",
            WaitStage::Acknowledgment => "acknowledgment",
            WaitStage::Completion => "completion",
            WaitStage::Handshake => "handshake",
        };
        write!(f, "{}", label)
    }
}

/// Primary error type for the device link.
#[derive(Error, Debug)]
pub enum LinkError {
    /// The connected device runs firmware older than the configured minimum.
    ///
    /// **Error Type**: Fatal. No further reports are routed once this is raised.
    ///
    /// **Recovery Strategy**: Update the device firmware, then reconnect.
    #[error("Device firmware {found} is below the minimum required version {required}")]
    DeviceIncompatible {
        /// Version string reported by the device.
        found: String,
        /// Minimum version configured for this link.
        required: String,
    },

    /// The device acknowledged the command with a failure status.
    #[error("Operation {seq} (opcode {opcode}) rejected by device, status {status:?}")]
    OperationRejected {
        /// Correlation number of the rejected operation.
        seq: u64,
        /// Opcode of the rejected operation.
        opcode: i64,
        /// Status code carried by the acknowledgment, if any.
        status: Option<i64>,
    },

    /// The device completed the command with a failure result.
    ///
    /// Only ALL-mode submissions observe this; other modes return after the
    /// acknowledgment.
    #[error("Operation {seq} (opcode {opcode}) failed on device, result {result:?}")]
    OperationFailed {
        /// Correlation number of the failed operation.
        seq: u64,
        /// Opcode of the failed operation.
        opcode: i64,
        /// Result code carried by the completion report, if any.
        result: Option<i64>,
    },

    /// A newer operation in the same group superseded this one.
    #[error("Operation {seq} was interrupted by newer operation {by}")]
    Interrupted {
        /// Correlation number of the superseded operation.
        seq: u64,
        /// Correlation number of the operation that superseded it.
        by: u64,
    },

    /// A configured wait bound elapsed.
    #[error("Operation {seq} timed out waiting for {stage}")]
    Timeout {
        /// Correlation number of the operation that was waiting.
        seq: u64,
        /// The wait that elapsed.
        stage: WaitStage,
    },

    /// The inbound report channel closed, or the engine was shut down.
    #[error("Device link is disconnected")]
    Disconnected,

    /// The same correlation number was registered twice.
    #[error("Correlation number {0} is already registered")]
    DuplicateCorrelation(u64),

    /// A firmware version string could not be parsed.
    #[error("Invalid firmware version '{0}'")]
    InvalidVersion(String),

    /// The transport refused or failed to carry a frame.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A report or envelope could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Standard I/O failure on the underlying link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Returns `true` for errors that poison the whole link rather than a
    /// single operation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LinkError::DeviceIncompatible { .. } | LinkError::Disconnected
        )
    }
}
