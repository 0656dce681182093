//! Scripted replies and timing for the mock device.

use gomer_core::OperationDescriptor;
use std::time::Duration;

/// How the mock device answers one command.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Reply {
    /// Acknowledge, then complete successfully with no extra fields.
    #[default]
    Complete,
    /// Acknowledge, then complete successfully with these result fields.
    /// `item`, `num` and `result` are filled in by the device.
    CompleteWith(OperationDescriptor),
    /// Acknowledge with a failure status.
    Reject,
    /// Acknowledge, then complete with a failure result.
    Fail,
    /// Send nothing at all.
    WithholdAck,
    /// Acknowledge, but never complete.
    WithholdCompletion,
}

impl Reply {
    /// Result fields for a completion with the given params.
    pub fn fields(fields: OperationDescriptor) -> Self {
        Reply::CompleteWith(fields)
    }

    pub(crate) fn sends_ack(&self) -> bool {
        !matches!(self, Reply::WithholdAck)
    }

    pub(crate) fn sends_completion(&self) -> bool {
        !matches!(
            self,
            Reply::WithholdAck | Reply::WithholdCompletion | Reply::Reject
        )
    }
}

/// Delays between receiving a command and answering it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timing {
    /// Delay before the acknowledgment.
    pub ack_delay: Duration,
    /// Further delay between the acknowledgment and the completion.
    pub completion_delay: Duration,
}

impl Timing {
    /// Answer immediately.
    pub fn instant() -> Self {
        Self::default()
    }

    /// Delays in the range observed on a real robot over Wi-Fi.
    pub fn realistic() -> Self {
        Self {
            ack_delay: Duration::from_millis(15),
            completion_delay: Duration::from_millis(120),
        }
    }

    pub(crate) fn is_instant(&self) -> bool {
        self.ack_delay.is_zero() && self.completion_delay.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_shapes() {
        assert!(Reply::Reject.sends_ack());
        assert!(!Reply::Reject.sends_completion());
        assert!(!Reply::WithholdAck.sends_ack());
        assert!(Reply::WithholdCompletion.sends_ack());
        assert!(!Reply::WithholdCompletion.sends_completion());
        assert!(Reply::Fail.sends_completion());
    }

    #[test]
    fn test_timing_presets() {
        assert!(Timing::instant().is_instant());
        assert!(!Timing::realistic().is_instant());
    }
}
