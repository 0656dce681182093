//! The ingestion loop.
//!
//! A single task drains the inbound report channel and is the only writer of
//! acknowledgment and completion state. It never blocks on a submitter; every
//! per-operation error is published to that operation's waiter and the loop
//! moves on to the next report.
//!
//! Before the device has been verified, a `hard` report carrying a firmware
//! version is checked against the configured minimum. A device below the
//! minimum stops the loop and poisons the link.

use crate::envelope::{Envelope, Report, ResultCode};
use crate::error::{LinkError, LinkResult};
use crate::state::{LinkState, LinkStatus};
use crate::table::BlockMode;
use crate::transport::{InboundReports, Transport};
use crate::version::FirmwareVersion;
use std::sync::Arc;

/// Drains inbound reports into the live operation table.
pub struct IngestionLoop {
    inbound: InboundReports,
    state: Arc<LinkState>,
    transport: Arc<dyn Transport>,
    minimum: FirmwareVersion,
    verified: bool,
}

impl IngestionLoop {
    pub fn new(
        inbound: InboundReports,
        state: Arc<LinkState>,
        transport: Arc<dyn Transport>,
        minimum: FirmwareVersion,
    ) -> Self {
        Self {
            inbound,
            state,
            transport,
            minimum,
            verified: false,
        }
    }

    /// Run until the inbound channel closes or the device proves incompatible.
    pub async fn run(mut self) -> LinkResult<()> {
        tracing::debug!(minimum = %self.minimum, "Ingestion loop started");
        while let Some(raw) = self.inbound.recv().await {
            if let Err(e) = self.process(&raw).await {
                if let LinkError::DeviceIncompatible { found, required } = &e {
                    self.state.abort(LinkStatus::Incompatible {
                        found: found.clone(),
                        required: required.clone(),
                    });
                    return Err(e);
                }
                tracing::warn!(error = %e, "Failed to process report");
            }
        }
        tracing::info!("Inbound report channel closed");
        self.state.abort(LinkStatus::Closed);
        Ok(())
    }

    /// Handle one raw report. Only a firmware incompatibility is fatal.
    pub async fn process(&mut self, raw: &str) -> LinkResult<()> {
        let report = match Report::decode(raw) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, report = %raw, "Discarding undecodable report");
                return Ok(());
            }
        };

        if let Report::Hardware { version } = &report {
            if !self.verified {
                return self.verify(version);
            }
        }

        match report {
            Report::Acknowledgment {
                correlation,
                status,
            } => {
                self.on_acknowledgment(correlation, status).await;
                Ok(())
            }
            Report::Completion {
                correlation,
                envelope,
            } => self.on_completion(correlation, envelope).await,
            Report::Hardware { version } => {
                tracing::debug!(version = %version, "Hardware report after verification");
                Ok(())
            }
            Report::Unknown(envelope) => {
                tracing::info!(seq = envelope.seq, kind = ?envelope.kind, "Unrecognized report");
                Ok(())
            }
        }
    }

    fn verify(&mut self, version: &str) -> LinkResult<()> {
        let incompatible = || LinkError::DeviceIncompatible {
            found: version.to_string(),
            required: self.minimum.to_string(),
        };
        let found: FirmwareVersion = version.parse().map_err(|_| incompatible())?;
        if found < self.minimum {
            tracing::error!(found = %found, required = %self.minimum, "Device firmware is too old");
            return Err(incompatible());
        }
        self.verified = true;
        self.state.set_status(LinkStatus::Ready(found));
        tracing::info!(firmware = %found, "Device firmware verified");
        Ok(())
    }

    async fn on_acknowledgment(&self, seq: u64, status: Option<i64>) {
        let _wire = self.state.lock_wire().await;
        let mut table = self.state.table();
        let Some(op) = table.get_mut(seq) else {
            tracing::debug!(seq, "Acknowledgment for unknown operation");
            return;
        };
        if op.is_acknowledged() {
            tracing::trace!(seq, "Duplicate acknowledgment");
            return;
        }
        if ResultCode::is_success(status) {
            op.acknowledge();
            tracing::debug!(seq, opcode = op.opcode(), "Operation acknowledged");
        } else {
            tracing::warn!(seq, opcode = op.opcode(), ?status, "Operation rejected by device");
            op.reject(status);
        }
    }

    async fn on_completion(&self, seq: u64, envelope: Envelope) -> LinkResult<()> {
        let _wire = self.state.lock_wire().await;
        let success = ResultCode::is_success(envelope.descriptor().and_then(|op| op.result));
        // The device matches our acknowledgment against its own report seq.
        let reply_seq = envelope.seq;

        let block = {
            let mut table = self.state.table();
            let Some(op) = table.get_mut(seq) else {
                tracing::debug!(seq, "Completion for unknown operation");
                return Ok(());
            };
            if op.is_completed() {
                tracing::trace!(seq, "Duplicate completion");
                return Ok(());
            }
            if success {
                op.complete(envelope);
                tracing::debug!(seq, opcode = op.opcode(), "Operation completed");
            } else {
                let result = envelope.descriptor().and_then(|d| d.result);
                tracing::warn!(seq, opcode = op.opcode(), ?result, "Operation failed on device");
                op.fail(result);
            }
            op.block()
        };

        if success {
            let ack = Envelope::completion_ack(reply_seq).encode()?;
            if let Err(e) = self.transport.transmit(&ack).await {
                tracing::warn!(seq, reply_seq, error = %e, "Failed to send completion acknowledgment");
            }
        }
        if block != BlockMode::All {
            self.state.unregister(seq);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::OperationDescriptor;
    use crate::table::{OperationPhase, SubmittedOperation};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn connect(&self) -> LinkResult<()> {
            Ok(())
        }
        async fn disconnect(&self) -> LinkResult<()> {
            Ok(())
        }
        async fn transmit(&self, text: &str) -> LinkResult<()> {
            self.frames.lock().push(text.to_string());
            Ok(())
        }
    }

    fn setup() -> (IngestionLoop, Arc<LinkState>, Arc<Recorder>) {
        let (_tx, rx) = mpsc::channel(8);
        let state = Arc::new(LinkState::new());
        let recorder = Arc::new(Recorder::default());
        let ingest = IngestionLoop::new(
            rx,
            state.clone(),
            recorder.clone(),
            FirmwareVersion::new(3, 0, 0),
        );
        (ingest, state, recorder)
    }

    fn register(state: &LinkState, seq: u64, block: BlockMode) -> crate::table::OperationHandle {
        let (op, handle) = SubmittedOperation::new(
            OperationDescriptor::with_correlation(1031, seq),
            block,
            Some("sensor".into()),
        );
        state.table().register(op).unwrap();
        handle
    }

    fn completion(seq: u64, result: i64) -> String {
        format!(
            r#"{{"seq":{seq},"msgtype":1,"sdks":{{"item":1031,"num":{seq},"prm1":7,"result":{result}}}}}"#
        )
    }

    #[tokio::test]
    async fn test_old_firmware_is_fatal() {
        let (mut ingest, _state, _) = setup();
        let err = ingest
            .process(r#"{"seq":1001,"msgtype":2,"hard":{"ver":"2.9.9"}}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::DeviceIncompatible { .. }));
    }

    #[tokio::test]
    async fn test_unparseable_firmware_is_incompatible() {
        let (mut ingest, _state, _) = setup();
        let err = ingest
            .process(r#"{"seq":1001,"msgtype":2,"hard":{"ver":"unknown"}}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::DeviceIncompatible { .. }));
    }

    #[tokio::test]
    async fn test_firmware_verified_marks_ready() {
        let (mut ingest, state, _) = setup();
        ingest
            .process(r#"{"seq":1001,"msgtype":2,"hard":{"ver":"3.2.0"}}"#)
            .await
            .unwrap();
        assert_eq!(
            state.status(),
            LinkStatus::Ready(FirmwareVersion::new(3, 2, 0))
        );
    }

    #[tokio::test]
    async fn test_rejection_and_duplicate_ack() {
        let (mut ingest, state, _) = setup();
        let ok = register(&state, 1001, BlockMode::Never);
        let bad = register(&state, 1002, BlockMode::Never);

        ingest.process(r#"{"seq":1001,"msgtype":2,"code":100}"#).await.unwrap();
        ingest.process(r#"{"seq":1001,"msgtype":2,"code":101}"#).await.unwrap();
        ingest.process(r#"{"seq":1002,"msgtype":2,"code":101}"#).await.unwrap();

        assert_eq!(ok.phase(), OperationPhase::Acknowledged);
        assert_eq!(bad.phase(), OperationPhase::Rejected { status: Some(101) });
    }

    #[tokio::test]
    async fn test_completion_is_idempotent() {
        let (mut ingest, state, recorder) = setup();
        let handle = register(&state, 1003, BlockMode::All);

        ingest.process(&completion(1003, 100)).await.unwrap();
        ingest.process(&completion(1003, 100)).await.unwrap();

        assert_eq!(handle.phase(), OperationPhase::Completed);
        // ALL entries stay for the waiting submitter
        assert!(state.table().contains(1003));
        let frames = recorder.frames.lock();
        assert_eq!(frames.len(), 1);
        let ack: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(ack, serde_json::json!({"seq": 1003, "msgtype": 2, "code": 100}));
    }

    #[tokio::test]
    async fn test_completion_ack_echoes_report_seq() {
        let (mut ingest, state, recorder) = setup();
        let handle = register(&state, 1010, BlockMode::All);

        ingest
            .process(r#"{"seq":7,"msgtype":1,"sdks":{"item":1031,"num":1010,"result":100}}"#)
            .await
            .unwrap();

        assert_eq!(handle.phase(), OperationPhase::Completed);
        let frames = recorder.frames.lock();
        assert_eq!(frames.len(), 1);
        let ack: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(ack, serde_json::json!({"seq": 7, "msgtype": 2, "code": 100}));
    }

    #[tokio::test]
    async fn test_auto_completion_unregisters_and_releases() {
        let (mut ingest, state, _) = setup();
        register(&state, 1004, BlockMode::Auto);
        assert!(state.table().is_group_reserved("sensor"));

        ingest.process(&completion(1004, 100)).await.unwrap();

        assert!(state.table().is_empty());
        assert!(!state.table().is_group_reserved("sensor"));
    }

    #[tokio::test]
    async fn test_failed_completion_sends_no_ack() {
        let (mut ingest, state, recorder) = setup();
        let handle = register(&state, 1005, BlockMode::All);

        ingest.process(&completion(1005, 101)).await.unwrap();

        assert_eq!(handle.phase(), OperationPhase::Failed { result: Some(101) });
        assert!(recorder.frames.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_and_garbage_reports_are_discarded() {
        let (mut ingest, state, _) = setup();
        ingest.process("garbage").await.unwrap();
        ingest.process(r#"{"seq":9999,"msgtype":2,"code":100}"#).await.unwrap();
        ingest
            .process(r#"{"seq":12,"msgtype":0,"control":{"video":101}}"#)
            .await
            .unwrap();
        assert!(state.table().is_empty());
    }

    #[tokio::test]
    async fn test_closed_channel_aborts_link() {
        let (tx, rx) = mpsc::channel(1);
        let state = Arc::new(LinkState::new());
        let ingest = IngestionLoop::new(
            rx,
            state.clone(),
            Arc::new(Recorder::default()),
            FirmwareVersion::new(3, 0, 0),
        );
        drop(tx);
        ingest.run().await.unwrap();
        assert_eq!(state.status(), LinkStatus::Closed);
    }
}
