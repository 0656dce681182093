//! Simulated Gomer device.

use crate::script::{Reply, Timing};
use async_trait::async_trait;
use gomer_core::transport::{check_frame, report_channel};
use gomer_core::{
    Category, Envelope, EnvelopeBody, InboundReports, LinkError, LinkResult, MessageKind,
    OperationDescriptor, ReportSender, ResultCode, Transport, PARAM_SLOTS,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Firmware version reported when none is configured.
pub const DEFAULT_FIRMWARE: &str = "3.2.1";

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`MockDevice`].
#[derive(Debug, Clone)]
pub struct MockDeviceBuilder {
    firmware: String,
    auto_ack: bool,
    auto_complete: bool,
    timing: Timing,
    default_reply: Reply,
    scripts: HashMap<i64, Reply>,
}

impl Default for MockDeviceBuilder {
    fn default() -> Self {
        Self {
            firmware: DEFAULT_FIRMWARE.to_string(),
            auto_ack: true,
            auto_complete: true,
            timing: Timing::instant(),
            default_reply: Reply::Complete,
            scripts: HashMap::new(),
        }
    }
}

impl MockDeviceBuilder {
    /// Firmware version returned to the version query.
    pub fn firmware(mut self, version: impl Into<String>) -> Self {
        self.firmware = version.into();
        self
    }

    /// Acknowledge commands without being told to (default: on).
    pub fn auto_acknowledge(mut self, enabled: bool) -> Self {
        self.auto_ack = enabled;
        self
    }

    /// Complete commands without being told to (default: on).
    pub fn auto_complete(mut self, enabled: bool) -> Self {
        self.auto_complete = enabled;
        self
    }

    /// Reply with no delay, or with [`Timing::realistic`] delays.
    pub fn timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Reply used for opcodes without a script.
    pub fn default_reply(mut self, reply: Reply) -> Self {
        self.default_reply = reply;
        self
    }

    /// Script the reply for every command with `opcode`.
    pub fn reply(mut self, opcode: i64, reply: Reply) -> Self {
        self.scripts.insert(opcode, reply);
        self
    }

    /// Build the device and the inbound channel the engine should drain.
    pub fn build(self) -> (MockDevice, InboundReports) {
        let (tx, rx) = report_channel();
        let device = MockDevice {
            inner: Arc::new(Inner {
                firmware: self.firmware,
                auto_ack: self.auto_ack,
                auto_complete: self.auto_complete,
                timing: self.timing,
                default_reply: self.default_reply,
                scripts: Mutex::new(self.scripts),
                queued: Mutex::new(HashMap::new()),
                frames: Mutex::new(Vec::new()),
                opcodes: Mutex::new(HashMap::new()),
                holds: Mutex::new(HashMap::new()),
                parked: AtomicUsize::new(0),
                reports: Mutex::new(Some(tx)),
            }),
        };
        (device, rx)
    }
}

// =============================================================================
// MockDevice
// =============================================================================

/// In-memory stand-in for a robot, implementing [`Transport`].
///
/// Every frame the engine transmits is recorded. Requests are answered
/// according to the builder settings and per-opcode [`Reply`] scripts;
/// tests may also drive acknowledgments and completions by hand.
#[derive(Clone)]
pub struct MockDevice {
    inner: Arc<Inner>,
}

struct Inner {
    firmware: String,
    auto_ack: bool,
    auto_complete: bool,
    timing: Timing,
    default_reply: Reply,
    scripts: Mutex<HashMap<i64, Reply>>,
    /// One-shot replies, used before the script for their opcode.
    queued: Mutex<HashMap<i64, VecDeque<Reply>>>,
    frames: Mutex<Vec<String>>,
    /// Opcode of every request seen, by correlation number.
    opcodes: Mutex<HashMap<u64, i64>>,
    holds: Mutex<HashMap<i64, watch::Sender<bool>>>,
    parked: AtomicUsize,
    reports: Mutex<Option<ReportSender>>,
}

impl std::fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDevice")
            .field("firmware", &self.inner.firmware)
            .field("frames", &self.inner.frames.lock().len())
            .finish_non_exhaustive()
    }
}

impl MockDevice {
    pub fn builder() -> MockDeviceBuilder {
        MockDeviceBuilder::default()
    }

    /// A device that acknowledges and completes everything.
    pub fn new() -> (Self, InboundReports) {
        Self::builder().build()
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Every frame received, in order.
    pub fn frames(&self) -> Vec<String> {
        self.inner.frames.lock().clone()
    }

    /// Operation descriptors of every command received, in order.
    pub fn requests(&self) -> Vec<OperationDescriptor> {
        self.decoded()
            .into_iter()
            .filter(|envelope| envelope.kind == MessageKind::Request)
            .filter_map(Envelope::into_descriptor)
            .collect()
    }

    /// The most recent command received.
    pub fn last_request(&self) -> Option<OperationDescriptor> {
        self.requests().pop()
    }

    /// Report seqs the host has sent completion acknowledgments for.
    pub fn completion_acks(&self) -> Vec<u64> {
        self.decoded()
            .into_iter()
            .filter(|envelope| envelope.kind == MessageKind::Response)
            .map(|envelope| envelope.seq)
            .collect()
    }

    /// Number of transmissions currently paused by [`Self::hold_transmit`].
    pub fn parked(&self) -> usize {
        self.inner.parked.load(Ordering::SeqCst)
    }

    fn decoded(&self) -> Vec<Envelope> {
        self.inner
            .frames
            .lock()
            .iter()
            .filter_map(|frame| Envelope::decode(frame).ok())
            .collect()
    }

    // -------------------------------------------------------------------------
    // Scripting
    // -------------------------------------------------------------------------

    /// Change the reply for `opcode` after construction.
    pub fn script(&self, opcode: i64, reply: Reply) {
        self.inner.scripts.lock().insert(opcode, reply);
    }

    /// Answer the next command with `opcode` using `reply`, once.
    ///
    /// Queued replies are used in order; when they run out the script (or
    /// the default reply) applies again.
    pub fn queue_reply(&self, opcode: i64, reply: Reply) {
        self.inner
            .queued
            .lock()
            .entry(opcode)
            .or_default()
            .push_back(reply);
    }

    /// Pause every transmission of `opcode` until released.
    pub fn hold_transmit(&self, opcode: i64) {
        let (tx, _) = watch::channel(true);
        self.inner.holds.lock().insert(opcode, tx);
    }

    /// Let paused transmissions of `opcode` through.
    pub fn release_transmit(&self, opcode: i64) {
        if let Some(hold) = self.inner.holds.lock().remove(&opcode) {
            hold.send_replace(false);
        }
    }

    // -------------------------------------------------------------------------
    // Manual drivers
    // -------------------------------------------------------------------------

    /// Acknowledge `seq` with success.
    pub fn acknowledge(&self, seq: u64) {
        self.push(ack_frame(seq, ResultCode::Success));
    }

    /// Acknowledge `seq` with a failure status.
    pub fn reject(&self, seq: u64) {
        self.push(ack_frame(seq, ResultCode::Fail));
    }

    /// Complete `seq` successfully.
    pub fn complete(&self, seq: u64) {
        self.push(self.completion_frame(seq, None, ResultCode::Success));
    }

    /// Complete `seq` successfully with result fields.
    pub fn complete_with(&self, seq: u64, fields: OperationDescriptor) {
        self.push(self.completion_frame(seq, Some(fields), ResultCode::Success));
    }

    /// Complete `seq` with a failure result.
    pub fn fail(&self, seq: u64) {
        self.push(self.completion_frame(seq, None, ResultCode::Fail));
    }

    /// Deliver a raw frame to the engine.
    pub fn inject(&self, raw: impl Into<String>) {
        self.push(raw.into());
    }

    /// Drop the link from the device side.
    pub fn hang_up(&self) {
        if self.inner.reports.lock().take().is_some() {
            tracing::debug!("Mock device hung up");
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn push(&self, frame: String) {
        let guard = self.inner.reports.lock();
        let Some(reports) = guard.as_ref() else {
            tracing::debug!(frame = %frame, "Mock device is disconnected, dropping frame");
            return;
        };
        if let Err(e) = reports.try_send(frame) {
            tracing::warn!(error = %e, "Mock device report queue full");
        }
    }

    fn completion_frame(
        &self,
        seq: u64,
        fields: Option<OperationDescriptor>,
        result: ResultCode,
    ) -> String {
        let opcode = self.inner.opcodes.lock().get(&seq).copied().unwrap_or_default();
        let mut descriptor =
            OperationDescriptor::with_correlation(opcode, seq).with_result(result.code());
        if let Some(fields) = fields {
            for slot in 1..=PARAM_SLOTS {
                if let Some(value) = fields.get_param(slot) {
                    descriptor = descriptor.param(slot, value);
                }
                if let Some(text) = fields.get_text(slot) {
                    descriptor = descriptor.text(slot, text);
                }
            }
        }
        Envelope::request(descriptor).encode().unwrap_or_default()
    }

    async fn wait_if_held(&self, opcode: i64) {
        let hold = self.inner.holds.lock().get(&opcode).map(watch::Sender::subscribe);
        if let Some(mut hold) = hold {
            self.inner.parked.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(opcode, "Mock device holding transmission");
            // Err means the hold was dropped, which also releases it.
            let _ = hold.wait_for(|held| !*held).await;
            self.inner.parked.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn respond(&self, envelope: Envelope) {
        if envelope.kind == MessageKind::Response {
            tracing::trace!(seq = envelope.seq, "Host acknowledged a completion");
            return;
        }
        match envelope.body {
            Some(EnvelopeBody::Channel {
                category: Category::Hard,
                ..
            }) => {
                let reply = Envelope {
                    seq: envelope.seq,
                    kind: MessageKind::Response,
                    code: None,
                    body: Some(EnvelopeBody::Channel {
                        category: Category::Hard,
                        value: json!({ "ver": self.inner.firmware }),
                    }),
                };
                self.push(reply.encode().unwrap_or_default());
            }
            Some(EnvelopeBody::Operation(op)) => self.answer(op),
            _ => tracing::debug!(seq = envelope.seq, "Mock device ignoring frame"),
        }
    }

    fn answer(&self, op: OperationDescriptor) {
        let seq = op.correlation();
        let opcode = op.opcode();
        self.inner.opcodes.lock().insert(seq, opcode);

        let queued = self
            .inner
            .queued
            .lock()
            .get_mut(&opcode)
            .and_then(VecDeque::pop_front);
        let reply = queued.unwrap_or_else(|| {
            self.inner
                .scripts
                .lock()
                .get(&opcode)
                .cloned()
                .unwrap_or_else(|| self.inner.default_reply.clone())
        });

        let mut replies: Vec<(Duration, String)> = Vec::new();
        if self.inner.auto_ack && reply.sends_ack() {
            let status = if reply == Reply::Reject {
                ResultCode::Fail
            } else {
                ResultCode::Success
            };
            replies.push((self.inner.timing.ack_delay, ack_frame(seq, status)));
        }
        if self.inner.auto_complete && reply.sends_completion() {
            let frame = match reply {
                Reply::Fail => self.completion_frame(seq, None, ResultCode::Fail),
                Reply::CompleteWith(fields) => {
                    self.completion_frame(seq, Some(fields), ResultCode::Success)
                }
                _ => self.completion_frame(seq, None, ResultCode::Success),
            };
            replies.push((self.inner.timing.completion_delay, frame));
        }

        if self.inner.timing.is_instant() {
            for (_, frame) in replies {
                self.push(frame);
            }
            return;
        }
        let device = self.clone();
        tokio::spawn(async move {
            for (delay, frame) in replies {
                tokio::time::sleep(delay).await;
                device.push(frame);
            }
        });
    }
}

fn ack_frame(seq: u64, status: ResultCode) -> String {
    let envelope = Envelope {
        seq,
        kind: MessageKind::Response,
        code: Some(status.code()),
        body: None,
    };
    envelope.encode().unwrap_or_default()
}

#[async_trait]
impl Transport for MockDevice {
    async fn connect(&self) -> LinkResult<()> {
        if self.inner.reports.lock().is_none() {
            return Err(LinkError::Disconnected);
        }
        tracing::debug!(firmware = %self.inner.firmware, "Mock device connected");
        Ok(())
    }

    async fn disconnect(&self) -> LinkResult<()> {
        self.hang_up();
        Ok(())
    }

    async fn transmit(&self, text: &str) -> LinkResult<()> {
        check_frame(text)?;
        let envelope = Envelope::decode(text)?;
        if let Some(op) = envelope.descriptor() {
            if envelope.kind == MessageKind::Request {
                self.wait_if_held(op.opcode()).await;
            }
        }
        if self.inner.reports.lock().is_none() {
            return Err(LinkError::Disconnected);
        }
        self.inner.frames.lock().push(text.to_string());
        self.respond(envelope);
        Ok(())
    }
}
