//! The submission protocol.
//!
//! [`Dispatcher::submit`] is the single entry point used by every domain
//! command. Each call walks the same steps, any of which may suspend the
//! calling task:
//!
//! 1. **Group gate** (AUTO only): wait while the group is reserved by an
//!    unresolved AUTO operation.
//! 2. **Transmit** the request envelope, then **register** it in the live
//!    table, both under the wire lock.
//! 3. **Acknowledgment**: wait until the device acknowledges, rejects, or the
//!    entry leaves the table.
//! 4. **Interruption sweep**: remove the oldest older entry in the same group.
//! 5. **Completion** (ALL only): wait for the completion and return its fields.
//!
//! Waits are signalled through the entry's phase channel and the link's
//! release notification. Every wait is bounded by the matching timeout in
//! [`EngineConfig`]; a bound of zero waits indefinitely.
//!
//! # Example
//!
//! ```rust,ignore
//! let dispatcher = engine.dispatcher();
//! let op = dispatcher.descriptor(1031).param(1, 0);
//! let fields = dispatcher.submit(op, None, BlockMode::All).await?;
//! ```

use crate::config::EngineConfig;
use crate::descriptor::{OperationDescriptor, ResultFields};
use crate::envelope::Envelope;
use crate::error::{LinkError, LinkResult, WaitStage};
use crate::sequence::SequenceAllocator;
use crate::state::LinkState;
use crate::table::{BlockMode, OperationPhase, SubmittedOperation};
use crate::transport::Transport;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Submits operations and waits on their reports.
///
/// Cheap to clone; every clone shares the same link state, transport and
/// sequence allocator.
#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<LinkState>,
    transport: Arc<dyn Transport>,
    sequence: Arc<SequenceAllocator>,
    config: EngineConfig,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("last_seq", &self.sequence.current())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        state: Arc<LinkState>,
        transport: Arc<dyn Transport>,
        sequence: Arc<SequenceAllocator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            state,
            transport,
            sequence,
            config,
        }
    }

    /// A fresh descriptor for `opcode` with the next correlation number.
    pub fn descriptor(&self, opcode: i64) -> OperationDescriptor {
        OperationDescriptor::new(opcode, &self.sequence)
    }

    pub fn sequence(&self) -> &SequenceAllocator {
        &self.sequence
    }

    pub fn state(&self) -> &Arc<LinkState> {
        &self.state
    }

    /// Send a frame that bypasses correlation, such as the version query.
    pub async fn send_raw(&self, text: &str) -> LinkResult<()> {
        let _wire = self.state.lock_wire().await;
        self.transport.transmit(text).await
    }

    /// Submit one operation.
    ///
    /// Returns the completion's result fields for [`BlockMode::All`] and
    /// `None` for the other modes, which return once the device has
    /// acknowledged the command.
    pub async fn submit(
        &self,
        descriptor: OperationDescriptor,
        group: Option<&str>,
        block: BlockMode,
    ) -> LinkResult<Option<ResultFields>> {
        let seq = descriptor.correlation();
        let opcode = descriptor.opcode();
        self.fail_fast()?;

        if block == BlockMode::Auto {
            if let Some(group) = group {
                self.wait_for_group(seq, group).await?;
            }
        }

        let frame = Envelope::request(descriptor.clone()).encode()?;
        let (op, mut handle) = SubmittedOperation::new(descriptor, block, group.map(str::to_string));
        {
            let _wire = self.state.lock_wire().await;
            self.fail_fast()?;
            // A live duplicate would leave the device running an untracked command.
            if self.state.table().contains(seq) {
                return Err(LinkError::DuplicateCorrelation(seq));
            }
            self.transport.transmit(&frame).await?;
            self.state.table().register(op)?;
        }
        tracing::debug!(seq, opcode, group = group.unwrap_or("-"), %block, "Operation submitted");

        // Acknowledgment
        let acked = bounded(
            self.config.ack_timeout(),
            handle.wait_until(|phase| *phase != OperationPhase::Pending),
        )
        .await;
        match acked {
            None => {
                self.state.unregister(seq);
                tracing::warn!(seq, opcode, "No acknowledgment before timeout");
                return Err(LinkError::Timeout {
                    seq,
                    stage: WaitStage::Acknowledgment,
                });
            }
            Some(Some(OperationPhase::Rejected { status })) => {
                self.state.unregister(seq);
                return Err(LinkError::OperationRejected {
                    seq,
                    opcode,
                    status,
                });
            }
            Some(Some(OperationPhase::Interrupted { by })) => {
                return Err(LinkError::Interrupted { seq, by });
            }
            Some(Some(OperationPhase::Failed { result })) if block == BlockMode::All => {
                self.state.unregister(seq);
                return Err(LinkError::OperationFailed {
                    seq,
                    opcode,
                    result,
                });
            }
            // Left the table without an error, e.g. completed before the ack.
            Some(None) => self.fail_fast()?,
            Some(Some(_)) => {}
        }

        if let Some(group) = group {
            self.sweep(seq, group);
        }

        if block != BlockMode::All {
            return Ok(None);
        }

        let finished = bounded(
            self.config.completion_timeout(),
            handle.wait_until(|phase| {
                matches!(
                    phase,
                    OperationPhase::Completed
                        | OperationPhase::Failed { .. }
                        | OperationPhase::Interrupted { .. }
                )
            }),
        )
        .await;
        match finished {
            None => {
                self.state.unregister(seq);
                tracing::warn!(seq, opcode, "No completion before timeout");
                Err(LinkError::Timeout {
                    seq,
                    stage: WaitStage::Completion,
                })
            }
            Some(Some(OperationPhase::Completed)) => {
                let fields = self
                    .state
                    .unregister(seq)
                    .and_then(|mut op| op.take_completion())
                    .and_then(Envelope::into_descriptor);
                tracing::debug!(seq, opcode, "Completion consumed");
                Ok(fields)
            }
            Some(Some(OperationPhase::Failed { result })) => {
                self.state.unregister(seq);
                Err(LinkError::OperationFailed {
                    seq,
                    opcode,
                    result,
                })
            }
            Some(Some(OperationPhase::Interrupted { by })) => {
                Err(LinkError::Interrupted { seq, by })
            }
            Some(_) => Err(self
                .state
                .status()
                .as_error()
                .unwrap_or(LinkError::Disconnected)),
        }
    }

    fn fail_fast(&self) -> LinkResult<()> {
        match self.state.status().as_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn wait_for_group(&self, seq: u64, group: &str) -> LinkResult<()> {
        let poll = self.config.poll_interval();
        let gate = async {
            let mut waited = false;
            loop {
                // Register for the release signal before checking, so a
                // release between check and wait is not missed.
                let released = self.state.released().notified();
                let reserved = self.state.table().is_group_reserved(group);
                if !reserved {
                    if waited {
                        tracing::debug!(seq, group, "Group released");
                    }
                    return Ok(());
                }
                self.fail_fast()?;
                if !waited {
                    tracing::debug!(seq, group, "Waiting for group to be released");
                    waited = true;
                }
                tokio::select! {
                    _ = released => {}
                    _ = tokio::time::sleep(poll) => {}
                }
            }
        };
        bounded(self.config.gate_timeout(), gate)
            .await
            .unwrap_or(Err(LinkError::Timeout {
                seq,
                stage: WaitStage::GroupGate,
            }))
    }

    fn sweep(&self, seq: u64, group: &str) {
        let superseded = {
            let mut table = self.state.table();
            if table.contains(seq) {
                table.supersede_predecessor(seq, group)
            } else {
                None
            }
        };
        if let Some(stale) = superseded {
            self.state.notify_released();
            tracing::info!(seq, superseded = stale, group, "Superseded older operation");
        }
    }
}

/// Run `fut`, giving up after `limit` if one is set.
pub(crate) async fn bounded<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}
