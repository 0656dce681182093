//! The live operation table.
//!
//! [`LiveOperationTable`] records every operation that is waiting for an
//! acknowledgment or a completion. It also holds the set of groups reserved by
//! unresolved AUTO-mode operations.
//!
//! ```text
//!   Dispatcher ── register ──▶ ┌──────────────────────────────┐ ◀── acknowledge ── IngestionLoop
//!              ◀─ unregister ─ │ entries (submission order)   │ ─── complete ────▶
//!              ── supersede ─▶ │ reserved groups {wheel, arm} │ ◀── unregister ───
//!                              └──────────────────────────────┘
//! ```
//!
//! The table has no lock of its own; [`crate::state::LinkState`] wraps it in a
//! single mutex so that register/unregister/reservation changes are atomic.
//!
//! Each entry owns a `watch` sender that publishes its [`OperationPhase`]. The
//! submitting caller keeps the matching [`OperationHandle`]. Removing the
//! entry drops the sender, which wakes that caller.

use crate::descriptor::OperationDescriptor;
use crate::envelope::Envelope;
use crate::error::{LinkError, LinkResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tokio::sync::watch;

// =============================================================================
// Block mode
// =============================================================================

/// How long a submission blocks, and whether it serializes its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockMode {
    /// Return after the acknowledgment; never reserves the group.
    Never,
    /// Return after the acknowledgment; reserve the group until the
    /// operation resolves, so later AUTO submissions to it wait.
    #[default]
    Auto,
    /// Wait for the completion and return its result fields.
    All,
}

impl BlockMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockMode::Never => "never",
            BlockMode::Auto => "auto",
            BlockMode::All => "all",
        }
    }
}

impl fmt::Display for BlockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "never" => Ok(BlockMode::Never),
            "auto" => Ok(BlockMode::Auto),
            "all" => Ok(BlockMode::All),
            other => Err(format!(
                "Invalid block mode '{}'. Must be one of: auto, never, all",
                other
            )),
        }
    }
}

// =============================================================================
// Submitted operation
// =============================================================================

/// Lifecycle phase published to the waiting submitter.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationPhase {
    Pending,
    Acknowledged,
    /// Completed successfully; the completion envelope is stored in the entry.
    Completed,
    /// Acknowledged with a failure status.
    Rejected { status: Option<i64> },
    /// Completed with a failure result.
    Failed { result: Option<i64> },
    /// Superseded by a newer same-group operation.
    Interrupted { by: u64 },
}

/// An operation owned by the table from registration until removal.
#[derive(Debug)]
pub struct SubmittedOperation {
    descriptor: OperationDescriptor,
    block: BlockMode,
    group: Option<String>,
    acknowledged: bool,
    interrupted: bool,
    completed: bool,
    completion: Option<Envelope>,
    phase: watch::Sender<OperationPhase>,
}

/// The submitter's view of an operation it registered.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    seq: u64,
    phase: watch::Receiver<OperationPhase>,
}

impl OperationHandle {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Latest published phase.
    pub fn phase(&self) -> OperationPhase {
        self.phase.borrow().clone()
    }

    /// Wait until `settled` accepts the phase.
    ///
    /// Returns `None` if the entry was removed from the table first; the
    /// caller then decides from link state what removal meant.
    pub async fn wait_until<F>(&mut self, mut settled: F) -> Option<OperationPhase>
    where
        F: FnMut(&OperationPhase) -> bool,
    {
        let outcome = self
            .phase
            .wait_for(|phase| settled(phase))
            .await
            .map(|phase| phase.clone());
        match outcome {
            Ok(phase) => Some(phase),
            Err(_) => {
                // Sender dropped; a phase published just before removal still counts.
                let last = self.phase.borrow().clone();
                settled(&last).then_some(last)
            }
        }
    }
}

impl SubmittedOperation {
    /// Wrap a descriptor for registration, returning the submitter's handle.
    pub fn new(
        descriptor: OperationDescriptor,
        block: BlockMode,
        group: Option<String>,
    ) -> (Self, OperationHandle) {
        let (tx, rx) = watch::channel(OperationPhase::Pending);
        let handle = OperationHandle {
            seq: descriptor.correlation(),
            phase: rx,
        };
        let op = Self {
            descriptor,
            block,
            group,
            acknowledged: false,
            interrupted: false,
            completed: false,
            completion: None,
            phase: tx,
        };
        (op, handle)
    }

    pub fn seq(&self) -> u64 {
        self.descriptor.correlation()
    }

    pub fn opcode(&self) -> i64 {
        self.descriptor.opcode()
    }

    pub fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    pub fn block(&self) -> BlockMode {
        self.block
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// The completion envelope, once completed.
    pub fn completion(&self) -> Option<&Envelope> {
        self.completion.as_ref()
    }

    /// Take the completion envelope out of the entry.
    pub fn take_completion(&mut self) -> Option<Envelope> {
        self.completion.take()
    }

    pub fn acknowledge(&mut self) {
        self.acknowledged = true;
        self.publish(OperationPhase::Acknowledged);
    }

    pub fn reject(&mut self, status: Option<i64>) {
        self.publish(OperationPhase::Rejected { status });
    }

    pub fn complete(&mut self, envelope: Envelope) {
        self.completed = true;
        self.completion = Some(envelope);
        self.publish(OperationPhase::Completed);
    }

    pub fn fail(&mut self, result: Option<i64>) {
        self.completed = true;
        self.publish(OperationPhase::Failed { result });
    }

    pub fn interrupt(&mut self, by: u64) {
        self.interrupted = true;
        self.publish(OperationPhase::Interrupted { by });
    }

    fn publish(&self, phase: OperationPhase) {
        // No receivers left just means the submitter stopped waiting.
        self.phase.send_replace(phase);
    }
}

// =============================================================================
// LiveOperationTable
// =============================================================================

/// Insertion-ordered registry of in-flight operations plus reserved groups.
#[derive(Debug, Default)]
pub struct LiveOperationTable {
    entries: Vec<SubmittedOperation>,
    reserved: HashSet<String>,
}

impl LiveOperationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the end; an AUTO operation reserves its group.
    pub fn register(&mut self, op: SubmittedOperation) -> LinkResult<()> {
        if self.contains(op.seq()) {
            return Err(LinkError::DuplicateCorrelation(op.seq()));
        }
        if op.block == BlockMode::Auto {
            if let Some(group) = &op.group {
                self.reserved.insert(group.clone());
            }
        }
        self.entries.push(op);
        Ok(())
    }

    /// Remove an entry. NEVER and ALL entries leave the reserved set alone;
    /// an AUTO entry releases its group unless another AUTO entry for the same
    /// group is still live.
    pub fn unregister(&mut self, seq: u64) -> Option<SubmittedOperation> {
        let index = self.entries.iter().position(|op| op.seq() == seq)?;
        let op = self.entries.remove(index);
        if op.block == BlockMode::Auto {
            if let Some(group) = op.group.as_deref() {
                let still_held = self
                    .entries
                    .iter()
                    .any(|other| other.block == BlockMode::Auto && other.group() == Some(group));
                if !still_held {
                    self.reserved.remove(group);
                }
            }
        }
        Some(op)
    }

    pub fn is_group_reserved(&self, group: &str) -> bool {
        self.reserved.contains(group)
    }

    pub fn reserved_groups(&self) -> impl Iterator<Item = &str> {
        self.reserved.iter().map(String::as_str)
    }

    pub fn contains(&self, seq: u64) -> bool {
        self.entries.iter().any(|op| op.seq() == seq)
    }

    pub fn get(&self, seq: u64) -> Option<&SubmittedOperation> {
        self.entries.iter().find(|op| op.seq() == seq)
    }

    pub fn get_mut(&mut self, seq: u64) -> Option<&mut SubmittedOperation> {
        self.entries.iter_mut().find(|op| op.seq() == seq)
    }

    /// Entries in submission order.
    pub fn iter(&self) -> impl Iterator<Item = &SubmittedOperation> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Interruption sweep for the operation `seq` in `group`.
    ///
    /// Removes the first entry, in submission order, that has a smaller
    /// correlation number and the same group, and marks it interrupted. At
    /// most one entry is removed per call. Returns the removed entry's
    /// correlation number.
    pub fn supersede_predecessor(&mut self, seq: u64, group: &str) -> Option<u64> {
        let stale = self
            .entries
            .iter()
            .find(|op| op.seq() < seq && op.group() == Some(group))
            .map(SubmittedOperation::seq)?;
        let mut op = self.unregister(stale)?;
        op.interrupt(seq);
        Some(stale)
    }

    /// Remove every entry and reservation.
    pub fn drain(&mut self) -> Vec<SubmittedOperation> {
        self.reserved.clear();
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(seq: u64, block: BlockMode, group: Option<&str>) -> (SubmittedOperation, OperationHandle) {
        SubmittedOperation::new(
            OperationDescriptor::with_correlation(1101, seq),
            block,
            group.map(str::to_string),
        )
    }

    #[test]
    fn test_block_mode_parsing() {
        assert_eq!("AUTO".parse::<BlockMode>().unwrap(), BlockMode::Auto);
        assert_eq!("never".parse::<BlockMode>().unwrap(), BlockMode::Never);
        assert!("sometimes".parse::<BlockMode>().is_err());
    }

    #[test]
    fn test_register_preserves_submission_order() {
        let mut table = LiveOperationTable::new();
        for seq in [1003, 1001, 1002] {
            table.register(op(seq, BlockMode::Never, None).0).unwrap();
        }
        let order: Vec<u64> = table.iter().map(SubmittedOperation::seq).collect();
        assert_eq!(order, vec![1003, 1001, 1002]);
    }

    #[test]
    fn test_duplicate_correlation_rejected() {
        let mut table = LiveOperationTable::new();
        table.register(op(1001, BlockMode::Never, None).0).unwrap();
        assert!(matches!(
            table.register(op(1001, BlockMode::All, None).0),
            Err(LinkError::DuplicateCorrelation(1001))
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_only_auto_reserves_group() {
        let mut table = LiveOperationTable::new();
        table.register(op(1001, BlockMode::Never, Some("wheel")).0).unwrap();
        table.register(op(1002, BlockMode::All, Some("wheel")).0).unwrap();
        assert!(!table.is_group_reserved("wheel"));

        table.register(op(1003, BlockMode::Auto, Some("wheel")).0).unwrap();
        assert!(table.is_group_reserved("wheel"));

        // Removing NEVER/ALL entries leaves the reservation in place
        table.unregister(1001);
        table.unregister(1002);
        assert!(table.is_group_reserved("wheel"));

        table.unregister(1003);
        assert!(!table.is_group_reserved("wheel"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_reservation_held_while_another_auto_entry_lives() {
        let mut table = LiveOperationTable::new();
        table.register(op(1001, BlockMode::Auto, Some("arm")).0).unwrap();
        table.register(op(1002, BlockMode::Auto, Some("arm")).0).unwrap();

        table.unregister(1001);
        assert!(table.is_group_reserved("arm"));
        table.unregister(1002);
        assert!(!table.is_group_reserved("arm"));
    }

    #[test]
    fn test_supersede_removes_single_oldest_predecessor() {
        let mut table = LiveOperationTable::new();
        let (a, handle_a) = op(1001, BlockMode::Never, Some("head"));
        let (b, handle_b) = op(1002, BlockMode::Never, Some("head"));
        table.register(a).unwrap();
        table.register(op(1003, BlockMode::Never, Some("arm")).0).unwrap();
        table.register(b).unwrap();
        table.register(op(1004, BlockMode::Never, Some("head")).0).unwrap();

        assert_eq!(table.supersede_predecessor(1004, "head"), Some(1001));
        assert_eq!(handle_a.phase(), OperationPhase::Interrupted { by: 1004 });
        assert_eq!(handle_b.phase(), OperationPhase::Pending);

        let remaining: Vec<u64> = table.iter().map(SubmittedOperation::seq).collect();
        assert_eq!(remaining, vec![1003, 1002, 1004]);
    }

    #[test]
    fn test_supersede_ignores_newer_and_other_groups() {
        let mut table = LiveOperationTable::new();
        table.register(op(1005, BlockMode::Auto, Some("paw")).0).unwrap();
        table.register(op(1001, BlockMode::Auto, Some("arm")).0).unwrap();
        assert_eq!(table.supersede_predecessor(1003, "paw"), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_completion_flags() {
        let (mut entry, handle) = op(1001, BlockMode::All, None);
        entry.acknowledge();
        assert!(entry.is_acknowledged());
        assert_eq!(handle.phase(), OperationPhase::Acknowledged);

        entry.complete(Envelope::completion_ack(1001));
        assert!(entry.is_completed());
        assert!(entry.completion().is_some());
        assert!(entry.take_completion().is_some());
        assert!(entry.take_completion().is_none());
    }

    #[tokio::test]
    async fn test_handle_wakes_on_removal() {
        let mut table = LiveOperationTable::new();
        let (entry, mut handle) = op(1001, BlockMode::Never, None);
        table.register(entry).unwrap();

        let waiter = tokio::spawn(async move {
            handle
                .wait_until(|phase| *phase != OperationPhase::Pending)
                .await
        });
        tokio::task::yield_now().await;
        drop(table.unregister(1001));

        assert_eq!(waiter.await.unwrap(), None);
    }
}
