//! Shared link state.
//!
//! [`LinkState`] is the one piece of shared mutable state in the engine. It is
//! constructed explicitly and handed to both the ingestion loop and the
//! dispatcher through an `Arc`; there is no hidden global.
//!
//! - `table`: the [`LiveOperationTable`], behind a single `parking_lot` mutex
//!   that is never held across an `.await`.
//! - `released`: notified whenever a group reservation may have been released,
//!   so group-gate waiters re-check.
//! - `wire`: async lock serializing "transmit then register" against report
//!   processing, so an acknowledgment can never overtake its registration.
//! - `status`: link lifecycle published on a `watch` channel.

use crate::error::LinkError;
use crate::table::{LiveOperationTable, SubmittedOperation};
use crate::version::FirmwareVersion;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::{watch, Notify};

/// Lifecycle of the device link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// Connected, firmware version not yet verified.
    Pending,
    /// Firmware verified.
    Ready(FirmwareVersion),
    /// Firmware below the minimum; fatal.
    Incompatible { found: String, required: String },
    /// Inbound channel closed or engine shut down.
    Closed,
}

impl LinkStatus {
    /// The error a submission should fail with under this status, if any.
    pub fn as_error(&self) -> Option<LinkError> {
        match self {
            LinkStatus::Incompatible { found, required } => Some(LinkError::DeviceIncompatible {
                found: found.clone(),
                required: required.clone(),
            }),
            LinkStatus::Closed => Some(LinkError::Disconnected),
            LinkStatus::Pending | LinkStatus::Ready(_) => None,
        }
    }
}

/// State shared between the ingestion loop and every dispatcher.
#[derive(Debug)]
pub struct LinkState {
    table: Mutex<LiveOperationTable>,
    released: Notify,
    wire: tokio::sync::Mutex<()>,
    status: watch::Sender<LinkStatus>,
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkState {
    pub fn new() -> Self {
        let (status, _) = watch::channel(LinkStatus::Pending);
        Self {
            table: Mutex::new(LiveOperationTable::new()),
            released: Notify::new(),
            wire: tokio::sync::Mutex::new(()),
            status,
        }
    }

    /// Lock the table. Do not hold the guard across an `.await`.
    pub fn table(&self) -> MutexGuard<'_, LiveOperationTable> {
        self.table.lock()
    }

    /// Remove an entry and wake group-gate waiters.
    pub fn unregister(&self, seq: u64) -> Option<SubmittedOperation> {
        let removed = self.table.lock().unregister(seq);
        if removed.is_some() {
            self.released.notify_waiters();
        }
        removed
    }

    /// Wake group-gate waiters after a removal done through [`Self::table`].
    pub fn notify_released(&self) {
        self.released.notify_waiters();
    }

    pub(crate) fn released(&self) -> &Notify {
        &self.released
    }

    pub(crate) async fn lock_wire(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.wire.lock().await
    }

    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    pub(crate) fn set_status(&self, status: LinkStatus) {
        self.status.send_replace(status);
    }

    /// Mark the link unusable and drop every live entry, waking all waiters.
    pub(crate) fn abort(&self, status: LinkStatus) {
        self.set_status(status);
        let dropped = self.table.lock().drain();
        if !dropped.is_empty() {
            tracing::warn!(count = dropped.len(), "Dropped live operations on link abort");
        }
        drop(dropped);
        self.released.notify_waiters();
    }
}
