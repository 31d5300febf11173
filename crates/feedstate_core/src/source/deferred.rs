//! Handler for subscriptions synced with a remote service.
//!
//! Accepting a change means queueing it for upstream delivery. The host's sync
//! loop drains the queue, pushes the edits, and hands every acknowledged change
//! back to `ItemStateService::commit_deferred`, which runs the finalizer on
//! that later turn.

use super::{StateCommit, SubscriptionHandler};
use crate::model::item::{Item, ItemId};
use crate::service::item_state::StateResult;
use log::info;
use std::sync::{Mutex, PoisonError};

/// Default source kind for remote-synced subscriptions.
pub const REMOTE_SYNC_SOURCE: &str = "remote_sync";

/// Requested state bit and value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    Read(bool),
    Flag(bool),
}

/// A change accepted by a remote handler but not yet committed locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingStateChange {
    pub item_id: ItemId,
    pub change: StateChange,
}

/// Queues changes until the remote side acknowledges them.
#[derive(Debug)]
pub struct DeferredSyncHandler {
    source_kind: String,
    pending: Mutex<Vec<PendingStateChange>>,
}

impl Default for DeferredSyncHandler {
    fn default() -> Self {
        Self::new(REMOTE_SYNC_SOURCE)
    }
}

impl DeferredSyncHandler {
    pub fn new(source_kind: impl Into<String>) -> Self {
        Self {
            source_kind: source_kind.into(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Number of queued changes.
    pub fn pending_len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drains queued changes in acceptance order.
    pub fn take_pending(&self) -> Vec<PendingStateChange> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn enqueue(&self, item: &Item, change: StateChange) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        // A newer request for the same bit supersedes the queued one.
        pending.retain(|queued| {
            queued.item_id != item.id
                || std::mem::discriminant(&queued.change) != std::mem::discriminant(&change)
        });
        pending.push(PendingStateChange {
            item_id: item.id,
            change,
        });
        info!(
            "event=state_deferred module=source status=queued source={} item_id={} change={:?} queue_len={}",
            self.source_kind,
            item.id,
            change,
            pending.len()
        );
    }
}

impl SubscriptionHandler for DeferredSyncHandler {
    fn source_kind(&self) -> &str {
        &self.source_kind
    }

    fn accept_flag_change(
        &self,
        _commit: &mut dyn StateCommit,
        item: &mut Item,
        new_state: bool,
    ) -> StateResult<()> {
        self.enqueue(item, StateChange::Flag(new_state));
        Ok(())
    }

    fn accept_read_change(
        &self,
        _commit: &mut dyn StateCommit,
        item: &mut Item,
        new_state: bool,
    ) -> StateResult<()> {
        self.enqueue(item, StateChange::Read(new_state));
        Ok(())
    }
}
