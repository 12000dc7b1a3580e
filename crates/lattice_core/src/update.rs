//! # Replication Update Hook
//!
//! The core never replicates state itself. When a transaction closes or an
//! undo/redo completes it asks an [`UpdateSink`] to schedule an update for
//! the touched part, and the networking layer drains the requests.
//!
//! ```text
//!   Scene ──> UpdateSink::schedule_full_update ──> [bounded queue] ──> replication thread
//! ```

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use lattice_shared::{GlobalId, LocalHandle};

/// How the replication layer should treat a scheduled update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    /// Send the full object state regardless of what changed.
    ForcedFull,
    /// Let the replication layer pick between terse and full.
    FindBest,
}

/// A single replication request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateRequest {
    /// Group the part belongs to.
    pub group: GlobalId,
    /// Handle of the part that changed.
    pub part: LocalHandle,
    /// Update flavour.
    pub kind: UpdateKind,
}

/// Receiver of "schedule full update" notifications.
pub trait UpdateSink: Send + Sync {
    /// Requests replication of one part.
    fn schedule_full_update(&self, group: GlobalId, part: LocalHandle, kind: UpdateKind);
}

/// Sink that drops every request. Useful for tools and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullUpdateSink;

impl UpdateSink for NullUpdateSink {
    fn schedule_full_update(&self, _group: GlobalId, _part: LocalHandle, _kind: UpdateKind) {}
}

/// Bounded, lock-free queue of replication requests.
///
/// Scheduling never blocks the caller: a full queue drops the request and
/// logs it, since the next change to the part schedules another one.
pub struct UpdateQueue {
    sender: Sender<UpdateRequest>,
    receiver: Receiver<UpdateRequest>,
}

impl UpdateQueue {
    /// Creates a queue holding at most `capacity` pending requests.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    /// Gets a receiver for the replication thread.
    #[must_use]
    pub fn receiver(&self) -> Receiver<UpdateRequest> {
        self.receiver.clone()
    }

    /// Drains every pending request without blocking.
    pub fn drain(&self) -> Vec<UpdateRequest> {
        self.receiver.try_iter().collect()
    }

    /// Number of pending requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl UpdateSink for UpdateQueue {
    fn schedule_full_update(&self, group: GlobalId, part: LocalHandle, kind: UpdateKind) {
        let request = UpdateRequest { group, part, kind };
        match self.sender.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(%group, %part, ?kind, "update queue full, dropping request");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!(%group, %part, "update queue disconnected");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_delivers_in_order() {
        let queue = UpdateQueue::new(8);
        let group = GlobalId::from_u128(1);
        queue.schedule_full_update(group, LocalHandle::new(1), UpdateKind::ForcedFull);
        queue.schedule_full_update(group, LocalHandle::new(2), UpdateKind::FindBest);

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].part, LocalHandle::new(1));
        assert_eq!(drained[1].kind, UpdateKind::FindBest);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let queue = UpdateQueue::new(1);
        let group = GlobalId::from_u128(1);
        queue.schedule_full_update(group, LocalHandle::new(1), UpdateKind::ForcedFull);
        queue.schedule_full_update(group, LocalHandle::new(2), UpdateKind::ForcedFull);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain()[0].part, LocalHandle::new(1));
    }
}
