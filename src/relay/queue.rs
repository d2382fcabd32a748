//! In-memory FIFO of events awaiting an operator reply.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::event::QueuedItem;

/// Shared FIFO of [`QueuedItem`]s.
///
/// Cloning yields another handle to the same queue. The lock is held only
/// for the list mutation itself, never across an await point. Enqueue and
/// dequeue are O(1); the pending-reply scans are linear.
#[derive(Debug, Clone, Default)]
pub struct DeliveryQueue {
    items: Arc<Mutex<VecDeque<QueuedItem>>>,
}

impl DeliveryQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item to the tail.
    pub fn enqueue(&self, item: QueuedItem) {
        self.lock().push_back(item);
    }

    /// Remove and return the head, or `None` when empty.
    #[must_use]
    pub fn dequeue(&self) -> Option<QueuedItem> {
        self.lock().pop_front()
    }

    /// Put a failed item back behind everything currently pending.
    pub fn requeue(&self, item: QueuedItem) {
        self.enqueue(item);
    }

    /// Return an unanswered item to the head, ahead of everything pending.
    pub fn restore(&self, item: QueuedItem) {
        self.lock().push_front(item);
    }

    /// Remove and return the first item that already carries a composed
    /// reply, keeping the order of everything else.
    #[must_use]
    pub fn dequeue_with_reply(&self) -> Option<QueuedItem> {
        let mut items = self.lock();
        let pos = items.iter().position(|item| item.pending_reply.is_some())?;
        items.remove(pos)
    }

    /// Number of pending items that already carry a composed reply.
    #[must_use]
    pub fn count_with_reply(&self) -> usize {
        self.lock()
            .iter()
            .filter(|item| item.pending_reply.is_some())
            .count()
    }

    /// Number of pending items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no items are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Identifiers of pending items, head first.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<String> {
        self.lock().iter().map(|item| item.id().to_owned()).collect()
    }

    // A panic while holding the lock cannot leave the deque half-mutated,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<QueuedItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
