//! Entry point for events pushed in by the network layer.

use tracing::debug;

use crate::models::event::{InboundEvent, QueuedItem};
use crate::relay::queue::DeliveryQueue;

/// Cheap, cloneable handle that admits inbound events to the queue.
///
/// Safe to call from any task or thread; it only takes the queue lock and
/// never performs I/O.
#[derive(Debug, Clone)]
pub struct EventIngress {
    queue: DeliveryQueue,
}

impl EventIngress {
    /// Create an ingress feeding `queue`.
    #[must_use]
    pub fn new(queue: DeliveryQueue) -> Self {
        Self { queue }
    }

    /// Admit an event to the tail of the queue.
    pub fn on_event(&self, event: InboundEvent) {
        let event_id = event.id.clone();
        self.queue.enqueue(QueuedItem::new(event));
        debug!(event_id, queue_len = self.queue.len(), "inbound event queued");
    }

    /// The queue this ingress feeds.
    #[must_use]
    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }
}
