//! Inbound chat event and its queue wrapper.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat message received from the network, awaiting an operator reply.
///
/// Immutable once created; the worker only ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundEvent {
    /// Unique record identifier (UUID v4 prefixed `event:`).
    pub id: String,
    /// Platform identifier of the message author.
    pub author_id: String,
    /// Name shown to the operator for the author.
    pub author_name: String,
    /// Message text as displayed to the operator.
    pub text: String,
    /// Channel or conversation the message arrived in.
    pub channel: String,
    /// Platform reference of the message a reply should attach to.
    pub reference: String,
    /// Time the event was received.
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    /// Construct a new event with a generated identifier.
    ///
    /// The author identifier doubles as the display name; use
    /// [`with_author_name`](Self::with_author_name) when the platform
    /// provides a friendlier one.
    #[must_use]
    pub fn new(author_id: String, text: String, channel: String, reference: String) -> Self {
        Self {
            id: format!("event:{}", Uuid::new_v4()),
            author_name: author_id.clone(),
            author_id,
            text,
            channel,
            reference,
            received_at: Utc::now(),
        }
    }

    /// Replace the display name shown to the operator.
    #[must_use]
    pub fn with_author_name(mut self, author_name: impl Into<String>) -> Self {
        self.author_name = author_name.into();
        self
    }
}

/// An [`InboundEvent`] admitted to the delivery queue.
///
/// Requeueing moves the same value to the tail, so identity and the
/// original enqueue time survive retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedItem {
    /// The event awaiting a reply.
    pub event: InboundEvent,
    /// Time the event was first admitted to the queue.
    pub enqueued_at: DateTime<Utc>,
    /// Number of failed delivery attempts so far.
    pub attempts: u32,
    /// Reply already composed by the operator but not yet delivered.
    pub pending_reply: Option<String>,
}

impl QueuedItem {
    /// Wrap a freshly received event.
    #[must_use]
    pub fn new(event: InboundEvent) -> Self {
        Self {
            event,
            enqueued_at: Utc::now(),
            attempts: 0,
            pending_reply: None,
        }
    }

    /// Identifier of the wrapped event.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.event.id
    }

    /// Record a failed delivery of `reply`, keeping the text for the retry.
    pub fn record_failure(&mut self, reply: String) {
        self.attempts = self.attempts.saturating_add(1);
        self.pending_reply = Some(reply);
    }
}
