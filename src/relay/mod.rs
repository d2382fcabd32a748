//! Operator relay core.
//!
//! Inbound events enter through [`ingress::EventIngress`], wait in the
//! [`queue::DeliveryQueue`], and are answered one at a time by the
//! [`worker::RelayWorker`], which hands each composed reply to a
//! [`ReplySink`].

pub mod console;
pub mod ingress;
pub mod queue;
pub mod retry;
pub mod worker;

use std::future::Future;
use std::pin::Pin;

use crate::models::event::InboundEvent;
use crate::Result;

/// Outbound side of the relay: posts a reply back to the chat network.
///
/// Implementations must report a reply that was not accepted as `Err`;
/// there is no partial success.
pub trait ReplySink: Send + Sync {
    /// Post `text` into `channel` as a reply to `original`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Slack`](crate::AppError::Slack) or
    /// [`AppError::Delivery`](crate::AppError::Delivery) if the network sink
    /// rejects or never receives the reply.
    fn send_reply<'a>(
        &'a self,
        channel: &'a str,
        text: &'a str,
        original: &'a InboundEvent,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
