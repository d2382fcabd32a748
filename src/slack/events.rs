//! Slack push event intake.
//!
//! Receives `message` events via Socket Mode, filters out everything the
//! operator should not answer, and hands the rest to the
//! [`EventIngress`]. Filtering happens on a plain [`IncomingMessage`] so the
//! rules do not depend on the Slack wire types.
//!
//! Dropped messages:
//!
//! - posted by this relay's own bot user (its replies echo back),
//! - posted by any bot when `ignore_bots` is set,
//! - carrying a subtype (edits, deletions, joins, topic changes),
//! - without an author, channel or visible text,
//! - from a channel outside the `channel_ids` allow-list.

use std::sync::Arc;

use slack_morphism::prelude::{
    SlackClient, SlackClientEventsUserState, SlackClientHyperHttpsConnector,
    SlackEventCallbackBody, SlackMessageEvent, SlackPushEventCallback,
};
use tracing::{debug, warn};

use crate::config::SlackConfig;
use crate::models::event::InboundEvent;
use crate::relay::ingress::EventIngress;

/// Which messages are relayed to the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    /// Allowed channels; empty allows all.
    pub channel_ids: Vec<String>,
    /// Drop messages posted by bots.
    pub ignore_bots: bool,
    /// User ID of the relay itself.
    pub self_user_id: Option<String>,
}

impl MessageFilter {
    /// Build a filter from the `[slack]` config section.
    #[must_use]
    pub fn from_config(config: &SlackConfig) -> Self {
        Self {
            channel_ids: config.channel_ids.clone(),
            ignore_bots: config.ignore_bots,
            self_user_id: None,
        }
    }

    /// Remember the relay's own user so its replies are never relayed.
    #[must_use]
    pub fn with_self_user(mut self, user_id: impl Into<String>) -> Self {
        self.self_user_id = Some(user_id.into());
        self
    }

    fn accepts_channel(&self, channel: &str) -> bool {
        self.channel_ids.is_empty() || self.channel_ids.iter().any(|id| id == channel)
    }
}

/// Platform-neutral view of a Slack `message` event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Channel the message was posted in.
    pub channel: Option<String>,
    /// Author user ID.
    pub user: Option<String>,
    /// Display name, when Slack provides one.
    pub username: Option<String>,
    /// Whether the message was posted by a bot.
    pub from_bot: bool,
    /// Whether the message carries a subtype.
    pub has_subtype: bool,
    /// Message text.
    pub text: Option<String>,
    /// Message timestamp (Slack's message ID).
    pub ts: String,
    /// Parent thread timestamp for threaded messages.
    pub thread_ts: Option<String>,
}

impl From<&SlackMessageEvent> for IncomingMessage {
    fn from(event: &SlackMessageEvent) -> Self {
        Self {
            channel: event.origin.channel.as_ref().map(|id| id.0.clone()),
            user: event.sender.user.as_ref().map(|id| id.0.clone()),
            username: event.sender.username.clone(),
            from_bot: event.sender.bot_id.is_some(),
            has_subtype: event.subtype.is_some(),
            text: event.content.as_ref().and_then(|content| content.text.clone()),
            ts: event.origin.ts.0.clone(),
            thread_ts: event.origin.thread_ts.as_ref().map(|ts| ts.0.clone()),
        }
    }
}

impl IncomingMessage {
    /// Convert into an [`InboundEvent`], or `None` if `filter` drops it.
    ///
    /// Replies thread under the original thread when the message is
    /// already threaded, otherwise under the message itself.
    #[must_use]
    pub fn into_inbound(self, filter: &MessageFilter) -> Option<InboundEvent> {
        if self.has_subtype {
            return None;
        }
        let user = self.user?;
        if filter.self_user_id.as_deref() == Some(user.as_str()) {
            return None;
        }
        if filter.ignore_bots && self.from_bot {
            return None;
        }
        let channel = self.channel?;
        if !filter.accepts_channel(&channel) {
            return None;
        }
        let text = self.text.filter(|text| !text.trim().is_empty())?;

        let reference = self.thread_ts.unwrap_or(self.ts);
        let event = InboundEvent::new(user, text, channel, reference);
        Some(match self.username {
            Some(name) if !name.is_empty() => event.with_author_name(name),
            _ => event,
        })
    }
}

/// Socket Mode user state shared with [`handle_push_event`].
#[derive(Debug, Clone)]
pub struct IngressState {
    /// Where accepted events go.
    pub ingress: EventIngress,
    /// Which events are accepted.
    pub filter: MessageFilter,
}

/// Handle push events delivered via Socket Mode.
///
/// # Errors
///
/// Never fails; unusable events are logged and dropped.
pub async fn handle_push_event(
    event: SlackPushEventCallback,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::UserCallbackResult<()> {
    let ingress_state: Option<Arc<IngressState>> = {
        let guard = state.read().await;
        guard.get_user_state::<Arc<IngressState>>().cloned()
    };
    let Some(ingress_state) = ingress_state else {
        warn!("ingress state not available; dropping push event");
        return Ok(());
    };

    match &event.event {
        SlackEventCallbackBody::Message(message) => {
            let incoming = IncomingMessage::from(message);
            let ts = incoming.ts.clone();
            match incoming.into_inbound(&ingress_state.filter) {
                Some(inbound) => ingress_state.ingress.on_event(inbound),
                None => debug!(ts, "message filtered out"),
            }
        }
        _ => debug!("non-message push event ignored"),
    }

    Ok(())
}
