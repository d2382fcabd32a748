//! Slack Socket Mode client and reply poster.
//!
//! [`SlackService`] listens for push events over Socket Mode and feeds them
//! into the relay through [`events::handle_push_event`]. It also implements
//! [`ReplySink`], posting each operator reply as a threaded message. Unlike
//! a fire-and-forget sender it attempts each post exactly once and reports
//! the result, so retries stay under the worker's control.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use slack_morphism::prelude::{
    SlackApiChatPostMessageRequest, SlackApiToken, SlackApiTokenType, SlackApiTokenValue,
    SlackChannelId, SlackClient, SlackClientEventsListenerEnvironment,
    SlackClientHyperHttpsConnector, SlackClientSession, SlackClientSocketModeConfig,
    SlackClientSocketModeListener, SlackMessageContent, SlackSocketModeListenerCallbacks, SlackTs,
};
use slack_morphism::errors::SlackClientError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SlackConfig;
use crate::models::event::InboundEvent;
use crate::relay::ingress::EventIngress;
use crate::relay::ReplySink;
use crate::slack::events::{self, IngressState, MessageFilter};
use crate::{AppError, Result};

/// A reply to be posted via chat.postMessage.
#[derive(Debug, Clone)]
pub struct SlackReply {
    /// Channel to post into.
    pub channel: SlackChannelId,
    /// Reply text.
    pub text: String,
    /// Thread the reply attaches to.
    pub thread_ts: Option<SlackTs>,
}

impl SlackReply {
    /// Create a reply threaded under `reference`.
    #[must_use]
    pub fn threaded(channel: &str, text: &str, reference: &str) -> Self {
        Self {
            channel: SlackChannelId(channel.to_owned()),
            text: text.to_owned(),
            thread_ts: (!reference.is_empty()).then(|| SlackTs(reference.to_owned())),
        }
    }

    fn into_request(self) -> SlackApiChatPostMessageRequest {
        let content = SlackMessageContent {
            text: Some(self.text),
            markdown_text: None,
            blocks: None,
            attachments: None,
            upload: None,
            files: None,
            reactions: None,
            metadata: None,
        };

        SlackApiChatPostMessageRequest {
            channel: self.channel,
            content,
            as_user: None,
            icon_emoji: None,
            icon_url: None,
            link_names: Some(true),
            parse: None,
            thread_ts: self.thread_ts,
            username: None,
            reply_broadcast: None,
            unfurl_links: None,
            unfurl_media: None,
        }
    }
}

/// Slack Socket Mode wrapper that relays messages in and replies out.
pub struct SlackService {
    client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    bot_token: SlackApiToken,
}

/// Join handles for Slack background tasks.
pub struct SlackRuntime {
    /// Socket Mode listener task.
    pub socket_task: JoinHandle<()>,
}

impl SlackService {
    /// Start the Slack client and the Socket Mode listener.
    ///
    /// Accepted `message` events are passed to `ingress`. The bot's own user
    /// ID is looked up first so its replies are never relayed back.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the HTTPS connector cannot be created or
    /// the bot token is rejected.
    pub async fn start(config: &SlackConfig, ingress: EventIngress) -> Result<(Self, SlackRuntime)> {
        let connector = SlackClientHyperHttpsConnector::new()
            .map_err(|err| AppError::Slack(format!("failed to init slack connector: {err}")))?;
        let client = Arc::new(SlackClient::new(connector));
        let bot_token = SlackApiToken {
            token_value: SlackApiTokenValue(config.bot_token.clone()),
            cookie: None,
            team_id: None,
            scope: None,
            token_type: Some(SlackApiTokenType::Bot),
        };
        let app_token = SlackApiToken {
            token_value: SlackApiTokenValue(config.app_token.clone()),
            cookie: None,
            team_id: None,
            scope: None,
            token_type: Some(SlackApiTokenType::App),
        };

        let identity = client
            .open_session(&bot_token)
            .auth_test()
            .await
            .map_err(|err| AppError::Slack(format!("bot token rejected: {err}")))?;
        info!(user_id = %identity.user_id, "slack bot identity resolved");

        let state = Arc::new(IngressState {
            ingress,
            filter: MessageFilter::from_config(config).with_self_user(identity.user_id.0),
        });
        let socket_task = Self::spawn_socket_mode(&client, app_token, state);

        info!("slack service started with socket mode");

        Ok((Self { client, bot_token }, SlackRuntime { socket_task }))
    }

    fn spawn_socket_mode(
        client: &Arc<SlackClient<SlackClientHyperHttpsConnector>>,
        app_token: SlackApiToken,
        state: Arc<IngressState>,
    ) -> JoinHandle<()> {
        let listener_env = Arc::new(
            SlackClientEventsListenerEnvironment::new(Arc::clone(client))
                .with_error_handler(|err, _client, _state| {
                    error!(?err, "socket mode error");
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR
                })
                .with_user_state(state),
        );
        let callbacks = SlackSocketModeListenerCallbacks::new()
            .with_hello_events(|event, _client, _state| async move {
                debug!(?event, "socket hello");
            })
            .with_push_events(events::handle_push_event);
        let config = SlackClientSocketModeConfig {
            max_connections_count: SlackClientSocketModeConfig::DEFAULT_CONNECTIONS_COUNT,
            debug_connections: SlackClientSocketModeConfig::DEFAULT_DEBUG_CONNECTIONS,
            initial_backoff_in_seconds:
                SlackClientSocketModeConfig::DEFAULT_INITIAL_BACKOFF_IN_SECONDS,
            reconnect_timeout_in_seconds:
                SlackClientSocketModeConfig::DEFAULT_RECONNECT_TIMEOUT_IN_SECONDS,
            ping_interval_in_seconds: SlackClientSocketModeConfig::DEFAULT_PING_INTERVAL_IN_SECONDS,
            ping_failure_threshold_times:
                SlackClientSocketModeConfig::DEFAULT_PING_FAILURE_THRESHOLD_TIMES,
        };

        let listener = SlackClientSocketModeListener::new(&config, listener_env, callbacks);
        tokio::spawn(async move {
            if let Err(error) = listener.listen_for(&app_token).await {
                error!(?error, "socket mode listen failed");
                return;
            }

            listener.serve().await;
            info!("socket mode listener exited");
        })
    }

    /// Create an HTTP session for direct API calls using the bot token.
    #[must_use]
    pub fn http_session(&self) -> SlackClientSession<'_, SlackClientHyperHttpsConnector> {
        self.client.open_session(&self.bot_token)
    }

    /// Post a reply once.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the Slack API call fails, including
    /// rate limiting.
    pub async fn post_reply(&self, reply: SlackReply) -> Result<()> {
        let request = reply.into_request();
        self.http_session()
            .chat_post_message(&request)
            .await
            .map(|_| ())
            .map_err(|err| {
                if let SlackClientError::RateLimitError(rate) = &err {
                    warn!(retry_after = ?rate.retry_after, "slack post rate limited");
                }
                AppError::Slack(format!("failed to post reply: {err}"))
            })
    }
}

impl ReplySink for SlackService {
    fn send_reply<'a>(
        &'a self,
        channel: &'a str,
        text: &'a str,
        original: &'a InboundEvent,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.post_reply(SlackReply::threaded(channel, text, &original.reference)))
    }
}
