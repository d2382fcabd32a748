//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::input::InputGranularity;
use crate::relay::retry::{BackoffKind, RetryPolicy};
use crate::relay::worker::WorkerSettings;
use crate::{AppError, Result};

/// OS keychain service that holds the Slack tokens.
pub const KEYRING_SERVICE: &str = "operator-relay";

/// Longest accepted capture deadline: one day.
pub const MAX_DEADLINE_SECONDS: u64 = 86_400;

/// Nested Slack configuration for Socket Mode connectivity.
///
/// Tokens are loaded at runtime via OS keychain or environment variables,
/// never from the TOML config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SlackConfig {
    /// Channels whose messages are relayed; empty relays every channel
    /// the bot can see.
    #[serde(default)]
    pub channel_ids: Vec<String>,
    /// Drop messages posted by bots, including this relay's own replies.
    #[serde(default = "default_true")]
    pub ignore_bots: bool,
    /// App-level token used for Socket Mode (populated at runtime).
    #[serde(skip)]
    pub app_token: String,
    /// Bot user token used for posting replies (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            channel_ids: Vec::new(),
            ignore_bots: true,
            app_token: String::new(),
            bot_token: String::new(),
        }
    }
}

/// Reply capture settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CaptureConfig {
    /// Inactivity window before an unfinished reply is abandoned.
    #[serde(default = "default_deadline_seconds")]
    pub deadline_seconds: u64,
    /// Unit size the operator input is split into.
    #[serde(default)]
    pub granularity: InputGranularity,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            deadline_seconds: default_deadline_seconds(),
            granularity: InputGranularity::default(),
        }
    }
}

/// Worker loop pacing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Pause between worker iterations.
    #[serde(default = "default_pacing_millis")]
    pub pacing_millis: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pacing_millis: default_pacing_millis(),
        }
    }
}

/// Failed delivery handling.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Failed attempts before an item is dropped; 0 retries forever.
    #[serde(default)]
    pub max_attempts: u32,
    /// Pause shape after a failed delivery.
    #[serde(default)]
    pub backoff: BackoffKind,
    /// Cap for exponential pauses.
    #[serde(default = "default_max_backoff_seconds")]
    pub max_backoff_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            backoff: BackoffKind::default(),
            max_backoff_seconds: default_max_backoff_seconds(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_deadline_seconds() -> u64 {
    10
}

fn default_pacing_millis() -> u64 {
    500
}

fn default_max_backoff_seconds() -> u64 {
    60
}

/// Global configuration parsed from the TOML config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Slack connectivity settings.
    #[serde(default)]
    pub slack: SlackConfig,
    /// Reply capture settings.
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Worker loop pacing.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Failed delivery handling.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load Slack credentials from OS keychain with env-var fallback.
    ///
    /// Tries the [`KEYRING_SERVICE`] keyring service first, then falls
    /// back to `SLACK_APP_TOKEN` / `SLACK_BOT_TOKEN` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env vars provide
    /// the required tokens.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.slack.app_token = load_credential("slack_app_token", "SLACK_APP_TOKEN").await?;
        self.slack.bot_token = load_credential("slack_bot_token", "SLACK_BOT_TOKEN").await?;
        Ok(())
    }

    /// Override the capture deadline (e.g. from the command line).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `seconds` is zero or above
    /// [`MAX_DEADLINE_SECONDS`].
    pub fn set_deadline_seconds(&mut self, seconds: u64) -> Result<()> {
        self.capture.deadline_seconds = seconds;
        self.validate()
    }

    /// Inactivity window for a single reply.
    #[must_use]
    pub fn capture_deadline(&self) -> Duration {
        Duration::from_secs(self.capture.deadline_seconds)
    }

    /// Pause between worker iterations.
    #[must_use]
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.worker.pacing_millis)
    }

    /// Retry policy derived from the `[retry]` section.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: (self.retry.max_attempts > 0).then_some(self.retry.max_attempts),
            backoff: self.retry.backoff,
            max_backoff: Duration::from_secs(self.retry.max_backoff_seconds),
        }
    }

    /// Worker settings assembled from the capture, worker and retry sections.
    #[must_use]
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            deadline: self.capture_deadline(),
            pacing: self.pacing(),
            retry: self.retry_policy(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.capture.deadline_seconds == 0 {
            return Err(AppError::Config(
                "capture.deadline_seconds must be greater than zero".into(),
            ));
        }

        if self.capture.deadline_seconds > MAX_DEADLINE_SECONDS {
            return Err(AppError::Config(format!(
                "capture.deadline_seconds must be at most {MAX_DEADLINE_SECONDS}"
            )));
        }

        if self.worker.pacing_millis == 0 {
            return Err(AppError::Config(
                "worker.pacing_millis must be greater than zero".into(),
            ));
        }

        if self.slack.channel_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(AppError::Config(
                "slack.channel_ids must not contain empty entries".into(),
            ));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
