//! Retry policy for failed deliveries.
//!
//! Failed items always go back to the tail of the queue. The policy only
//! decides how long the worker pauses afterwards and whether an item has
//! used up its attempts. The default never gives up and never grows the
//! pause.

use std::time::Duration;

use serde::Deserialize;

/// Shape of the pause after a failed delivery.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Always the pacing interval.
    #[default]
    Fixed,
    /// Pacing interval doubled per failed attempt, capped.
    Exponential,
}

/// When to retry a failed delivery and when to give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after which an item is dropped; `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Pause shape after a failure.
    pub backoff: BackoffKind,
    /// Upper bound for exponential pauses.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl RetryPolicy {
    /// Retry forever at the pacing interval.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_attempts: None,
            backoff: BackoffKind::Fixed,
            max_backoff: Duration::from_secs(60),
        }
    }

    /// Whether an item with `attempts` failures should be dropped.
    #[must_use]
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    /// Pause before the next item after the `attempts`-th failure.
    #[must_use]
    pub fn delay_after(&self, attempts: u32, pacing: Duration) -> Duration {
        match self.backoff {
            BackoffKind::Fixed => pacing,
            BackoffKind::Exponential => {
                let shift = attempts.saturating_sub(1).min(16);
                pacing
                    .saturating_mul(1_u32 << shift)
                    .min(self.max_backoff.max(pacing))
            }
        }
    }
}
