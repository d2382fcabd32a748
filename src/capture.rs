//! Timed capture of a single operator reply.
//!
//! [`capture_response`] races the next [`InputUnit`](crate::input::InputUnit)
//! against an inactivity deadline. Every unit pushes the deadline back out,
//! so an operator who keeps typing is never cut off while one who walks away
//! mid-reply is.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::input::InputUnits;

/// Stand-in deadline for windows too long to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// How a capture session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A terminator was typed or input ended.
    Completed,
    /// The deadline elapsed with no terminator.
    TimedOut,
}

/// Result of one capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    /// Everything typed during the session, terminator included.
    ///
    /// On [`CaptureOutcome::TimedOut`] this is the abandoned partial reply.
    pub text: String,
    /// How the session ended.
    pub outcome: CaptureOutcome,
}

impl Capture {
    /// Whether the session produced a reply.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.outcome == CaptureOutcome::Completed
    }
}

/// Wait for a reply, giving up after `deadline` of inactivity.
///
/// Returns [`CaptureOutcome::Completed`] when a terminating unit arrives or
/// the input stream closes (whatever was buffered becomes the reply), and
/// [`CaptureOutcome::TimedOut`] when no unit arrives for `deadline`. A unit
/// that is ready at the same moment the deadline fires is always consumed
/// first. The timer belongs to this call and is dropped on return.
pub async fn capture_response(input: &mut InputUnits, deadline: Duration) -> Capture {
    let timer = sleep(deadline);
    tokio::pin!(timer);
    let mut text = String::new();

    loop {
        tokio::select! {
            biased;

            unit = input.recv() => {
                let Some(unit) = unit else {
                    debug!(chars = text.chars().count(), "capture: input closed");
                    return Capture { text, outcome: CaptureOutcome::Completed };
                };
                unit.append_to(&mut text);
                if unit.is_terminator() {
                    return Capture { text, outcome: CaptureOutcome::Completed };
                }
                timer.as_mut().reset(deadline_from_now(deadline));
            }

            () = &mut timer => {
                debug!(
                    chars = text.chars().count(),
                    deadline_secs = deadline.as_secs(),
                    "capture: deadline elapsed"
                );
                return Capture { text, outcome: CaptureOutcome::TimedOut };
            }
        }
    }
}

fn deadline_from_now(deadline: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(deadline).unwrap_or_else(|| now + FAR_FUTURE)
}
