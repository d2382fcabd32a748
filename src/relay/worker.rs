//! The single consumer of the delivery queue.
//!
//! One [`RelayWorker`] runs per process. Each [`step`](RelayWorker::step)
//! takes the head of the queue through `Idle → Capturing → Delivering`:
//!
//! | Situation                               | Result                           |
//! |-----------------------------------------|----------------------------------|
//! | queue empty                             | [`StepOutcome::Empty`]           |
//! | capture timed out                       | item discarded, `TimedOut`       |
//! | empty reply                             | item discarded, `Skipped`        |
//! | reply delivered                         | item discarded, `Delivered`      |
//! | delivery failed                         | item to tail, `Requeued`         |
//! | delivery failed, retry budget spent     | item discarded, `Dropped`        |
//! | operator input closed before a reply    | item back to head, `InputClosed` |
//!
//! Items that failed delivery keep their composed reply, so a retry goes
//! straight to `Delivering` without prompting the operator again. Once
//! operator input has closed, [`run`](RelayWorker::run) still makes one
//! more attempt at each of those before it stops.
//!
//! The item a step is working on is held as in-flight until the step
//! finishes. When shutdown interrupts a step, that item goes back to the
//! head of the queue (with its reply, if one was composed) instead of being
//! lost.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{capture_response, CaptureOutcome};
use crate::input::InputUnits;
use crate::models::event::QueuedItem;
use crate::relay::console::OperatorConsole;
use crate::relay::queue::DeliveryQueue;
use crate::relay::retry::RetryPolicy;
use crate::relay::ReplySink;

/// Timing and retry knobs for the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Inactivity window for a single reply.
    pub deadline: Duration,
    /// Pause between iterations.
    pub pacing: Duration,
    /// What to do after a failed delivery.
    pub retry: RetryPolicy,
}

/// Where the worker currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for work.
    Idle,
    /// Waiting for the operator to finish a reply.
    Capturing,
    /// Handing a reply to the sink.
    Delivering,
}

/// What a single worker step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing was queued.
    Empty,
    /// The reply was accepted by the sink.
    Delivered {
        /// Event that was answered.
        event_id: String,
    },
    /// The operator submitted an empty reply.
    Skipped {
        /// Event that was skipped.
        event_id: String,
    },
    /// The operator stayed idle past the deadline.
    TimedOut {
        /// Event that went unanswered.
        event_id: String,
    },
    /// Delivery failed; the item is back at the tail.
    Requeued {
        /// Event whose reply failed.
        event_id: String,
        /// Failed attempts so far.
        attempts: u32,
    },
    /// Delivery failed and the retry budget is spent.
    Dropped {
        /// Event whose reply was abandoned.
        event_id: String,
        /// Failed attempts in total.
        attempts: u32,
    },
    /// Operator input has ended; no more replies can be captured.
    InputClosed,
}

/// Single consumer that pairs queued events with operator replies.
pub struct RelayWorker {
    queue: DeliveryQueue,
    input: InputUnits,
    sink: Arc<dyn ReplySink>,
    console: OperatorConsole,
    settings: WorkerSettings,
    state: WorkerState,
    in_flight: Option<QueuedItem>,
}

impl RelayWorker {
    /// Build a worker around its injected collaborators.
    #[must_use]
    pub fn new(
        queue: DeliveryQueue,
        input: InputUnits,
        sink: Arc<dyn ReplySink>,
        console: OperatorConsole,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            input,
            sink,
            console,
            settings,
            state: WorkerState::Idle,
            in_flight: None,
        }
    }

    /// Current position in the cycle.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Handle to the queue this worker drains.
    #[must_use]
    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    /// Process at most one queued item without any pacing pause.
    ///
    /// If this future is dropped before it completes, the item it took is
    /// still held by the worker; [`run`](Self::run) returns it to the queue.
    pub async fn step(&mut self) -> StepOutcome {
        let outcome = self.advance().await;
        self.in_flight = None;
        outcome
    }

    /// Make one more delivery attempt for the first queued item that
    /// already carries a composed reply, without touching operator input.
    ///
    /// Returns `None` when no such item is queued.
    pub async fn retry_composed(&mut self) -> Option<StepOutcome> {
        let mut item = self.queue.dequeue_with_reply()?;
        let reply = item.pending_reply.take().unwrap_or_default();
        self.console.retrying(&item);
        let outcome = self.deliver(item, reply).await;
        self.in_flight = None;
        Some(outcome)
    }

    /// Pause to observe after `outcome` before the next step.
    #[must_use]
    pub fn pause_after(&self, outcome: &StepOutcome) -> Duration {
        match outcome {
            StepOutcome::Requeued { attempts, .. } => self
                .settings
                .retry
                .delay_after(*attempts, self.settings.pacing),
            _ => self.settings.pacing,
        }
    }

    /// Run until `cancel` fires or operator input ends.
    ///
    /// After input ends, items that already carry a composed reply get one
    /// more delivery attempt before the worker stops.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            deadline_secs = self.settings.deadline.as_secs(),
            pacing_ms = u64::try_from(self.settings.pacing.as_millis()).unwrap_or(u64::MAX),
            "relay worker started"
        );

        loop {
            let outcome = tokio::select! {
                () = cancel.cancelled() => None,
                outcome = self.step() => Some(outcome),
            };
            let Some(outcome) = outcome else {
                self.return_in_flight();
                break;
            };

            if outcome == StepOutcome::InputClosed {
                info!(pending = self.queue.len(), "operator input closed; worker stopping");
                self.flush_composed(&cancel).await;
                break;
            }

            if !pause_unless_cancelled(self.pause_after(&outcome), &cancel).await {
                break;
            }
        }

        debug!("relay worker exited");
    }

    async fn flush_composed(&mut self, cancel: &CancellationToken) {
        let rounds = self.queue.count_with_reply();
        if rounds > 0 {
            info!(rounds, "retrying composed replies before stopping");
        }

        for _ in 0..rounds {
            let attempt = tokio::select! {
                () = cancel.cancelled() => None,
                outcome = self.retry_composed() => Some(outcome),
            };
            let Some(attempt) = attempt else {
                self.return_in_flight();
                return;
            };
            let Some(outcome) = attempt else {
                return;
            };
            if !pause_unless_cancelled(self.pause_after(&outcome), cancel).await {
                return;
            }
        }
    }

    fn return_in_flight(&mut self) {
        self.state = WorkerState::Idle;
        if let Some(item) = self.in_flight.take() {
            info!(
                event_id = %item.event.id,
                has_reply = item.pending_reply.is_some(),
                "shutdown interrupted item; returned to queue head"
            );
            self.queue.restore(item);
        }
    }

    async fn advance(&mut self) -> StepOutcome {
        let Some(mut item) = self.queue.dequeue() else {
            self.state = WorkerState::Idle;
            return StepOutcome::Empty;
        };
        self.in_flight = Some(item.clone());

        let pending = item.pending_reply.take();
        let reply = if let Some(reply) = pending {
            self.console.retrying(&item);
            reply
        } else {
            match self.capture_reply(item).await {
                Ok((captured, reply)) => {
                    item = captured;
                    reply
                }
                Err(outcome) => {
                    self.state = WorkerState::Idle;
                    return outcome;
                }
            }
        };

        self.deliver(item, reply).await
    }

    async fn deliver(&mut self, item: QueuedItem, reply: String) -> StepOutcome {
        self.state = WorkerState::Delivering;
        let mut held = item.clone();
        held.pending_reply = Some(reply.clone());
        self.in_flight = Some(held);

        let result = self
            .sink
            .send_reply(&item.event.channel, &reply, &item.event)
            .await;
        self.state = WorkerState::Idle;

        match result {
            Ok(()) => {
                info!(
                    event_id = %item.event.id,
                    channel = %item.event.channel,
                    attempts = item.attempts + 1,
                    "reply delivered"
                );
                self.console.sent();
                StepOutcome::Delivered {
                    event_id: item.event.id,
                }
            }
            Err(err) => self.handle_failure(item, reply, &err.to_string()),
        }
    }

    /// Prompt the operator and wait for a reply to `item`.
    ///
    /// Returns the item and the normalized reply, or the terminal outcome
    /// when there is nothing to deliver.
    async fn capture_reply(
        &mut self,
        item: QueuedItem,
    ) -> std::result::Result<(QueuedItem, String), StepOutcome> {
        if self.input.is_closed() {
            return Err(self.input_closed(item));
        }

        self.state = WorkerState::Capturing;
        self.console.show_event(&item.event);
        let capture = capture_response(&mut self.input, self.settings.deadline).await;

        if capture.outcome == CaptureOutcome::TimedOut {
            info!(
                event_id = %item.event.id,
                partial_chars = capture.text.chars().count(),
                "no reply before deadline; event discarded"
            );
            self.console.timed_out();
            return Err(StepOutcome::TimedOut {
                event_id: item.event.id,
            });
        }

        let reply = normalize_reply(&capture.text);
        if reply.is_empty() {
            if self.input.is_closed() {
                return Err(self.input_closed(item));
            }
            info!(event_id = %item.event.id, "operator skipped event");
            self.console.skipped();
            return Err(StepOutcome::Skipped {
                event_id: item.event.id,
            });
        }

        Ok((item, reply))
    }

    fn input_closed(&mut self, item: QueuedItem) -> StepOutcome {
        self.queue.restore(item);
        self.console.input_closed(self.queue.len());
        StepOutcome::InputClosed
    }

    fn handle_failure(&mut self, mut item: QueuedItem, reply: String, err: &str) -> StepOutcome {
        item.record_failure(reply);
        let attempts = item.attempts;
        let event_id = item.event.id.clone();

        if self.settings.retry.is_exhausted(attempts) {
            warn!(event_id, attempts, error = err, "delivery failed; retry budget spent, dropping");
            self.console.dropped(attempts);
            return StepOutcome::Dropped { event_id, attempts };
        }

        warn!(event_id, attempts, error = err, "delivery failed; requeued at tail");
        self.queue.requeue(item);
        self.console.requeued(attempts);
        StepOutcome::Requeued { event_id, attempts }
    }
}

/// Sleep for `pause`; `false` when `cancel` fired first.
async fn pause_unless_cancelled(pause: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = sleep(pause) => true,
    }
}

/// Strip the line terminator; whitespace-only replies become empty.
fn normalize_reply(text: &str) -> String {
    let trimmed = text.trim_end_matches(|ch| ch == '\r' || ch == '\n');
    if trimmed.trim().is_empty() {
        String::new()
    } else {
        trimmed.to_owned()
    }
}
