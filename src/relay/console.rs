//! Human-readable status output for the operator.
//!
//! This is not a protocol surface, but its cadence is: the event and a
//! `Reply: ` prompt are always shown before a capture starts, and exactly
//! one status line follows each outcome.

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use tracing::debug;

use crate::input::terminal::CrlfWriter;
use crate::models::event::{InboundEvent, QueuedItem};

/// Writer for operator-facing status lines.
pub struct OperatorConsole {
    out: Box<dyn Write + Send>,
}

impl fmt::Debug for OperatorConsole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorConsole").finish_non_exhaustive()
    }
}

impl OperatorConsole {
    /// Write status output to `out`.
    #[must_use]
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self { out: Box::new(out) }
    }

    /// Write status output to the process stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Write status output to stdout while the terminal is in raw mode,
    /// expanding line endings to `\r\n`.
    #[must_use]
    pub fn raw_terminal() -> Self {
        Self::new(CrlfWriter::new(io::stdout(), true))
    }

    /// Discard all status output.
    #[must_use]
    pub fn silent() -> Self {
        Self::new(io::sink())
    }

    /// Explain the inactivity window once at startup.
    pub fn banner(&mut self, deadline: Duration) {
        self.emit(format_args!(
            "When a new message pops up, you'll have {} seconds to reply. \
             The timer resets every time you type, so it won't cut you off \
             while you're still writing. Press enter when you're done; \
             press enter on an empty line to skip a message.\n\n",
            deadline.as_secs()
        ));
    }

    /// Show an event and prompt for a reply.
    pub fn show_event(&mut self, event: &InboundEvent) {
        self.emit(format_args!(
            "{} says: {}\nReply: ",
            event.author_name, event.text
        ));
    }

    /// Announce a retry of an already composed reply.
    pub fn retrying(&mut self, item: &QueuedItem) {
        self.emit(format_args!(
            "Retrying reply to {} (attempt {})\n",
            item.event.author_name,
            item.attempts.saturating_add(1)
        ));
    }

    /// The capture deadline elapsed.
    pub fn timed_out(&mut self) {
        self.emit(format_args!("\nNo response received - timed out\n\n"));
    }

    /// The operator submitted an empty reply.
    pub fn skipped(&mut self) {
        self.emit(format_args!("Skipped\n\n"));
    }

    /// The reply was delivered.
    pub fn sent(&mut self) {
        self.emit(format_args!("Message sent\n\n"));
    }

    /// The reply could not be delivered and will be retried.
    pub fn requeued(&mut self, attempts: u32) {
        self.emit(format_args!(
            "Message not sent (attempt {attempts}); it will be retried\n\n"
        ));
    }

    /// The reply could not be delivered and the retry budget is spent.
    pub fn dropped(&mut self, attempts: u32) {
        self.emit(format_args!(
            "Message not sent after {attempts} attempts; giving up\n\n"
        ));
    }

    /// Operator input ended; no further replies can be captured.
    pub fn input_closed(&mut self, pending: usize) {
        self.emit(format_args!(
            "\nInput closed; {pending} message(s) left unanswered\n"
        ));
    }

    fn emit(&mut self, args: fmt::Arguments<'_>) {
        if let Err(err) = self.out.write_fmt(args).and_then(|()| self.out.flush()) {
            debug!(%err, "operator console write failed");
        }
    }
}
