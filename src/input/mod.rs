//! Operator input plumbing.
//!
//! A dedicated reader thread ([`reader::InputLineSource`]) owns the
//! interactive input stream and republishes decoded [`InputUnit`]s on an
//! unbounded channel. The single consumer holds the receiving end as
//! [`InputUnits`]. On a terminal the thread reads raw key events
//! ([`terminal`]); piped input goes through the byte codec ([`codec`]).

pub mod codec;
pub mod reader;
pub mod terminal;

use serde::Deserialize;
use tokio::sync::mpsc;

/// How finely the input stream is split into units.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputGranularity {
    /// One unit per character; every character resets the capture deadline.
    #[default]
    Keystroke,
    /// One unit per newline-terminated line.
    Line,
}

/// A decoded piece of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputUnit {
    /// A single character.
    Keystroke(char),
    /// A line, including its trailing `\n` when one was read.
    Line(String),
    /// Backspace: removes the last character typed.
    Erase,
}

impl InputUnit {
    /// Whether this unit completes a reply.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        match self {
            Self::Keystroke(ch) => *ch == '\n',
            Self::Line(line) => line.ends_with('\n'),
            Self::Erase => false,
        }
    }

    /// Apply the unit to `buffer`: append its text, or drop the last char
    /// for [`Erase`](Self::Erase).
    pub fn append_to(&self, buffer: &mut String) {
        match self {
            Self::Keystroke(ch) => buffer.push(*ch),
            Self::Line(line) => buffer.push_str(line),
            Self::Erase => {
                buffer.pop();
            }
        }
    }
}

/// Receiving end of the operator input channel.
///
/// Once the sender side is gone every further [`recv`](Self::recv) returns
/// `None` immediately and [`is_closed`](Self::is_closed) reports `true`.
#[derive(Debug)]
pub struct InputUnits {
    rx: mpsc::UnboundedReceiver<InputUnit>,
    closed: bool,
}

impl InputUnits {
    /// Create a connected sender/receiver pair.
    #[must_use]
    pub fn channel() -> (mpsc::UnboundedSender<InputUnit>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx, closed: false })
    }

    /// Wait for the next unit; `None` means no unit will ever arrive again.
    ///
    /// Cancel-safe: a unit is never lost when the future is dropped.
    pub async fn recv(&mut self) -> Option<InputUnit> {
        if self.closed {
            return None;
        }
        let unit = self.rx.recv().await;
        if unit.is_none() {
            self.closed = true;
        }
        unit
    }

    /// Whether end-of-input has been observed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
