//! Raw-mode key input for an interactive terminal.
//!
//! A tty in canonical mode only releases input when Enter is pressed, which
//! would turn every keystroke reset into a line reset. With the terminal in
//! raw mode each key press arrives on its own as a `crossterm` key event.
//! Raw mode also turns off the terminal's own echo and output
//! post-processing, so [`forward_key_events`] echoes what the operator
//! types and [`CrlfWriter`] restores `\r\n` line endings on output.

use std::io::{self, ErrorKind, Write};

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::input::InputUnit;
use crate::{AppError, Result};

/// What a key press means for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    /// Forward a unit to the capture.
    Forward(InputUnit),
    /// Ctrl-C: the operator asked to shut down.
    Interrupt,
    /// Ctrl-D: no more input.
    EndOfInput,
    /// Nothing to forward (releases, arrows, function keys).
    Ignore,
}

/// Map one key event to the relay's view of it.
#[must_use]
pub fn key_action(key: &KeyEvent) -> KeyAction {
    if key.kind == KeyEventKind::Release {
        return KeyAction::Ignore;
    }

    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c' | 'C') => KeyAction::Interrupt,
            KeyCode::Char('d' | 'D') => KeyAction::EndOfInput,
            _ => KeyAction::Ignore,
        };
    }

    match key.code {
        KeyCode::Char(ch) => KeyAction::Forward(InputUnit::Keystroke(ch)),
        KeyCode::Enter => KeyAction::Forward(InputUnit::Keystroke('\n')),
        KeyCode::Tab => KeyAction::Forward(InputUnit::Keystroke('\t')),
        KeyCode::Backspace => KeyAction::Forward(InputUnit::Erase),
        _ => KeyAction::Ignore,
    }
}

/// Read key events until end-of-input, forwarding each typed unit.
///
/// `next_event` is `crossterm::event::read` in production. Every forwarded
/// unit is echoed to `echo` first. Ctrl-C cancels `interrupt` and ends the
/// loop; Ctrl-D, a failed read, or a dropped receiver end it quietly.
pub fn forward_key_events<E, W>(
    mut next_event: E,
    mut echo: W,
    tx: &UnboundedSender<InputUnit>,
    interrupt: &CancellationToken,
) where
    E: FnMut() -> io::Result<Event>,
    W: Write,
{
    loop {
        let event = match next_event() {
            Ok(event) => event,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!(%err, "terminal input: read failed, treating as end of input");
                return;
            }
        };
        let Event::Key(key) = event else {
            continue;
        };

        match key_action(&key) {
            KeyAction::Forward(unit) => {
                if let Err(err) = echo_unit(&mut echo, &unit) {
                    debug!(%err, "terminal input: echo failed");
                }
                if tx.send(unit).is_err() {
                    debug!("terminal input: consumer gone, stopping");
                    return;
                }
            }
            KeyAction::Interrupt => {
                debug!("terminal input: interrupt requested");
                interrupt.cancel();
                return;
            }
            KeyAction::EndOfInput => {
                debug!("terminal input: end of input");
                return;
            }
            KeyAction::Ignore => {}
        }
    }
}

fn echo_unit(out: &mut impl Write, unit: &InputUnit) -> io::Result<()> {
    match unit {
        InputUnit::Keystroke('\n') => out.write_all(b"\r\n")?,
        InputUnit::Keystroke(ch) => {
            let mut utf8 = [0_u8; 4];
            out.write_all(ch.encode_utf8(&mut utf8).as_bytes())?;
        }
        InputUnit::Line(line) => out.write_all(line.as_bytes())?,
        InputUnit::Erase => out.write_all(b"\x08 \x08")?,
    }
    out.flush()
}

/// Keeps the terminal in raw mode for as long as it is alive.
#[derive(Debug)]
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    /// Switch the controlling terminal into raw mode.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Input` if the terminal refuses the mode change.
    pub fn enable() -> Result<Self> {
        terminal::enable_raw_mode()
            .map_err(|err| AppError::Input(format!("failed to enable raw mode: {err}")))?;
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = terminal::disable_raw_mode() {
            warn!(%err, "failed to restore terminal mode");
        }
    }
}

/// Writer that expands `\n` into `\r\n` when `translate` is set.
///
/// Needed for anything written while the terminal is in raw mode, where a
/// bare `\n` moves down a row without returning to the first column.
#[derive(Debug)]
pub struct CrlfWriter<W> {
    inner: W,
    translate: bool,
}

impl<W: Write> CrlfWriter<W> {
    /// Wrap `inner`; with `translate` unset bytes pass through untouched.
    #[must_use]
    pub fn new(inner: W, translate: bool) -> Self {
        Self { inner, translate }
    }
}

impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.translate {
            return self.inner.write(buf);
        }

        for (idx, piece) in buf.split(|byte| *byte == b'\n').enumerate() {
            if idx > 0 {
                self.inner.write_all(b"\r\n")?;
            }
            self.inner.write_all(piece)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
