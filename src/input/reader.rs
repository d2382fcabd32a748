//! Background reader for the operator input stream.
//!
//! Blocking terminal reads live on a dedicated OS thread so they never tie
//! up the async runtime. The thread owns the stream for the process lifetime
//! and forwards every [`InputUnit`] through an unbounded channel, so a slow
//! consumer can never make it drop input.
//!
//! [`InputLineSource::spawn`] decodes any byte stream (piped stdin, files,
//! test fixtures). [`InputLineSource::spawn_terminal`] puts the terminal in
//! raw mode and forwards individual key presses.

use std::io::{ErrorKind, Read};
use std::thread::{self, JoinHandle};

use bytes::BytesMut;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::input::codec::InputCodec;
use crate::input::terminal::{self, RawModeGuard};
use crate::input::{InputGranularity, InputUnit, InputUnits};
use crate::{AppError, Result};

const READ_CHUNK_BYTES: usize = 4096;

/// Handle to the running input reader thread.
#[derive(Debug)]
pub struct InputLineSource {
    handle: JoinHandle<()>,
    raw_mode: Option<RawModeGuard>,
}

impl InputLineSource {
    /// Start reading `reader` on a dedicated thread.
    ///
    /// Returns the thread handle and the receiving end of the unit channel.
    /// The channel closes once the reader hits end-of-input.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Input` if the OS refuses to spawn the thread.
    pub fn spawn<R>(reader: R, granularity: InputGranularity) -> Result<(Self, InputUnits)>
    where
        R: Read + Send + 'static,
    {
        let (tx, units) = InputUnits::channel();
        let handle = thread::Builder::new()
            .name("operator-input".into())
            .spawn(move || read_loop(reader, InputCodec::new(granularity), &tx))
            .map_err(|err| AppError::Input(format!("failed to spawn input reader: {err}")))?;

        Ok((
            Self {
                handle,
                raw_mode: None,
            },
            units,
        ))
    }

    /// Read key presses from the controlling terminal in raw mode.
    ///
    /// Ctrl-C cancels `interrupt`, since raw mode stops the terminal from
    /// raising `SIGINT`. Ctrl-D ends the input. The terminal leaves raw mode
    /// when the returned source is dropped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Input` if raw mode cannot be enabled or the OS
    /// refuses to spawn the thread.
    pub fn spawn_terminal(interrupt: CancellationToken) -> Result<(Self, InputUnits)> {
        let raw_mode = RawModeGuard::enable()?;
        let (tx, units) = InputUnits::channel();
        let handle = thread::Builder::new()
            .name("operator-keys".into())
            .spawn(move || {
                terminal::forward_key_events(
                    crossterm::event::read,
                    std::io::stdout(),
                    &tx,
                    &interrupt,
                );
            })
            .map_err(|err| AppError::Input(format!("failed to spawn key reader: {err}")))?;
        info!("terminal input in raw mode; per-keystroke deadline resets active");

        Ok((
            Self {
                handle,
                raw_mode: Some(raw_mode),
            },
            units,
        ))
    }

    /// Whether the terminal is in raw mode for this source.
    #[must_use]
    pub fn is_raw(&self) -> bool {
        self.raw_mode.is_some()
    }

    /// Whether the reader has stopped (end-of-input or consumer gone).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Read until end-of-input, forwarding every decoded unit.
fn read_loop<R: Read>(mut reader: R, mut codec: InputCodec, tx: &UnboundedSender<InputUnit>) {
    let mut buffer = BytesMut::with_capacity(READ_CHUNK_BYTES);
    let mut chunk = [0_u8; READ_CHUNK_BYTES];

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => {
                buffer.extend_from_slice(&chunk[..read]);
                if !forward(&mut codec, &mut buffer, tx, false) {
                    debug!("input reader: consumer gone, stopping");
                    return;
                }
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => {
                warn!(%err, "input reader: read failed, treating as end of input");
                break;
            }
        }
    }

    forward(&mut codec, &mut buffer, tx, true);
    debug!("input reader: end of input");
}

/// Drain every complete unit out of `buffer`.
///
/// Returns `false` once the receiving side has been dropped.
fn forward(
    codec: &mut InputCodec,
    buffer: &mut BytesMut,
    tx: &UnboundedSender<InputUnit>,
    eof: bool,
) -> bool {
    loop {
        let decoded = if eof {
            codec.decode_eof(buffer)
        } else {
            codec.decode(buffer)
        };
        match decoded {
            Ok(Some(unit)) => {
                if tx.send(unit).is_err() {
                    return false;
                }
            }
            Ok(None) => return true,
            Err(err) => {
                warn!(%err, "input reader: decode failed, discarding buffered bytes");
                buffer.clear();
                return true;
            }
        }
    }
}
