//! Byte-to-unit decoder for the operator input stream.
//!
//! [`InputCodec`] turns raw terminal bytes into [`InputUnit`]s at the
//! configured [`InputGranularity`]. It never drops input: malformed UTF-8
//! becomes U+FFFD and whatever is buffered at end-of-input is flushed.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::input::{InputGranularity, InputUnit};
use crate::{AppError, Result};

/// Longest line emitted as a single unit: 64 KiB.
///
/// Longer runs without a newline are split into several
/// non-terminating [`InputUnit::Line`]s.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Decoder producing one [`InputUnit`] per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputCodec {
    granularity: InputGranularity,
}

impl InputCodec {
    /// Create a codec for the given granularity.
    #[must_use]
    pub fn new(granularity: InputGranularity) -> Self {
        Self { granularity }
    }
}

impl Decoder for InputCodec {
    type Item = InputUnit;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        Ok(match self.granularity {
            InputGranularity::Keystroke => decode_char(src, false).map(InputUnit::Keystroke),
            InputGranularity::Line => decode_line(src).map(InputUnit::Line),
        })
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        Ok(match self.granularity {
            InputGranularity::Keystroke => decode_char(src, true).map(InputUnit::Keystroke),
            InputGranularity::Line => match decode_line(src) {
                Some(line) => Some(InputUnit::Line(line)),
                None => {
                    let rest = src.len();
                    take_lossy(src, rest).map(InputUnit::Line)
                }
            },
        })
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Decode one UTF-8 character from the front of `src`.
fn decode_char(src: &mut BytesMut, eof: bool) -> Option<char> {
    let first = *src.first()?;
    let width = match first {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => {
            src.advance(1);
            return Some(char::REPLACEMENT_CHARACTER);
        }
    };

    if src.len() < width {
        if eof {
            src.clear();
            return Some(char::REPLACEMENT_CHARACTER);
        }
        return None;
    }

    if let Some(ch) = std::str::from_utf8(&src[..width])
        .ok()
        .and_then(|s| s.chars().next())
    {
        src.advance(width);
        Some(ch)
    } else {
        // Only the lead byte is bad; the rest may start a valid sequence.
        src.advance(1);
        Some(char::REPLACEMENT_CHARACTER)
    }
}

/// Decode one newline-terminated line, or a [`MAX_LINE_BYTES`] piece of an
/// overlong one.
fn decode_line(src: &mut BytesMut) -> Option<String> {
    if let Some(pos) = src.iter().position(|b| *b == b'\n') {
        return take_lossy(src, pos + 1);
    }
    if src.len() >= MAX_LINE_BYTES {
        return take_lossy(src, char_boundary_before(src, MAX_LINE_BYTES));
    }
    None
}

/// Back off from `at` so the split does not land inside a UTF-8 sequence.
fn char_boundary_before(src: &[u8], at: usize) -> usize {
    let floor = at.saturating_sub(3);
    let mut cut = at;
    while cut > floor && src.get(cut).copied().is_some_and(is_continuation) {
        cut -= 1;
    }
    cut
}

fn is_continuation(byte: u8) -> bool {
    byte & 0b1100_0000 == 0b1000_0000
}

fn take_lossy(src: &mut BytesMut, len: usize) -> Option<String> {
    if len == 0 {
        return None;
    }
    let bytes = src.split_to(len);
    Some(String::from_utf8_lossy(&bytes).into_owned())
}
