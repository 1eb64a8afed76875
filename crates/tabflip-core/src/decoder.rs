#![forbid(unsafe_code)]

//! Raw input-byte decoder.
//!
//! Reconstructs one [`KeyEvent`] per call from an unstructured terminal byte
//! stream. Escape sequences are ambiguous under timing: a lone `ESC` is only
//! distinguishable from the start of a sequence by waiting, so every
//! continuation byte is fetched with a short bounded timeout and a timeout
//! degrades to the safest reading rather than blocking or failing.
//!
//! Recognized forms, in priority order:
//! - a lone tab byte → Tab press
//! - any non-`ESC` byte → literal key with that byte as code
//! - `ESC` with no `[` following within the timeout → bare Escape
//! - `ESC [ … final` with final byte in `0x40..=0x7E`, capped at 64 bytes:
//!   `Z` → shift-Tab, `I` → Tab, `~` with parameter `9` → Tab and `24` →
//!   the marker key, `u` → kitty keyboard protocol report
//!   (`key[:alt];mods[:event]`), anything else → bare Escape.
//!
//! The decoder never faults: malformed sequences come back as Escape, and a
//! `u` report whose payload does not parse yields `None`.

use std::time::Duration;

use crate::event::{KeyEvent, KeyEventKind, key};

/// How long to wait for each continuation byte of an escape sequence.
pub const CONTINUATION_TIMEOUT: Duration = Duration::from_millis(10);

/// Longest CSI sequence body the decoder will accumulate.
const MAX_SEQUENCE_LEN: usize = 64;

const ESC: u8 = 0x1b;

/// A source of raw input bytes with bounded waits.
///
/// `read_byte` returns `None` when no byte arrives within `timeout` or the
/// stream is exhausted. Implementations must hand out exactly one byte per
/// call so undecoded input stays queued for the next decode.
pub trait ByteSource {
    fn read_byte(&mut self, timeout: Duration) -> Option<u8>;
}

/// Pull-based key decoder.
#[derive(Debug, Clone)]
pub struct KeyDecoder {
    continuation_timeout: Duration,
}

impl Default for KeyDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyDecoder {
    /// Create a decoder with the default continuation timeout.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            continuation_timeout: CONTINUATION_TIMEOUT,
        }
    }

    /// Create a decoder with a custom continuation timeout.
    #[must_use]
    pub const fn with_timeout(continuation_timeout: Duration) -> Self {
        Self {
            continuation_timeout,
        }
    }

    /// Decode the next key event from `source`.
    ///
    /// Returns `None` when no byte is available or a structured report fails
    /// to parse; the caller simply tries again on the next readiness.
    pub fn decode<S: ByteSource>(&self, source: &mut S) -> Option<KeyEvent> {
        let first = source.read_byte(self.continuation_timeout)?;
        if first == b'\t' {
            return Some(KeyEvent::new(key::TAB));
        }
        if first != ESC {
            return Some(KeyEvent::new(u32::from(first)));
        }

        let Some(next) = source.read_byte(self.continuation_timeout) else {
            return Some(KeyEvent::new(key::ESCAPE));
        };
        if next != b'[' {
            tracing::trace!(byte = next, "non-CSI escape, degrading");
            return Some(KeyEvent::new(key::ESCAPE));
        }

        // Accumulate the sequence body up to a final byte or the cap. A
        // timeout mid-sequence falls through to the terminator checks with
        // whatever accumulated, which reads as a bare Escape below.
        let mut body: Vec<u8> = Vec::with_capacity(16);
        loop {
            let Some(byte) = source.read_byte(self.continuation_timeout) else {
                break;
            };
            body.push(byte);
            if (0x40..=0x7e).contains(&byte) {
                break;
            }
            if body.len() > MAX_SEQUENCE_LEN {
                break;
            }
        }

        match body.last() {
            Some(b'Z') => Some(KeyEvent::new(key::TAB).with_mods(2)),
            Some(b'I') => Some(KeyEvent::new(key::TAB)),
            Some(b'~') => {
                let params = core::str::from_utf8(&body[..body.len() - 1])
                    .unwrap_or("")
                    .trim();
                match params {
                    "9" => Some(KeyEvent::new(key::TAB)),
                    "24" => Some(KeyEvent::new(key::MARKER)),
                    _ => Some(KeyEvent::new(key::ESCAPE)),
                }
            }
            Some(b'u') => parse_key_report(&body[..body.len() - 1]),
            _ => Some(KeyEvent::new(key::ESCAPE)),
        }
    }
}

/// Parse the body of a kitty keyboard protocol report:
/// `key[:alternate] [; mods[:event-type]]`.
///
/// Missing fields default to `mods = 1` (no modifiers) and `event = 1`
/// (press). Returns `None` when the payload is empty or non-numeric.
fn parse_key_report(body: &[u8]) -> Option<KeyEvent> {
    let payload = core::str::from_utf8(body).ok()?;
    if payload.is_empty() {
        return None;
    }

    let mut fields = payload.split(';');
    let key_field = fields.next().unwrap_or("");
    let code_str = key_field.split(':').next().unwrap_or("");
    let code: u32 = if code_str.is_empty() {
        0
    } else {
        code_str.parse().ok()?
    };

    let mut mods = 1u32;
    let mut event = 1u32;
    if let Some(mod_field) = fields.next()
        && !mod_field.is_empty()
    {
        match mod_field.split_once(':') {
            Some((m, e)) => {
                mods = if m.is_empty() { 1 } else { m.parse().ok()? };
                event = if e.is_empty() { 1 } else { e.parse().ok()? };
            }
            None => mods = mod_field.parse().ok()?,
        }
    }

    Some(
        KeyEvent::new(code)
            .with_mods(mods)
            .with_kind(KeyEventKind::from_raw(event)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted byte source: serves queued bytes, then times out forever.
    pub(crate) struct Script {
        bytes: VecDeque<u8>,
    }

    impl Script {
        pub(crate) fn new(bytes: &[u8]) -> Self {
            Self {
                bytes: bytes.iter().copied().collect(),
            }
        }
    }

    impl ByteSource for Script {
        fn read_byte(&mut self, _timeout: Duration) -> Option<u8> {
            self.bytes.pop_front()
        }
    }

    fn decode(bytes: &[u8]) -> Option<KeyEvent> {
        KeyDecoder::new().decode(&mut Script::new(bytes))
    }

    #[test]
    fn lone_tab_byte() {
        let ev = decode(b"\t").unwrap();
        assert_eq!(ev.code, key::TAB);
        assert_eq!(ev.kind, KeyEventKind::Press);
    }

    #[test]
    fn literal_bytes() {
        assert_eq!(decode(b"q").unwrap().code, u32::from(b'q'));
        assert_eq!(decode(&[0x03]).unwrap().code, 3);
    }

    #[test]
    fn bare_escape_on_timeout() {
        let ev = decode(&[0x1b]).unwrap();
        assert_eq!(ev.code, key::ESCAPE);
    }

    #[test]
    fn escape_followed_by_non_bracket() {
        let ev = decode(b"\x1bO").unwrap();
        assert_eq!(ev.code, key::ESCAPE);
    }

    #[test]
    fn back_tab_sequence() {
        let ev = decode(b"\x1b[Z").unwrap();
        assert_eq!(ev.code, key::TAB);
        assert!(ev.shift());
    }

    #[test]
    fn legacy_tab_sequences() {
        assert_eq!(decode(b"\x1b[I").unwrap().code, key::TAB);
        assert_eq!(decode(b"\x1b[9~").unwrap().code, key::TAB);
    }

    #[test]
    fn marker_via_tilde_form() {
        assert_eq!(decode(b"\x1b[24~").unwrap().code, key::MARKER);
    }

    #[test]
    fn unknown_tilde_parameter_degrades() {
        assert_eq!(decode(b"\x1b[5~").unwrap().code, key::ESCAPE);
    }

    #[test]
    fn unknown_terminator_degrades() {
        assert_eq!(decode(b"\x1b[1;2A").unwrap().code, key::ESCAPE);
    }

    #[test]
    fn key_report_defaults() {
        let ev = decode(b"\x1b[97u").unwrap();
        assert_eq!(ev.code, 97);
        assert_eq!(ev.mods, 1);
        assert_eq!(ev.kind, KeyEventKind::Press);
    }

    #[test]
    fn key_report_with_mods_and_kind() {
        let ev = decode(b"\x1b[9;5:2u").unwrap();
        assert_eq!(ev.code, key::TAB);
        assert_eq!(ev.mods, 5);
        assert!(ev.ctrl());
        assert_eq!(ev.kind, KeyEventKind::Repeat);
    }

    #[test]
    fn key_report_release() {
        let ev = decode(b"\x1b[57442;1:3u").unwrap();
        assert_eq!(ev.code, key::CTRL_LEFT);
        assert_eq!(ev.kind, KeyEventKind::Release);
    }

    #[test]
    fn key_report_alternate_key_ignored() {
        let ev = decode(b"\x1b[97:65;2u").unwrap();
        assert_eq!(ev.code, 97);
        assert_eq!(ev.mods, 2);
    }

    #[test]
    fn key_report_garbage_is_none() {
        // Empty payload.
        assert!(decode(b"\x1b[u").is_none());
        // Numeric overflow in the code field.
        assert!(decode(b"\x1b[99999999999999999u").is_none());
        // Numeric overflow in the modifier field.
        assert!(decode(b"\x1b[9;99999999999999999u").is_none());
    }

    #[test]
    fn truncated_sequence_degrades() {
        // Sequence starts but the stream dries up before a final byte.
        assert_eq!(decode(b"\x1b[12;3").unwrap().code, key::ESCAPE);
    }

    #[test]
    fn runaway_sequence_is_capped() {
        let mut bytes = b"\x1b[".to_vec();
        bytes.extend(std::iter::repeat_n(b'1', 200));
        bytes.push(b'u');
        // The cap fires before the terminator: best-effort Escape.
        assert_eq!(decode(&bytes).unwrap().code, key::ESCAPE);
    }

    #[test]
    fn marker_via_key_report() {
        let ev = decode(b"\x1b[57387;1:1u").unwrap();
        assert_eq!(ev.code, key::MARKER);
        assert_eq!(ev.kind, KeyEventKind::Press);
    }
}
