//! Property tests for the key decoder.

use std::collections::VecDeque;
use std::time::Duration;

use proptest::prelude::*;
use tabflip_core::decoder::{ByteSource, KeyDecoder};
use tabflip_core::event::KeyEventKind;

struct Script(VecDeque<u8>);

impl ByteSource for Script {
    fn read_byte(&mut self, _timeout: Duration) -> Option<u8> {
        self.0.pop_front()
    }
}

fn decode(bytes: Vec<u8>) -> Option<tabflip_core::event::KeyEvent> {
    KeyDecoder::new().decode(&mut Script(bytes.into_iter().collect()))
}

proptest! {
    /// Every well-formed key report round-trips its (code, mods, event)
    /// triple through the decoder.
    #[test]
    fn key_report_round_trip(code in 1u32..200_000, mods in 1u32..32, event in 1u32..=3) {
        let seq = format!("\x1b[{code};{mods}:{event}u");
        let ev = decode(seq.into_bytes()).expect("well-formed report decodes");
        prop_assert_eq!(ev.code, code);
        prop_assert_eq!(ev.mods, mods);
        prop_assert_eq!(ev.kind.as_raw(), event);
    }

    /// Omitted fields default to mods = 1, event = press.
    #[test]
    fn key_report_defaults(code in 1u32..200_000) {
        let seq = format!("\x1b[{code}u");
        let ev = decode(seq.into_bytes()).expect("well-formed report decodes");
        prop_assert_eq!(ev.code, code);
        prop_assert_eq!(ev.mods, 1);
        prop_assert_eq!(ev.kind, KeyEventKind::Press);
    }

    /// The alternate-key subfield never changes the decoded code.
    #[test]
    fn alternate_key_is_ignored(code in 1u32..200_000, alt in 1u32..200_000, mods in 1u32..32) {
        let seq = format!("\x1b[{code}:{alt};{mods}u");
        let ev = decode(seq.into_bytes()).expect("well-formed report decodes");
        prop_assert_eq!(ev.code, code);
        prop_assert_eq!(ev.mods, mods);
    }

    /// Arbitrary bytes never panic the decoder.
    #[test]
    fn decoder_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode(bytes);
    }
}
