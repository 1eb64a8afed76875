#![forbid(unsafe_code)]

//! Key event types.
//!
//! A [`KeyEvent`] carries the raw fields of the kitty keyboard protocol
//! report that produced it: a numeric key code, the raw modifier field, and
//! the event kind (press/repeat/release). The modifier field keeps the wire
//! encoding (`1` means "no modifiers") because the switcher needs to
//! round-trip and compare raw values from several sources that disagree on
//! the encoding. [`Modifiers`] is the decoded bitflags view.

use bitflags::bitflags;

/// Well-known key codes the switcher dispatches on.
pub mod key {
    /// Tab, the cycle key.
    pub const TAB: u32 = 9;
    /// Escape.
    pub const ESCAPE: u32 = 27;
    /// F24, the synthetic marker key the session sends itself.
    pub const MARKER: u32 = 57_387;
    /// Left Control in the kitty keyboard protocol.
    pub const CTRL_LEFT: u32 = 57_442;
    /// Right Control in the kitty keyboard protocol.
    pub const CTRL_RIGHT: u32 = 57_448;

    /// Whether a code names one of the Control keys themselves.
    #[must_use]
    pub const fn is_ctrl(code: u32) -> bool {
        matches!(code, CTRL_LEFT | CTRL_RIGHT)
    }
}

/// The type of key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyEventKind {
    /// Key was pressed (default when not distinguishable).
    #[default]
    Press,
    /// Key is being held (repeat event).
    Repeat,
    /// Key was released.
    Release,
}

impl KeyEventKind {
    /// Decode the protocol's numeric event-type field. Unknown values and
    /// the default `1` both map to [`KeyEventKind::Press`].
    #[must_use]
    pub const fn from_raw(value: u32) -> Self {
        match value {
            2 => Self::Repeat,
            3 => Self::Release,
            _ => Self::Press,
        }
    }

    /// The protocol's numeric encoding of this kind.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::Press => 1,
            Self::Repeat => 2,
            Self::Release => 3,
        }
    }
}

bitflags! {
    /// Decoded modifier keys.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        /// No modifiers.
        const NONE  = 0b0000;
        /// Shift key.
        const SHIFT = 0b0001;
        /// Alt/Option key.
        const ALT   = 0b0010;
        /// Control key.
        const CTRL  = 0b0100;
        /// Super/Meta/Command key.
        const SUPER = 0b1000;
    }
}

impl Modifiers {
    /// Decode the protocol modifier field (`value = 1 + modifier_bits`).
    ///
    /// A raw value of `0` is tolerated and reads as no modifiers; GLFW-style
    /// masks from the modifier oracle legitimately report `0`.
    #[must_use]
    pub const fn from_protocol(value: u32) -> Self {
        let bits = value.saturating_sub(1);
        let mut mods = Self::NONE;
        if bits & 1 != 0 {
            mods = mods.union(Self::SHIFT);
        }
        if bits & 2 != 0 {
            mods = mods.union(Self::ALT);
        }
        if bits & 4 != 0 {
            mods = mods.union(Self::CTRL);
        }
        if bits & 8 != 0 {
            mods = mods.union(Self::SUPER);
        }
        mods
    }
}

impl Default for Modifiers {
    fn default() -> Self {
        Self::NONE
    }
}

/// A decoded key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Numeric key code (Unicode codepoint or kitty functional code).
    pub code: u32,
    /// Raw protocol modifier field (`1` = no modifiers).
    pub mods: u32,
    /// Press, repeat, or release.
    pub kind: KeyEventKind,
}

impl KeyEvent {
    /// Create a plain press event with no modifiers.
    #[must_use]
    pub const fn new(code: u32) -> Self {
        Self {
            code,
            mods: 1,
            kind: KeyEventKind::Press,
        }
    }

    /// Set the raw modifier field.
    #[must_use]
    pub const fn with_mods(mut self, mods: u32) -> Self {
        self.mods = mods;
        self
    }

    /// Set the event kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: KeyEventKind) -> Self {
        self.kind = kind;
        self
    }

    /// Decoded bitflags view of the modifier field.
    #[must_use]
    pub const fn modifiers(&self) -> Modifiers {
        Modifiers::from_protocol(self.mods)
    }

    /// Check if Shift is held.
    #[must_use]
    pub const fn shift(&self) -> bool {
        self.modifiers().contains(Modifiers::SHIFT)
    }

    /// Check if Control is held.
    #[must_use]
    pub const fn ctrl(&self) -> bool {
        self.modifiers().contains(Modifiers::CTRL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_one_means_no_modifiers() {
        assert_eq!(Modifiers::from_protocol(1), Modifiers::NONE);
        assert_eq!(Modifiers::from_protocol(0), Modifiers::NONE);
    }

    #[test]
    fn protocol_field_decodes_bits() {
        assert_eq!(Modifiers::from_protocol(2), Modifiers::SHIFT);
        assert_eq!(Modifiers::from_protocol(5), Modifiers::CTRL);
        assert_eq!(
            Modifiers::from_protocol(6),
            Modifiers::SHIFT | Modifiers::CTRL
        );
        assert_eq!(Modifiers::from_protocol(9), Modifiers::SUPER);
    }

    #[test]
    fn key_event_helpers() {
        let ev = KeyEvent::new(key::TAB).with_mods(2);
        assert!(ev.shift());
        assert!(!ev.ctrl());

        let ev = KeyEvent::new(key::TAB).with_mods(5);
        assert!(ev.ctrl());
        assert!(!ev.shift());
    }

    #[test]
    fn kind_round_trips() {
        for kind in [
            KeyEventKind::Press,
            KeyEventKind::Repeat,
            KeyEventKind::Release,
        ] {
            assert_eq!(KeyEventKind::from_raw(kind.as_raw()), kind);
        }
        assert_eq!(KeyEventKind::from_raw(0), KeyEventKind::Press);
        assert_eq!(KeyEventKind::from_raw(7), KeyEventKind::Press);
    }

    #[test]
    fn ctrl_key_codes() {
        assert!(key::is_ctrl(key::CTRL_LEFT));
        assert!(key::is_ctrl(key::CTRL_RIGHT));
        assert!(!key::is_ctrl(key::TAB));
    }
}
