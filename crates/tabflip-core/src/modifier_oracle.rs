//! Best-effort "is the trigger modifier held" polling.
//!
//! Terminals and platforms disagree on whether a live modifier bitmask can
//! be read at all, so the oracle is resolved from a prioritized list of
//! capability probes. Each probe either yields a working poll function or
//! declines; the first success is cached for the process lifetime. When no
//! probe resolves, [`ModifierOracle::poll`] always answers `None` (unknown)
//! and the caller must rely on protocol-level key events alone.
//!
//! Poll results use whichever raw encoding the mechanism natively speaks:
//! either a GLFW-style bitmask (`4` = Control) or the keyboard protocol's
//! off-by-one field (`5` = Control). [`ctrl_is_down`] accepts both.

use crate::logging::debug;

/// GLFW-style Control bit, the default mask when a probe does not supply
/// its own.
pub const DEFAULT_CTRL_MASK: u32 = 4;

/// A resolved poll function. `None` means the mechanism failed transiently;
/// the oracle stays resolved and simply reports unknown for that tick.
pub type PollFn = Box<dyn FnMut() -> Option<u32>>;

/// One candidate mechanism for reading live modifier state.
pub struct ModifierProbe {
    /// Mechanism name, for the debug log.
    pub name: &'static str,
    /// Attempt to resolve the mechanism. Runs at most once.
    pub resolve: Box<dyn FnOnce() -> Option<PollFn>>,
}

impl ModifierProbe {
    /// Convenience constructor.
    #[must_use]
    pub fn new(
        name: &'static str,
        resolve: impl FnOnce() -> Option<PollFn> + 'static,
    ) -> Self {
        Self {
            name,
            resolve: Box::new(resolve),
        }
    }
}

impl std::fmt::Debug for ModifierProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModifierProbe")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Cached outcome of probing for a modifier-state mechanism.
pub struct ModifierOracle {
    poll: Option<PollFn>,
    mechanism: Option<&'static str>,
    ctrl_mask: u32,
}

impl std::fmt::Debug for ModifierOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModifierOracle")
            .field("mechanism", &self.mechanism)
            .field("ctrl_mask", &self.ctrl_mask)
            .finish_non_exhaustive()
    }
}

impl ModifierOracle {
    /// Try each probe in order and cache the first that resolves.
    #[must_use]
    pub fn resolve(probes: Vec<ModifierProbe>) -> Self {
        for probe in probes {
            if let Some(poll) = (probe.resolve)() {
                debug!(mechanism = probe.name, "modifier poll resolved");
                return Self {
                    poll: Some(poll),
                    mechanism: Some(probe.name),
                    ctrl_mask: DEFAULT_CTRL_MASK,
                };
            }
            debug!(mechanism = probe.name, "modifier probe declined");
        }
        Self {
            poll: None,
            mechanism: None,
            ctrl_mask: DEFAULT_CTRL_MASK,
        }
    }

    /// An oracle that always answers unknown.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::resolve(Vec::new())
    }

    /// Whether any mechanism resolved.
    #[must_use]
    pub const fn available(&self) -> bool {
        self.poll.is_some()
    }

    /// Name of the resolved mechanism, if any.
    #[must_use]
    pub const fn mechanism(&self) -> Option<&'static str> {
        self.mechanism
    }

    /// The Control mask to pair with polled values.
    #[must_use]
    pub const fn ctrl_mask(&self) -> u32 {
        self.ctrl_mask
    }

    /// Poll the live modifier state. `None` = unknown.
    pub fn poll(&mut self) -> Option<u32> {
        self.poll.as_mut().and_then(|poll| poll())
    }

    /// Poll and interpret: is Control currently held? `None` = unknown.
    pub fn ctrl_down(&mut self) -> Option<bool> {
        let mask = self.ctrl_mask;
        self.poll().map(|mods| ctrl_is_down(mods, mask))
    }
}

/// Interpret a raw modifier value against a Control mask.
///
/// True when the GLFW-style mask bit is set, or when the value reads as a
/// keyboard-protocol field (`1` = none) whose Control bit is set.
#[must_use]
pub const fn ctrl_is_down(mods: u32, ctrl_mask: u32) -> bool {
    if mods & ctrl_mask != 0 {
        return true;
    }
    mods > 0 && (mods - 1) & 4 != 0
}

/// Probes that exist on every platform. The host-specific mechanisms are
/// prepended by the caller; this list holds only the OS side channels.
#[must_use]
pub fn platform_probes() -> Vec<ModifierProbe> {
    #[cfg(target_os = "macos")]
    {
        vec![macos::probe()]
    }
    #[cfg(not(target_os = "macos"))]
    {
        Vec::new()
    }
}

/// macOS side channel: ask CoreGraphics whether either Control key is down.
/// This works even when the hosting terminal exposes no modifier query.
#[cfg(target_os = "macos")]
mod macos {
    use super::{ModifierProbe, PollFn};

    #[link(name = "ApplicationServices", kind = "framework")]
    unsafe extern "C" {
        fn CGEventSourceKeyState(state: i32, key: u16) -> bool;
    }

    const COMBINED_SESSION_STATE: i32 = 0;
    const KVK_CONTROL: u16 = 0x3B;
    const KVK_RIGHT_CONTROL: u16 = 0x3E;

    pub(super) fn probe() -> ModifierProbe {
        ModifierProbe::new("coregraphics-key-state", || {
            let poll: PollFn = Box::new(|| {
                let down = unsafe {
                    CGEventSourceKeyState(COMBINED_SESSION_STATE, KVK_CONTROL)
                        || CGEventSourceKeyState(COMBINED_SESSION_STATE, KVK_RIGHT_CONTROL)
                };
                Some(if down { 4 } else { 0 })
            });
            Some(poll)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn ctrl_mask_forms() {
        // GLFW-style mask.
        assert!(ctrl_is_down(4, 4));
        assert!(ctrl_is_down(5, 4));
        // Protocol off-by-one form: 5 = 1 + CTRL(4).
        assert!(ctrl_is_down(5, 8));
        // No modifiers in either encoding.
        assert!(!ctrl_is_down(1, 4));
        assert!(!ctrl_is_down(0, 4));
        // Shift only (protocol value 2).
        assert!(!ctrl_is_down(2, 4));
    }

    #[test]
    fn first_resolving_probe_wins() {
        let mut oracle = ModifierOracle::resolve(vec![
            ModifierProbe::new("declines", || None),
            ModifierProbe::new("resolves", || {
                Some(Box::new(|| Some(4u32)) as PollFn)
            }),
            ModifierProbe::new("unreached", || {
                Some(Box::new(|| Some(0u32)) as PollFn)
            }),
        ]);
        assert!(oracle.available());
        assert_eq!(oracle.mechanism(), Some("resolves"));
        assert_eq!(oracle.poll(), Some(4));
        assert_eq!(oracle.ctrl_down(), Some(true));
    }

    #[test]
    fn no_probe_means_unknown() {
        let mut oracle = ModifierOracle::resolve(vec![
            ModifierProbe::new("a", || None),
            ModifierProbe::new("b", || None),
        ]);
        assert!(!oracle.available());
        assert_eq!(oracle.poll(), None);
        assert_eq!(oracle.ctrl_down(), None);
    }

    #[test]
    fn probes_run_at_most_once() {
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        let mut oracle = ModifierOracle::resolve(vec![ModifierProbe::new("counted", move || {
            seen.set(seen.get() + 1);
            Some(Box::new(|| Some(0u32)) as PollFn)
        })]);
        let _ = oracle.poll();
        let _ = oracle.poll();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn transient_poll_failure_reads_unknown() {
        let mut oracle = ModifierOracle::resolve(vec![ModifierProbe::new("flaky", || {
            let mut first = true;
            Some(Box::new(move || {
                if first {
                    first = false;
                    None
                } else {
                    Some(4u32)
                }
            }) as PollFn)
        })]);
        assert_eq!(oracle.ctrl_down(), None);
        assert_eq!(oracle.ctrl_down(), Some(true));
    }
}
