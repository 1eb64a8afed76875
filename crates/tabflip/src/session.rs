#![forbid(unsafe_code)]

//! Terminal session lifecycle and input plumbing.
//!
//! [`SessionGuard`] owns every terminal state change the switcher makes
//! (raw mode, alternate screen, cursor visibility, window title, and the
//! kitty keyboard-protocol mode) and restores them in reverse order on
//! drop, so any exit path (return, `?`, even panic when unwinding) leaves
//! the terminal sane.
//!
//! [`TtyInput`] reads the controlling terminal with bounded waits, which is
//! what the key decoder needs to disambiguate escape sequences under
//! timing. [`EventMux`] is the main loop's single suspension point: one
//! readiness poll over the tty and the command socket with the tick as
//! timeout.
//!
//! Readiness is edge-triggered, so the tty is drained to a buffer on every
//! wake and served byte-at-a-time from there; `has_buffered` lets the loop
//! finish the buffer before suspending again.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use tabflip_core::decoder::ByteSource;
use tabflip_core::logging::debug;

use crate::command_socket::CommandServer;

/// Escape sequences for the kitty keyboard protocol mode, written verbatim
/// (crossterm's wrappers push a different flag set than the session needs).
///
/// | Step | Sequence | Meaning |
/// |------|----------|---------|
/// | push | `CSI > 1 u` | push disambiguate-escape-codes |
/// | set  | `CSI = 11 ; 1 u` | disambiguate + report events + report all keys |
/// | pop  | `CSI < u` | restore the previous mode |
const KEYBOARD_MODE_PUSH: &str = "\x1b[>1u";
const KEYBOARD_MODE_SET: &str = "\x1b[=11;1u";
const KEYBOARD_MODE_POP: &str = "\x1b[<u";

const ALT_SCREEN_ENTER: &str = "\x1b[?1049h";
const ALT_SCREEN_LEAVE: &str = "\x1b[?1049l";
const CURSOR_HIDE: &str = "\x1b[?25l";
const CURSOR_SHOW: &str = "\x1b[?25h";
const SGR_RESET: &str = "\x1b[0m";

const INPUT_TOKEN: Token = Token(0);
const COMMAND_TOKEN: Token = Token(1);

/// RAII guard over the terminal modes the switcher uses.
#[derive(Debug)]
pub struct SessionGuard {
    raw_mode: bool,
    alt_screen: bool,
    keyboard_mode: bool,
}

impl SessionGuard {
    /// Enter raw mode, the alternate screen, and the keyboard protocol, and
    /// set the window title.
    pub fn enter(title: &str) -> io::Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        let mut guard = Self {
            raw_mode: true,
            alt_screen: false,
            keyboard_mode: false,
        };

        let mut out = io::stdout();
        write!(out, "\x1b]2;{title}\x07")?;
        write!(out, "{ALT_SCREEN_ENTER}")?;
        guard.alt_screen = true;
        write!(out, "{KEYBOARD_MODE_PUSH}{KEYBOARD_MODE_SET}")?;
        guard.keyboard_mode = true;
        write!(out, "{CURSOR_HIDE}")?;
        out.flush()?;
        debug!("terminal session entered");
        Ok(guard)
    }

    /// Terminal size as (rows, cols), with the classic fallback.
    #[must_use]
    pub fn screen_size() -> (usize, usize) {
        match crossterm::terminal::size() {
            Ok((cols, rows)) => (rows as usize, cols as usize),
            Err(_) => (24, 80),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Reverse order of entry; failures here are unreportable.
        let mut out = io::stdout();
        if self.keyboard_mode {
            let _ = write!(out, "{KEYBOARD_MODE_POP}");
        }
        let _ = write!(out, "{CURSOR_SHOW}{SGR_RESET}");
        if self.alt_screen {
            let _ = write!(out, "{ALT_SCREEN_LEAVE}");
        }
        let _ = out.flush();
        if self.raw_mode {
            let _ = crossterm::terminal::disable_raw_mode();
        }
        debug!("terminal session restored");
    }
}

/// The controlling terminal, readable with bounded waits.
#[derive(Debug)]
pub struct TtyInput {
    tty: File,
    poll: Poll,
    events: Events,
    buffer: VecDeque<u8>,
}

impl TtyInput {
    /// Open `/dev/tty` non-blocking and register it for readiness.
    pub fn open() -> io::Result<Self> {
        let tty = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open("/dev/tty")?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut SourceFd(&tty.as_raw_fd()), INPUT_TOKEN, Interest::READABLE)?;
        Ok(Self {
            tty,
            poll,
            events: Events::with_capacity(4),
            buffer: VecDeque::new(),
        })
    }

    /// Raw fd for the main loop's own registration.
    #[must_use]
    pub fn raw_fd(&self) -> i32 {
        self.tty.as_raw_fd()
    }

    /// Whether already-drained bytes are waiting. The main loop must
    /// consume these before suspending: edge-triggered readiness will not
    /// re-announce them.
    #[must_use]
    pub fn has_buffered(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Drain everything currently readable into the buffer.
    fn fill(&mut self) {
        let mut chunk = [0u8; 256];
        loop {
            match self.tty.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.buffer.extend(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => break,
            }
        }
    }
}

impl ByteSource for TtyInput {
    fn read_byte(&mut self, timeout: Duration) -> Option<u8> {
        if let Some(byte) = self.buffer.pop_front() {
            return Some(byte);
        }
        self.poll.poll(&mut self.events, Some(timeout)).ok()?;
        if self.events.is_empty() {
            return None;
        }
        self.fill();
        self.buffer.pop_front()
    }
}

/// What a multiplex wait observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// Terminal input is readable (or already buffered).
    pub input: bool,
    /// The command socket has a datagram.
    pub command: bool,
}

impl Readiness {
    /// Nothing fired: this wait was a tick.
    #[must_use]
    pub const fn is_tick(self) -> bool {
        !self.input && !self.command
    }
}

/// The main loop's single suspension point.
#[derive(Debug)]
pub struct EventMux {
    poll: Poll,
    events: Events,
    has_command_source: bool,
}

impl EventMux {
    /// Register the tty and (when serving) the command socket.
    pub fn new(input: &TtyInput, server: Option<&CommandServer>) -> io::Result<Self> {
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut SourceFd(&input.raw_fd()), INPUT_TOKEN, Interest::READABLE)?;
        if let Some(server) = server {
            poll.registry().register(
                &mut SourceFd(&server.socket().as_raw_fd()),
                COMMAND_TOKEN,
                Interest::READABLE,
            )?;
        }
        Ok(Self {
            poll,
            events: Events::with_capacity(8),
            has_command_source: server.is_some(),
        })
    }

    /// Wait for readiness or the tick timeout. Buffered input short-circuits
    /// the wait; those bytes will never re-announce themselves.
    pub fn wait(&mut self, input: &TtyInput, timeout: Duration) -> Readiness {
        if input.has_buffered() {
            return Readiness {
                input: true,
                command: false,
            };
        }
        let mut readiness = Readiness::default();
        if self.poll.poll(&mut self.events, Some(timeout)).is_err() {
            // Interrupted wait (e.g. SIGWINCH): report a tick.
            return readiness;
        }
        for event in &self.events {
            match event.token() {
                INPUT_TOKEN => readiness.input = true,
                COMMAND_TOKEN if self.has_command_source => readiness.command = true,
                _ => {}
            }
        }
        readiness
    }
}

/// Latch `SIGWINCH` into a flag the draw loop checks each tick.
#[must_use]
pub fn resize_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    #[cfg(unix)]
    {
        if let Err(err) =
            signal_hook::flag::register(signal_hook::consts::SIGWINCH, Arc::clone(&flag))
        {
            debug!(%err, "resize signal unavailable");
        }
    }
    flag
}

/// Consume a latched resize, returning whether one occurred.
#[must_use]
pub fn take_resize(flag: &AtomicBool) -> bool {
    flag.swap(false, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_tick_detection() {
        assert!(Readiness::default().is_tick());
        assert!(
            !Readiness {
                input: true,
                command: false
            }
            .is_tick()
        );
        assert!(
            !Readiness {
                input: false,
                command: true
            }
            .is_tick()
        );
    }

    #[test]
    fn resize_flag_latches_and_clears() {
        let flag = resize_flag();
        assert!(!take_resize(&flag));
        flag.store(true, Ordering::Relaxed);
        assert!(take_resize(&flag));
        assert!(!take_resize(&flag));
    }
}
