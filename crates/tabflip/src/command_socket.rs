#![forbid(unsafe_code)]

//! Inter-process command relay.
//!
//! One unix datagram endpoint per running session, at a deterministic path
//! derived from the host window-group id. A later invocation sends `next`
//! or `prev` to the live session instead of stacking a second switcher.
//! Any other payload is ignored.

use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;

use tabflip_core::logging::{debug, warn};

/// A relayed cycle command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchCommand {
    /// Advance the selection.
    Next,
    /// Retreat the selection.
    Prev,
}

impl SwitchCommand {
    /// The wire payload.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Prev => "prev",
        }
    }

    /// Parse a wire payload.
    #[must_use]
    pub fn parse(payload: &str) -> Option<Self> {
        match payload {
            "next" => Some(Self::Next),
            "prev" => Some(Self::Prev),
            _ => None,
        }
    }
}

/// Socket path for one window group.
#[must_use]
pub fn socket_path(group_id: u64) -> PathBuf {
    std::env::temp_dir().join(format!("tabflip-{group_id}.sock"))
}

/// The serving side, owned by the running session.
#[derive(Debug)]
pub struct CommandServer {
    socket: UnixDatagram,
    path: PathBuf,
}

impl CommandServer {
    /// Bind the group's endpoint, unlinking a stale socket left by a
    /// crashed session if the first bind collides.
    pub fn bind(group_id: u64) -> std::io::Result<Self> {
        let path = socket_path(group_id);
        let socket = match UnixDatagram::bind(&path) {
            Ok(socket) => socket,
            Err(_) => {
                let _ = std::fs::remove_file(&path);
                UnixDatagram::bind(&path)?
            }
        };
        socket.set_nonblocking(true)?;
        debug!(path = %path.display(), "command server bound");
        Ok(Self { socket, path })
    }

    /// The underlying socket, for readiness registration.
    #[must_use]
    pub const fn socket(&self) -> &UnixDatagram {
        &self.socket
    }

    /// Receive one pending command, if any. Unknown payloads and transient
    /// errors read as nothing.
    #[must_use]
    pub fn recv(&self) -> Option<SwitchCommand> {
        let mut buf = [0u8; 32];
        match self.socket.recv_from(&mut buf) {
            Ok((len, _)) => {
                let payload = String::from_utf8_lossy(&buf[..len]);
                SwitchCommand::parse(payload.trim())
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => None,
            Err(err) => {
                warn!(%err, "command socket receive failed");
                None
            }
        }
    }
}

impl Drop for CommandServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Relay a command to an already-running session. Returns whether the send
/// succeeded (in which case this process should exit instead of starting
/// its own session).
#[must_use]
pub fn try_send(group_id: u64, command: SwitchCommand) -> bool {
    let path = socket_path(group_id);
    if !path.exists() {
        debug!(path = %path.display(), "no running session to relay to");
        return false;
    }
    let Ok(socket) = UnixDatagram::unbound() else {
        return false;
    };
    match socket.send_to(command.as_str().as_bytes(), &path) {
        Ok(_) => {
            debug!(command = command.as_str(), "relayed to running session");
            true
        }
        Err(err) => {
            warn!(%err, "relay send failed");
            false
        }
    }
}
