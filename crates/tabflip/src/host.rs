#![forbid(unsafe_code)]

//! Host collaborator: the kitty remote-control facility.
//!
//! The switcher consumes the host through [`HostControl`] so the state
//! machine can run against a fake in tests. [`KittyHost`] is the real
//! implementation, shelling out to `kitty @`. All host failures are soft:
//! callers translate them into empty tab sets, blank previews, or logged
//! no-ops, never a crash.

use std::process::Command;

use serde_json::Value;
use tabflip_core::logging::{debug, warn};

/// Immutable snapshot of one tab, replaced wholesale on each listing.
#[derive(Debug, Clone, PartialEq)]
pub struct TabInfo {
    /// Host tab id.
    pub id: u64,
    /// Tab title, `"Untitled"` when the host reports none.
    pub title: String,
    /// The window whose screen is captured for this tab's preview.
    pub window_id: u64,
    /// Whether this tab is the active one.
    pub is_active: bool,
    /// Host-native focus timestamp/rank, when the host supplies one.
    pub last_focused: Option<f64>,
}

/// Host operations the switcher consumes.
pub trait HostControl {
    /// List tabs in the invoking window group. Returns the group id and the
    /// tab snapshots.
    fn list_tabs(&self) -> Result<(u64, Vec<TabInfo>), HostError>;

    /// Fetch the current screen text of a window, optionally with ANSI
    /// styling.
    fn fetch_screen_text(&self, window_id: u64, ansi: bool) -> Result<Vec<String>, HostError>;

    /// Focus a tab by id.
    fn focus_tab(&self, tab_id: u64) -> Result<(), HostError>;

    /// Send the synthetic marker key (F24) to a window so the session can
    /// corroborate that key events actually reach its decoder.
    fn send_marker_key(&self, window_id: u64) -> Result<(), HostError>;

    /// Live modifier bitmask, when the host can answer. `None` = unknown.
    fn poll_modifier_state(&self) -> Option<u32>;
}

/// Errors from the host boundary.
#[derive(Debug)]
pub enum HostError {
    /// The `kitty` binary could not be spawned.
    Spawn(std::io::Error),
    /// The command ran but reported failure.
    Command {
        /// Exit code, when the process exited normally.
        status: Option<i32>,
        /// Captured stderr.
        stderr: String,
    },
    /// The command's JSON output did not parse.
    Json(serde_json::Error),
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(err) => write!(f, "failed to run kitty: {err}"),
            Self::Command { status, stderr } => {
                write!(f, "kitty @ failed (status {status:?}): {}", stderr.trim())
            }
            Self::Json(err) => write!(f, "kitty @ produced invalid JSON: {err}"),
        }
    }
}

impl std::error::Error for HostError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Command { .. } => None,
        }
    }
}

/// The real host: `kitty @` over the invoking terminal's control socket.
#[derive(Debug, Clone)]
pub struct KittyHost {
    listen_on: Option<String>,
    current_window_id: u64,
}

impl KittyHost {
    /// Build from the environment kitty provides to child processes.
    #[must_use]
    pub fn from_env() -> Self {
        let listen_on = std::env::var("KITTY_LISTEN_ON").ok();
        let current_window_id = std::env::var("KITTY_WINDOW_ID")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        Self {
            listen_on,
            current_window_id,
        }
    }

    /// The id of the window this process runs in (0 when unknown).
    #[must_use]
    pub const fn current_window_id(&self) -> u64 {
        self.current_window_id
    }

    fn remote(&self, args: &[&str]) -> Result<String, HostError> {
        let mut cmd = Command::new("kitty");
        cmd.arg("@");
        if let Some(to) = &self.listen_on {
            cmd.args(["--to", to]);
        }
        cmd.args(args);
        let output = cmd.output().map_err(HostError::Spawn)?;
        if !output.status.success() {
            return Err(HostError::Command {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl HostControl for KittyHost {
    fn list_tabs(&self) -> Result<(u64, Vec<TabInfo>), HostError> {
        let raw = self.remote(&["ls"])?;
        let data: Value = serde_json::from_str(&raw).map_err(HostError::Json)?;
        Ok(parse_window_groups(&data, self.current_window_id))
    }

    fn fetch_screen_text(&self, window_id: u64, ansi: bool) -> Result<Vec<String>, HostError> {
        let id_match = format!("id:{window_id}");
        let mut args = vec!["get-text", "--match", id_match.as_str(), "--extent", "screen"];
        if ansi {
            args.push("--ansi");
        }
        let text = self.remote(&args)?;
        Ok(text.lines().map(str::to_string).collect())
    }

    fn focus_tab(&self, tab_id: u64) -> Result<(), HostError> {
        let id_match = format!("id:{tab_id}");
        self.remote(&["focus-tab", "--match", id_match.as_str(), "--no-response"])?;
        Ok(())
    }

    fn send_marker_key(&self, window_id: u64) -> Result<(), HostError> {
        let id_match = format!("id:{window_id}");
        self.remote(&["send-key", "--match", id_match.as_str(), "f24"])?;
        Ok(())
    }

    fn poll_modifier_state(&self) -> Option<u32> {
        // kitty's remote-control surface has no live modifier query; the
        // oracle falls through to its platform side channels.
        None
    }
}

/// Locate the window group containing `current_window_id` (fallback: the
/// first group) and parse its tabs.
#[must_use]
pub fn parse_window_groups(data: &Value, current_window_id: u64) -> (u64, Vec<TabInfo>) {
    let Some(groups) = data.as_array() else {
        warn!("host ls output was not a list");
        return (0, Vec::new());
    };

    for group in groups {
        let tabs = group.get("tabs").and_then(Value::as_array);
        let Some(tabs) = tabs else { continue };
        for tab in tabs {
            if tab_windows(tab)
                .iter()
                .any(|win| value_u64(win.get("id")) == Some(current_window_id))
            {
                let group_id = value_u64(group.get("id")).unwrap_or(0);
                debug!(group_id, tabs = tabs.len(), "located invoking window group");
                return (
                    group_id,
                    parse_tabs(tabs, Some(tab), group_history(group), current_window_id),
                );
            }
        }
    }

    if let Some(group) = groups.first() {
        let tabs = group.get("tabs").and_then(Value::as_array);
        let group_id = value_u64(group.get("id")).unwrap_or(0);
        debug!(group_id, "falling back to first window group");
        if let Some(tabs) = tabs {
            return (
                group_id,
                parse_tabs(tabs, None, group_history(group), current_window_id),
            );
        }
        return (group_id, Vec::new());
    }
    (0, Vec::new())
}

fn group_history(group: &Value) -> &[Value] {
    group
        .get("active_window_history")
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

fn tab_windows(tab: &Value) -> &[Value] {
    tab.get("windows")
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

fn value_u64(value: Option<&Value>) -> Option<u64> {
    value.and_then(Value::as_u64)
}

fn value_f64(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64)
}

/// Parse the tab list of one window group.
///
/// `active_tab` is the tab containing the invoking window, when known; it is
/// marked active alongside anything the host itself flags. `history` is the
/// group's focus history (oldest first), used to synthesize per-tab
/// `last_focused` ranks when the host carries no explicit timestamps.
#[must_use]
pub fn parse_tabs(
    tabs: &[Value],
    active_tab: Option<&Value>,
    history: &[Value],
    current_window_id: u64,
) -> Vec<TabInfo> {
    let active_tab_id = active_tab.and_then(|tab| value_u64(tab.get("id")));

    let mut history_positions: std::collections::HashMap<u64, usize> =
        std::collections::HashMap::new();
    for (idx, win_id) in history.iter().enumerate() {
        if let Some(id) = win_id.as_u64() {
            history_positions.insert(id, idx);
        }
    }

    let mut parsed = Vec::with_capacity(tabs.len());
    for tab in tabs {
        let tab_id = value_u64(tab.get("id")).unwrap_or(0);
        let title = tab
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .unwrap_or("Untitled")
            .to_string();
        let windows = tab_windows(tab);

        // Focus recency: group history rank, overridden by any explicit
        // timestamp field the host version exposes.
        let mut last_focused = windows
            .iter()
            .filter_map(|win| value_u64(win.get("id")))
            .filter_map(|id| history_positions.get(&id).copied())
            .max()
            .map(|idx| idx as f64);
        for field in ["last_focused", "last_active", "last_activated", "last_activity"] {
            if let Some(ts) = value_f64(tab.get(field)) {
                last_focused = Some(ts);
                break;
            }
        }

        let window_id = pick_capture_window(tab, windows, current_window_id);
        let is_active = active_tab_id == Some(tab_id)
            || tab.get("is_active").and_then(Value::as_bool).unwrap_or(false)
            || tab.get("active").and_then(Value::as_bool).unwrap_or(false);

        parsed.push(TabInfo {
            id: tab_id,
            title,
            window_id,
            is_active,
            last_focused,
        });
    }
    debug!(count = parsed.len(), "parsed host tab list");
    parsed
}

/// Which window of a tab to capture for its preview. Precedence: the tab's
/// own focus history, then the focused/active window, then the first
/// window, skipping the invoking window at every step since its screen is
/// the switcher itself; finally the first window regardless.
fn pick_capture_window(tab: &Value, windows: &[Value], current_window_id: u64) -> u64 {
    let tab_history = tab
        .get("active_window_history")
        .and_then(Value::as_array)
        .map_or(&[] as &[Value], Vec::as_slice);
    for entry in tab_history {
        if let Some(id) = entry.as_u64()
            && id != current_window_id
        {
            return id;
        }
    }

    for win in windows {
        let focused = ["is_focused", "is_active", "active"]
            .iter()
            .any(|f| win.get(*f).and_then(Value::as_bool).unwrap_or(false));
        if focused
            && let Some(id) = value_u64(win.get("id"))
            && id != current_window_id
        {
            return id;
        }
    }

    for win in windows {
        if let Some(id) = value_u64(win.get("id"))
            && id != current_window_id
        {
            return id;
        }
    }

    windows.first().and_then(|w| value_u64(w.get("id"))).unwrap_or(0)
}
