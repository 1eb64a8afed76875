#![forbid(unsafe_code)]

//! The interaction state machine.
//!
//! A switcher session is short-lived and modal: it starts Active, and ends
//! Committed (focus the selected tab, rewrite the MRU order) or Cancelled
//! (no side effects). The hard part is deciding that the trigger modifier
//! was released on terminals that never say so. Five ordered guard
//! conditions (polled-oracle hysteresis, marker-echo quiet period, cold
//! launch, lost marker, and a stuck-state net) each encode a distinct
//! terminal-capability failure mode, and their constants and evaluation
//! order are deliberate; see the per-guard comments.
//!
//! The event loop is single-threaded and cooperative: one bounded
//! readiness wait over terminal input and the command socket, a 50 ms tick
//! for guard evaluation and preview refreshes, and synchronous handling of
//! everything else. The one blocking call, fetching a tab's screen text,
//! is rate-limited to one per idle tick so input stays responsive.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use tabflip_core::decoder::KeyDecoder;
use tabflip_core::event::{KeyEvent, KeyEventKind, key};
use tabflip_core::logging::{debug, info, warn};
use tabflip_core::modifier_oracle::{ModifierOracle, ctrl_is_down};
use tabflip_preview::render_block_preview;

use crate::command_socket::{CommandServer, SwitchCommand};
use crate::host::{HostControl, TabInfo};
use crate::layout::{self, CardLayout};
use crate::mru;
use crate::session::{EventMux, SessionGuard, TtyInput, take_resize};
use crate::store::{MruStore, PreviewStore, unix_now};
use crate::theme::Theme;

/// Main-loop tick.
pub const TICK: Duration = Duration::from_millis(50);

/// A cached preview is stale once this old.
pub const PREVIEW_REFRESH: Duration = Duration::from_millis(500);

/// Minimum interval between unforced draws.
const DRAW_THROTTLE: Duration = Duration::from_millis(16);

/// Guard 2: marker echoed, modifier never held, no cycle key yet.
const MARKER_QUIET_COMMIT: Duration = Duration::from_millis(150);

/// Guard 3: modifier provably up at launch and nothing happened.
const LAUNCH_COMMIT: Duration = Duration::from_millis(80);

/// Guards 4 and 5: marker never echoed back / no cycle key ever seen.
const STUCK_COMMIT: Duration = Duration::from_millis(200);

/// Oracle hysteresis: consecutive not-held polls before committing.
const CTRL_UP_TICKS: u32 = 2;

/// A ctrl release inside this window with no cycle key is the tail of the
/// invocation chord, not a user release.
const CTRL_RELEASE_GRACE: Duration = Duration::from_millis(200);

/// Window title while the switcher owns the screen.
pub const SWITCHER_TITLE: &str = "TABFLIP_SWITCHER";

/// Placeholder preview size when a fetch fails.
const BLANK_PREVIEW_COLS: usize = 40;
const BLANK_PREVIEW_ROWS: usize = 12;

const QUIT_KEY: u32 = b'q' as u32;

/// Which way the invocation gesture cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Next,
    Prev,
}

impl Direction {
    /// The equivalent relay command.
    #[must_use]
    pub const fn command(self) -> SwitchCommand {
        match self {
            Self::Next => SwitchCommand::Next,
            Self::Prev => SwitchCommand::Prev,
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Focus moved to this tab.
    Committed(u64),
    /// Nothing changed.
    Cancelled,
}

/// Static facts about this invocation.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub direction: Direction,
    pub group_id: u64,
    /// The window this process runs in, for the marker send (0/None when
    /// unknown).
    pub invoking_window: Option<u64>,
}

/// The modal switcher session.
pub struct Switcher<H: HostControl> {
    host: H,
    theme: Theme,
    tabs: Vec<TabInfo>,
    selected: usize,
    original_tab_id: Option<u64>,
    mru_order: Vec<u64>,
    last_used: HashMap<u64, f64>,
    mru_store: MruStore,
    preview_store: PreviewStore,
    preview_cache: HashMap<u64, Vec<String>>,
    preview_ts: HashMap<u64, f64>,
    preview_queue: VecDeque<u64>,
    oracle: ModifierOracle,
    invoking_window: Option<u64>,
    start: Instant,
    last_draw: Option<Instant>,
    dirty: Option<bool>,
    // Commit-heuristic state. `ctrl` here means the trigger modifier.
    ctrl_down: bool,
    ctrl_seen: bool,
    saw_cycle_event: bool,
    any_key_event: bool,
    poll_ctrl_seen: bool,
    ctrl_up_streak: u32,
    marker_seen: bool,
    marker_sent: bool,
    initial_mods_checked: bool,
    initial_ctrl_down: bool,
}

impl<H: HostControl> Switcher<H> {
    /// Build a session over a host-reported tab snapshot.
    pub fn new(
        host: H,
        theme: Theme,
        config: SessionConfig,
        tabs: Vec<TabInfo>,
        persisted_mru: &HashMap<u64, f64>,
        oracle: ModifierOracle,
        mru_store: MruStore,
        preview_store: PreviewStore,
    ) -> Self {
        let (cached, cached_ts) = preview_store.load();
        let now = unix_now();
        let (tabs, last_used) = mru::reconcile(tabs, persisted_mru, now);
        let original_tab_id = mru::active_tab_id(&tabs);
        let mru_order: Vec<u64> = tabs.iter().map(|t| t.id).collect();
        let selected = initial_index(config.direction, tabs.len());
        info!(
            direction = ?config.direction,
            original = ?original_tab_id,
            order = ?mru_order,
            selected,
            "session start"
        );
        Self {
            host,
            theme,
            tabs,
            selected,
            original_tab_id,
            mru_order,
            last_used,
            mru_store,
            preview_store,
            preview_cache: cached,
            preview_ts: cached_ts,
            preview_queue: VecDeque::new(),
            oracle,
            invoking_window: config.invoking_window,
            start: Instant::now(),
            last_draw: None,
            dirty: None,
            ctrl_down: false,
            ctrl_seen: false,
            saw_cycle_event: false,
            any_key_event: false,
            poll_ctrl_seen: false,
            ctrl_up_streak: 0,
            marker_seen: false,
            marker_sent: false,
            initial_mods_checked: false,
            initial_ctrl_down: false,
        }
    }

    /// When the session clock started.
    #[must_use]
    pub const fn started_at(&self) -> Instant {
        self.start
    }

    /// The currently selected tab id.
    #[must_use]
    pub fn selected_tab_id(&self) -> Option<u64> {
        self.tabs.get(self.selected).map(|t| t.id)
    }

    /// The selection cursor.
    #[must_use]
    pub const fn selected_index(&self) -> usize {
        self.selected
    }

    /// Corroboration setup: send the marker key through the host and take
    /// one initial oracle reading. Best-effort on both counts.
    pub fn begin_corroboration(&mut self) {
        if let Some(window) = self.invoking_window.filter(|w| *w != 0) {
            match self.host.send_marker_key(window) {
                Ok(()) => {
                    self.marker_sent = true;
                    debug!(window, "marker key sent");
                }
                Err(err) => warn!(%err, "marker send failed"),
            }
        }
        if let Some(mods) = self.oracle.poll() {
            self.initial_mods_checked = true;
            self.initial_ctrl_down = ctrl_is_down(mods, self.oracle.ctrl_mask());
            debug!(mods, held = self.initial_ctrl_down, "initial modifier state");
        }
        self.schedule_preview_fetch();
    }

    /// Handle one decoded key event. `Some` ends the session.
    pub fn handle_key(&mut self, ev: KeyEvent, now: Instant) -> Option<Outcome> {
        self.any_key_event = true;
        debug!(code = ev.code, mods = ev.mods, kind = ?ev.kind, "key");

        if ev.code == key::MARKER {
            match ev.kind {
                KeyEventKind::Press => {
                    // The echo proves key delivery works and that the host
                    // accepted a synthetic key while we held the modifier.
                    self.marker_seen = true;
                    self.ctrl_down = true;
                    self.ctrl_seen = true;
                    debug!("marker echoed");
                }
                KeyEventKind::Release => self.ctrl_down = false,
                KeyEventKind::Repeat => {}
            }
            return None;
        }

        if key::is_ctrl(ev.code) {
            match ev.kind {
                KeyEventKind::Press => {
                    self.ctrl_down = true;
                    self.ctrl_seen = true;
                }
                KeyEventKind::Release => {
                    self.ctrl_down = false;
                    if self.should_commit_on_ctrl_release(now) {
                        debug!("ctrl release commit");
                        return Some(self.commit());
                    }
                    debug!("early ctrl release ignored");
                }
                KeyEventKind::Repeat => {}
            }
            return None;
        }

        if ev.code == key::ESCAPE && ev.kind == KeyEventKind::Press {
            return Some(self.cancel());
        }

        if ev.code == key::TAB && matches!(ev.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
            self.saw_cycle_event = true;
            if ev.ctrl() {
                self.ctrl_down = true;
            }
            self.move_selection(if ev.shift() { -1 } else { 1 });
            return None;
        }

        if ev.code == QUIT_KEY && ev.kind == KeyEventKind::Press {
            return Some(self.cancel());
        }

        None
    }

    /// Handle a relayed command: identical to the cycle key.
    pub fn handle_command(&mut self, command: SwitchCommand) {
        debug!(?command, "relayed command");
        self.move_selection(match command {
            SwitchCommand::Next => 1,
            SwitchCommand::Prev => -1,
        });
    }

    /// Evaluate the per-tick guard conditions, in their deliberate order.
    /// `Some` ends the session. Call only on idle ticks.
    pub fn on_tick(&mut self, now: Instant) -> Option<Outcome> {
        let elapsed = now.saturating_duration_since(self.start);

        // 1. Oracle hysteresis: held→not-held for two consecutive ticks
        //    after having been seen held.
        if let Some(mods) = self.oracle.poll() {
            if ctrl_is_down(mods, self.oracle.ctrl_mask()) {
                self.poll_ctrl_seen = true;
                self.ctrl_down = true;
                self.ctrl_up_streak = 0;
            } else {
                self.ctrl_up_streak += 1;
                if self.poll_ctrl_seen && self.ctrl_up_streak >= CTRL_UP_TICKS {
                    debug!(streak = self.ctrl_up_streak, "oracle release commit");
                    return Some(self.commit());
                }
            }
        }

        // 2. Marker echoed but the modifier never registered held and no
        //    cycle key arrived: terminals that deliver no release events.
        if self.marker_seen
            && !self.ctrl_down
            && !self.saw_cycle_event
            && elapsed > MARKER_QUIET_COMMIT
        {
            debug!(?elapsed, "marker quiet commit");
            return Some(self.commit());
        }

        // 3. Single-press invocation: the oracle said the modifier was up
        //    at launch and nothing has happened since.
        if !self.marker_sent
            && self.initial_mods_checked
            && !self.initial_ctrl_down
            && !self.saw_cycle_event
            && !self.marker_seen
            && !self.ctrl_seen
            && elapsed > LAUNCH_COMMIT
        {
            debug!(?elapsed, "cold launch commit");
            return Some(self.commit());
        }

        // 4. Marker sent but never echoed: the corroboration path is
        //    unsupported here.
        if self.marker_sent && !self.any_key_event && !self.marker_seen && elapsed > STUCK_COMMIT {
            debug!(?elapsed, "lost marker commit");
            return Some(self.commit());
        }

        // 5. Safety net: keys arrive but no cycle key and no held modifier.
        if self.any_key_event
            && !self.saw_cycle_event
            && !self.ctrl_down
            && elapsed > STUCK_COMMIT
        {
            debug!(?elapsed, "stuck session commit");
            return Some(self.commit());
        }

        None
    }

    fn should_commit_on_ctrl_release(&self, now: Instant) -> bool {
        // A release right after launch with no cycling is the invocation
        // chord itself being let go.
        self.saw_cycle_event || now.saturating_duration_since(self.start) > CTRL_RELEASE_GRACE
    }

    /// Commit to the selected tab.
    fn commit(&mut self) -> Outcome {
        let Some(tab_id) = self.selected_tab_id() else {
            return self.cancel();
        };
        info!(tab_id, "commit");
        let (new_order, scores) =
            mru::committed_order(&self.mru_order, tab_id, self.original_tab_id, unix_now());
        self.mru_order = new_order;
        self.last_used = scores;
        if let Err(err) = self.mru_store.save(&self.last_used) {
            warn!(%err, "MRU save failed");
        }
        if let Err(err) = self.host.focus_tab(tab_id) {
            warn!(%err, tab_id, "focus switch failed");
        }
        Outcome::Committed(tab_id)
    }

    /// Abandon the session; the original tab keeps focus implicitly.
    fn cancel(&mut self) -> Outcome {
        info!("cancel");
        Outcome::Cancelled
    }

    fn move_selection(&mut self, delta: isize) {
        if self.tabs.is_empty() {
            return;
        }
        let len = self.tabs.len() as isize;
        let before = self.selected;
        self.selected = (self.selected as isize + delta).rem_euclid(len) as usize;
        debug!(before, after = self.selected, "selection moved");
        self.mark_dirty(true);
        self.ensure_preview_cache();
        self.schedule_preview_fetch();
    }

    /// Selection neighborhood: the selected index and its immediate
    /// neighbors, modulo wraparound.
    fn neighborhood(&self) -> Vec<usize> {
        let len = self.tabs.len();
        if len == 0 {
            return Vec::new();
        }
        let mut indices = vec![self.selected];
        for idx in [
            (self.selected + len - 1) % len,
            (self.selected + 1) % len,
        ] {
            if !indices.contains(&idx) {
                indices.push(idx);
            }
        }
        indices
    }

    /// Fetch previews the neighborhood has no cache entry for at all.
    /// Blocking, but only on a cache miss.
    fn ensure_preview_cache(&mut self) {
        for idx in self.neighborhood() {
            let tab = self.tabs[idx].clone();
            if !self.preview_cache.contains_key(&tab.id) {
                let lines = self.fetch_preview(&tab);
                self.preview_cache.insert(tab.id, lines);
                self.preview_ts.insert(tab.id, unix_now());
                self.persist_previews();
            }
        }
    }

    /// Queue stale neighborhood previews for idle-tick refresh.
    fn schedule_preview_fetch(&mut self) {
        let now = unix_now();
        for idx in self.neighborhood() {
            let tab_id = self.tabs[idx].id;
            if self.preview_stale(tab_id, now) && !self.preview_queue.contains(&tab_id) {
                self.preview_queue.push_back(tab_id);
            }
        }
        debug!(queued = self.preview_queue.len(), "preview queue");
    }

    fn preview_stale(&self, tab_id: u64, now: f64) -> bool {
        if !self.preview_cache.contains_key(&tab_id) {
            return true;
        }
        let ts = self.preview_ts.get(&tab_id).copied().unwrap_or(0.0);
        now - ts >= PREVIEW_REFRESH.as_secs_f64()
    }

    /// Refresh at most one queued preview. Returns whether anything was
    /// fetched (and a redraw is warranted).
    pub fn drain_preview_queue(&mut self) -> bool {
        let Some(tab_id) = self.preview_queue.pop_front() else {
            return false;
        };
        let Some(tab) = self.tabs.iter().find(|t| t.id == tab_id).cloned() else {
            return false;
        };
        if !self.preview_stale(tab.id, unix_now()) {
            return false;
        }
        debug!(tab_id, window_id = tab.window_id, "preview refresh");
        let lines = self.fetch_preview(&tab);
        self.preview_cache.insert(tab.id, lines);
        self.preview_ts.insert(tab.id, unix_now());
        self.persist_previews();
        true
    }

    fn fetch_preview(&self, tab: &TabInfo) -> Vec<String> {
        match self.host.fetch_screen_text(tab.window_id, true) {
            Ok(lines) if !lines.is_empty() => lines,
            Ok(_) => {
                debug!(tab_id = tab.id, "empty capture, blank preview");
                blank_preview()
            }
            Err(err) => {
                warn!(%err, tab_id = tab.id, "capture failed, blank preview");
                blank_preview()
            }
        }
    }

    fn persist_previews(&self) {
        if let Err(err) = self.preview_store.save(&self.preview_cache, &self.preview_ts) {
            warn!(%err, "preview cache save failed");
        }
    }

    /// Request a redraw; `force` bypasses the throttle.
    pub fn mark_dirty(&mut self, force: bool) {
        self.dirty = Some(self.dirty.unwrap_or(false) || force);
    }

    /// Draw if a redraw is pending and the throttle allows.
    pub fn draw_if_dirty(
        &mut self,
        out: &mut impl Write,
        rows: usize,
        cols: usize,
        now: Instant,
    ) -> io::Result<()> {
        let Some(force) = self.dirty else {
            return Ok(());
        };
        if !force
            && let Some(last) = self.last_draw
            && now.saturating_duration_since(last) < DRAW_THROTTLE
        {
            return Ok(());
        }
        self.dirty = None;
        self.last_draw = Some(now);
        self.draw(out, rows, cols)
    }

    /// Draw the full frame.
    pub fn draw(&mut self, out: &mut impl Write, rows: usize, cols: usize) -> io::Result<()> {
        write!(out, "\x1b[?25l\x1b[2J\x1b[H")?;
        if self.tabs.is_empty() {
            write!(out, "\x1b[HNo tabs")?;
            return out.flush();
        }

        let lay = layout::compute_layout(&self.theme, rows, cols, self.tabs.len());
        let window = layout::visible_window(self.tabs.len(), self.selected, lay.max_cards);
        let count = window.len();
        let total_w = count * lay.card_w + count.saturating_sub(1) * lay.gap;
        let start_x = layout::row_start_x(self.theme.align, cols, total_w);
        let start_y = layout::row_start_y(self.theme.vertical_align, rows, lay.card_h);

        // Stale visible previews go on the refresh queue opportunistically.
        let now = unix_now();
        for idx in window.clone() {
            let tab_id = self.tabs[idx].id;
            if self.preview_stale(tab_id, now) && !self.preview_queue.contains(&tab_id) {
                self.preview_queue.push_back(tab_id);
            }
        }

        for (slot, idx) in window.enumerate() {
            let tab = self.tabs[idx].clone();
            let x = start_x + slot * (lay.card_w + lay.gap);
            let selected = idx == self.selected;
            self.draw_card(out, &tab, x, start_y, &lay, selected, rows, cols)?;
        }
        write!(out, "\x1b[?25l")?;
        out.flush()
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_card(
        &self,
        out: &mut impl Write,
        tab: &TabInfo,
        x: usize,
        y: usize,
        lay: &CardLayout,
        selected: bool,
        rows: usize,
        cols: usize,
    ) -> io::Result<()> {
        let border = if selected {
            &self.theme.border_selected
        } else {
            &self.theme.border
        };
        let w = lay.card_w;
        let title = layout::format_title(&self.theme, &tab.title, w.saturating_sub(4));

        let top = format!(
            "{}{}{}",
            border.tl,
            border.h.repeat(w.saturating_sub(2)),
            border.tr
        );
        let mid = format!("{}{}{}", border.v, " ".repeat(w.saturating_sub(2)), border.v);
        let bottom = format!(
            "{}{}{}",
            border.bl,
            border.h.repeat(w.saturating_sub(2)),
            border.br
        );

        write_at(out, rows, cols, y + 1, x + 1, &top, selected)?;
        write_at(out, rows, cols, y + 2, x + 1, &mid, selected)?;
        let invert_title = selected && self.theme.title_invert_selected;
        write_at(out, rows, cols, y + 2, x + 3, &title, invert_title)?;
        if !lay.title_only {
            for r in 0..lay.preview_rows {
                write_at(out, rows, cols, y + 3 + r, x + 1, &mid, selected)?;
            }
        }
        write_at(out, rows, cols, y + lay.card_h, x + 1, &bottom, selected)?;

        if !lay.title_only {
            let raw_lines = self.preview_cache.get(&tab.id).cloned().unwrap_or_default();
            let preview = render_block_preview(
                &raw_lines,
                lay.preview_cols,
                lay.preview_rows,
                self.theme.preview_color_mode,
            );
            for (r, line) in preview.iter().take(lay.preview_rows).enumerate() {
                let clipped = layout::clip_preview_line(line, lay.preview_cols);
                write_at(out, rows, cols, y + 3 + r, x + 3, &clipped, false)?;
            }
        }
        Ok(())
    }
}

/// Write text at a 1-based screen position, clamped to the screen. Plain
/// text is clipped to the remaining width; escape-laden text is trusted to
/// have been clipped already.
#[allow(clippy::too_many_arguments)]
fn write_at(
    out: &mut impl Write,
    rows: usize,
    cols: usize,
    row: usize,
    col: usize,
    text: &str,
    invert: bool,
) -> io::Result<()> {
    if row < 1 || row > rows || col < 1 || col > cols {
        return Ok(());
    }
    let max_len = cols - col + 1;
    let text = if !text.contains('\x1b') && text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>()
    } else {
        text.to_string()
    };
    if invert {
        write!(out, "\x1b[{row};{col}H\x1b[7m{text}\x1b[0m")
    } else {
        write!(out, "\x1b[{row};{col}H{text}")
    }
}

fn blank_preview() -> Vec<String> {
    vec![" ".repeat(BLANK_PREVIEW_COLS); BLANK_PREVIEW_ROWS]
}

const fn initial_index(direction: Direction, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    match direction {
        Direction::Next => 1 % len,
        Direction::Prev => len - 1,
    }
}

/// Drive a session against the real terminal until it resolves.
pub fn run_session<H: HostControl>(
    switcher: &mut Switcher<H>,
    input: &mut TtyInput,
    mux: &mut EventMux,
    server: Option<&CommandServer>,
    resize: &AtomicBool,
    out: &mut impl Write,
) -> io::Result<Outcome> {
    let decoder = KeyDecoder::new();
    switcher.begin_corroboration();
    let (rows, cols) = SessionGuard::screen_size();
    switcher.draw(out, rows, cols)?;

    loop {
        let readiness = mux.wait(input, TICK);
        let now = Instant::now();

        if readiness.is_tick() {
            if take_resize(resize) {
                switcher.mark_dirty(true);
            }
            if switcher.drain_preview_queue() {
                switcher.mark_dirty(false);
            }
            if let Some(outcome) = switcher.on_tick(now) {
                return Ok(outcome);
            }
        }

        if readiness.command
            && let Some(server) = server
        {
            while let Some(command) = server.recv() {
                switcher.handle_command(command);
            }
        }

        if readiness.input {
            loop {
                if let Some(ev) = decoder.decode(input)
                    && let Some(outcome) = switcher.handle_key(ev, now)
                {
                    return Ok(outcome);
                }
                if !input.has_buffered() {
                    break;
                }
            }
        }

        let (rows, cols) = SessionGuard::screen_size();
        switcher.draw_if_dirty(out, rows, cols, Instant::now())?;
    }
}
