#![forbid(unsafe_code)]

//! Block downsampler/renderer.
//!
//! Reduces captured screen text to a small card using the three half-block
//! glyphs (`▀`, `▄`, `█`). Each output row represents two logical source
//! rows, with the upper and lower half filling independently, so a card
//! shows roughly twice the vertical detail of its row count.
//!
//! Sub-rectangles are computed by proportional index mapping rather than a
//! fixed ratio, so sources that do not divide evenly still map
//! monotonically. A sub-rectangle renders filled when at least
//! [`FILL_THRESHOLD`] of its cells hold non-blank glyphs, or when any
//! background color is present (background fill is visually significant
//! even over blank text). A foreground color is attributed only when at
//! least [`COLOR_THRESHOLD`] of the filled cells agree on one, so sparse
//! colored diacritics render as plain fill instead of noise.

use crate::color::Rgb;
use crate::grid::{Cell, parse_ansi_grid};

/// Minimum fraction of non-blank cells for a sub-rectangle to render filled.
pub const FILL_THRESHOLD: f64 = 0.2;

/// Minimum fraction of filled cells sharing a foreground color for that
/// color to be attributed.
pub const COLOR_THRESHOLD: f64 = 0.35;

const UPPER_HALF: char = '▀';
const LOWER_HALF: char = '▄';
const FULL_BLOCK: char = '█';
const SGR_RESET: &str = "\x1b[0m";

/// Which color channels the rendered card carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorMode {
    /// Plain glyphs only.
    None,
    /// Foreground colors only.
    Fg,
    /// Background colors only.
    Bg,
    /// Both channels.
    #[default]
    Both,
}

impl ColorMode {
    /// Parse the theme's string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "fg" => Some(Self::Fg),
            "bg" => Some(Self::Bg),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    const fn wants_fg(self) -> bool {
        matches!(self, Self::Fg | Self::Both)
    }

    const fn wants_bg(self) -> bool {
        matches!(self, Self::Bg | Self::Both)
    }
}

/// One downsampled sub-rectangle of the colored path.
#[derive(Debug, Clone, Copy, Default)]
struct Sample {
    filled: bool,
    fg: Option<Rgb>,
    bg: Option<Rgb>,
}

/// Render captured lines into a `cols` × `rows` card.
///
/// Lines containing CSI sequences take the colored path (parse to a cell
/// grid, tally colors per sub-rectangle); plain text takes a cheaper
/// fill-mask path. Trailing all-blank rows are trimmed first so a mostly
/// empty screen fills the card with its actual content.
#[must_use]
pub fn render_block_preview(
    lines: &[String],
    cols: usize,
    rows: usize,
    mode: ColorMode,
) -> Vec<String> {
    if rows == 0 || cols == 0 {
        return Vec::new();
    }

    if lines.iter().any(|line| line.contains("\x1b[")) {
        render_colored(lines, cols, rows, mode)
    } else {
        render_plain(lines, cols, rows)
    }
}

fn render_colored(lines: &[String], cols: usize, rows: usize, mode: ColorMode) -> Vec<String> {
    let grid = parse_ansi_grid(lines);
    let content_rows = content_row_count(&grid);
    let effective_rows = content_rows.min(rows * 2);
    let mask = downsample_color(&grid[..content_rows.min(grid.len())], cols, effective_rows);

    let blank_row = vec![Sample::default(); cols];
    let mut out = Vec::with_capacity(rows);
    for r in 0..rows {
        let upper = mask.get(r * 2).unwrap_or(&blank_row);
        let lower = mask.get(r * 2 + 1).unwrap_or(&blank_row);
        let mut row = String::with_capacity(cols * 8);
        for c in 0..cols {
            let up = upper[c];
            let lo = lower[c];
            let (ch, mut fg, mut bg) = match (up.filled, lo.filled) {
                (true, true) => (FULL_BLOCK, up.fg.or(lo.fg), up.bg.or(lo.bg)),
                (true, false) => (UPPER_HALF, up.fg, up.bg),
                (false, true) => (LOWER_HALF, lo.fg, lo.bg),
                (false, false) => (' ', None, None),
            };
            // A pure background block still has to be visible: promote the
            // background to the glyph color when no text color was won.
            if fg.is_none() && bg.is_some() {
                fg = bg;
                bg = None;
            }
            if mode == ColorMode::None {
                row.push_str(SGR_RESET);
                row.push(ch);
                continue;
            }
            let mut seq = String::new();
            if mode.wants_fg()
                && let Some(color) = fg
            {
                seq.push_str(&color.fg_sequence());
            }
            if mode.wants_bg()
                && let Some(color) = bg
            {
                seq.push_str(&color.bg_sequence());
            }
            if seq.is_empty() {
                row.push_str(SGR_RESET);
                row.push(ch);
            } else {
                row.push_str(&seq);
                row.push(ch);
                row.push_str(SGR_RESET);
            }
        }
        out.push(row);
    }
    out
}

fn render_plain(lines: &[String], cols: usize, rows: usize) -> Vec<String> {
    let content_rows = plain_content_row_count(lines);
    let effective_rows = content_rows.min(rows * 2);
    let mask = downsample_mask(&lines[..content_rows.min(lines.len())], cols, effective_rows);

    let blank_row = vec![false; cols];
    let mut out = Vec::with_capacity(rows);
    for r in 0..rows {
        let upper = mask.get(r * 2).unwrap_or(&blank_row);
        let lower = mask.get(r * 2 + 1).unwrap_or(&blank_row);
        let row: String = (0..cols)
            .map(|c| match (upper[c], lower[c]) {
                (true, true) => FULL_BLOCK,
                (true, false) => UPPER_HALF,
                (false, true) => LOWER_HALF,
                (false, false) => ' ',
            })
            .collect();
        out.push(row);
    }
    out
}

/// Content height of a cell grid: index of the last row holding any real
/// glyph, plus one. Minimum 1 for non-empty input.
fn content_row_count(grid: &[Vec<Cell>]) -> usize {
    for idx in (0..grid.len()).rev() {
        if grid[idx].iter().any(Cell::is_content) {
            return idx + 1;
        }
    }
    grid.len().min(1)
}

fn plain_content_row_count(lines: &[String]) -> usize {
    for idx in (0..lines.len()).rev() {
        if !lines[idx].trim().is_empty() {
            return idx + 1;
        }
    }
    lines.len().min(1)
}

/// Proportional index mapping: the source span `[lo, hi)` feeding output
/// index `i` of `count`, guaranteed non-empty and monotonic.
fn span(i: usize, count: usize, src: usize) -> (usize, usize) {
    let lo = i * src / count;
    let mut hi = (i + 1) * src / count;
    if hi <= lo {
        hi = src.min(lo + 1);
    }
    (lo, hi)
}

/// Downsample plain lines to a boolean fill mask.
fn downsample_mask(lines: &[String], cols: usize, rows: usize) -> Vec<Vec<bool>> {
    if rows == 0 || cols == 0 {
        return Vec::new();
    }
    if lines.is_empty() {
        return vec![vec![false; cols]; rows];
    }
    let chars: Vec<Vec<char>> = lines.iter().map(|l| l.chars().collect()).collect();
    let max_len = chars.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let src_rows = chars.len();

    let mut out = Vec::with_capacity(rows);
    for r in 0..rows {
        let (r0, r1) = span(r, rows, src_rows);
        let mut row_bits = Vec::with_capacity(cols);
        for c in 0..cols {
            let (c0, c1) = span(c, cols, max_len);
            let mut filled = 0usize;
            let mut total = 0usize;
            for line in &chars[r0..r1] {
                for sc in c0..c1 {
                    total += 1;
                    if line.get(sc).is_some_and(|&ch| ch != ' ') {
                        filled += 1;
                    }
                }
            }
            row_bits.push(filled > 0 && ratio(filled, total) >= FILL_THRESHOLD);
        }
        out.push(row_bits);
    }
    out
}

/// Downsample a cell grid, tallying per-sub-rectangle color majorities.
fn downsample_color(grid: &[Vec<Cell>], cols: usize, rows: usize) -> Vec<Vec<Sample>> {
    if rows == 0 || cols == 0 {
        return Vec::new();
    }
    if grid.is_empty() {
        return vec![vec![Sample::default(); cols]; rows];
    }
    let max_len = grid.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let src_rows = grid.len();

    let mut out = Vec::with_capacity(rows);
    for r in 0..rows {
        let (r0, r1) = span(r, rows, src_rows);
        let mut row = Vec::with_capacity(cols);
        for c in 0..cols {
            let (c0, c1) = span(c, cols, max_len);
            let mut filled = 0usize;
            let mut total = 0usize;
            let mut colored = 0usize;
            let mut bg_filled = 0usize;
            let mut fg_counts = ColorTally::new();
            let mut bg_counts = ColorTally::new();
            for src_row in &grid[r0..r1] {
                for sc in c0..c1 {
                    total += 1;
                    let cell = src_row.get(sc).copied().unwrap_or(Cell::BLANK);
                    if cell.is_fill() {
                        filled += 1;
                        if let Some(color) = cell.fg {
                            fg_counts.add(color);
                            colored += 1;
                        }
                    }
                    if let Some(color) = cell.bg {
                        bg_filled += 1;
                        bg_counts.add(color);
                    }
                }
            }
            let is_filled =
                (filled > 0 && ratio(filled, total) >= FILL_THRESHOLD) || bg_filled > 0;
            if is_filled {
                let fg = if ratio(colored, filled) >= COLOR_THRESHOLD {
                    fg_counts.majority()
                } else {
                    None
                };
                row.push(Sample {
                    filled: true,
                    fg,
                    bg: bg_counts.majority(),
                });
            } else {
                row.push(Sample::default());
            }
        }
        out.push(row);
    }
    out
}

fn ratio(num: usize, den: usize) -> f64 {
    num as f64 / den.max(1) as f64
}

/// Occurrence counts in first-seen order, so majority ties break
/// deterministically toward the color seen first.
struct ColorTally(Vec<(Rgb, usize)>);

impl ColorTally {
    const fn new() -> Self {
        Self(Vec::new())
    }

    fn add(&mut self, color: Rgb) {
        if let Some(entry) = self.0.iter_mut().find(|(c, _)| *c == color) {
            entry.1 += 1;
        } else {
            self.0.push((color, 1));
        }
    }

    fn majority(&self) -> Option<Rgb> {
        let mut best: Option<(Rgb, usize)> = None;
        for &(color, count) in &self.0 {
            if best.is_none_or(|(_, b)| count > b) {
                best = Some((color, count));
            }
        }
        best.map(|(color, _)| color)
    }
}
