#![forbid(unsafe_code)]

//! ANSI cell parser.
//!
//! Converts captured (possibly color-escaped) screen lines into a row-major
//! grid of [`Cell`]s. Colors reset at the start of every source line so a
//! truncated capture can never bleed styling across lines. OSC sequences are
//! skipped wholesale; CSI sequences are interpreted as SGR color state, with
//! unrecognized or partial sequences consumed up to the next `m` or dropped
//! at end of line. Parsing never fails.
//!
//! Width classification: combining marks and control characters occupy no
//! cell, East-Asian wide/fullwidth glyphs occupy two (a real cell plus a
//! zero-width continuation), and private-use glyphs (icon fonts, powerline
//! symbols) are treated as wide but substituted with a blank of unset
//! foreground, since their rendered shape is unknowable and their colors
//! smear badly when downsampled.

use unicode_width::UnicodeWidthChar;

use crate::color::{Rgb, ansi_16, ansi_256};

/// One screen cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    /// The glyph, or `None` for the continuation half of a wide glyph.
    pub glyph: Option<char>,
    /// Foreground color, if any SGR set one.
    pub fg: Option<Rgb>,
    /// Background color, if any SGR set one.
    pub bg: Option<Rgb>,
}

impl Cell {
    /// A plain space with no colors.
    pub const BLANK: Self = Self {
        glyph: Some(' '),
        fg: None,
        bg: None,
    };

    const fn new(glyph: char, fg: Option<Rgb>, bg: Option<Rgb>) -> Self {
        Self {
            glyph: Some(glyph),
            fg,
            bg,
        }
    }

    const fn continuation(fg: Option<Rgb>, bg: Option<Rgb>) -> Self {
        Self {
            glyph: None,
            fg,
            bg,
        }
    }

    /// Whether this cell counts toward fill density. Continuation cells do:
    /// the wide glyph they belong to covers them.
    #[must_use]
    pub fn is_fill(&self) -> bool {
        self.glyph != Some(' ')
    }

    /// Whether this cell holds visible content (a real non-blank glyph).
    #[must_use]
    pub fn is_content(&self) -> bool {
        self.glyph.is_some_and(|c| !c.is_whitespace())
    }
}

/// Parse raw screen lines into a cell grid. One output row per input line.
#[must_use]
pub fn parse_ansi_grid(lines: &[String]) -> Vec<Vec<Cell>> {
    lines.iter().map(|line| parse_line(line)).collect()
}

fn parse_line(line: &str) -> Vec<Cell> {
    let chars: Vec<char> = line.chars().collect();
    let mut cells: Vec<Cell> = Vec::with_capacity(chars.len());
    let mut fg: Option<Rgb> = None;
    let mut bg: Option<Rgb> = None;
    let mut col = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let ch = chars[i];

        if ch == '\x1b' && chars.get(i + 1) == Some(&']') {
            // OSC (hyperlinks and friends): skip to BEL or ST, or drop the
            // rest of the line when unterminated.
            let Some(next) = skip_osc(&chars, i) else {
                break;
            };
            i = next;
            continue;
        }

        if ch == '\x1b' && chars.get(i + 1) == Some(&'[') {
            let Some(end) = find_char(&chars, i + 2, 'm') else {
                i += 1;
                continue;
            };
            apply_sgr(&chars[i + 2..end], &mut fg, &mut bg);
            i = end + 1;
            continue;
        }

        if ch == '\t' {
            let spaces = 8 - (col % 8);
            for _ in 0..spaces {
                cells.push(Cell::new(' ', fg, bg));
            }
            col += spaces;
            i += 1;
            continue;
        }

        if ch == '\r' {
            col = 0;
            i += 1;
            continue;
        }

        let private = is_private_use(ch);
        let width = char_cell_width(ch);
        if width == 0 {
            i += 1;
            continue;
        }
        let glyph = if private {
            // Keep the background only; the glyph itself is unknowable.
            fg = None;
            ' '
        } else {
            ch
        };
        cells.push(Cell::new(glyph, fg, bg));
        if width == 2 {
            cells.push(Cell::continuation(fg, bg));
            col += 2;
        } else {
            col += 1;
        }
        i += 1;
    }

    cells
}

/// Advance past an OSC sequence starting at `start` (which points at ESC).
/// Returns the index after the terminator, or `None` when unterminated.
fn skip_osc(chars: &[char], start: usize) -> Option<usize> {
    let bel = find_char(chars, start + 2, '\x07');
    let st = find_st(chars, start + 2);
    match (bel, st) {
        (None, None) => None,
        (Some(b), None) => Some(b + 1),
        (None, Some(s)) => Some(s + 2),
        (Some(b), Some(s)) => Some((b + 1).min(s + 2)),
    }
}

fn find_char(chars: &[char], from: usize, needle: char) -> Option<usize> {
    chars
        .get(from..)
        .and_then(|tail| tail.iter().position(|&c| c == needle))
        .map(|pos| from + pos)
}

/// Find `ESC \` (the ST terminator) at or after `from`.
fn find_st(chars: &[char], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == '\x1b' && chars[i + 1] == '\\' {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Outcome of parsing a `38`/`48` extended color introducer.
enum ExtColor {
    /// Malformed: leave the current color untouched.
    Keep,
    /// Parsed: set the channel to this (possibly unset) color.
    Set(Option<Rgb>),
}

/// Apply one SGR parameter string (the bytes between `CSI` and `m`) to the
/// running color state.
fn apply_sgr(seq: &[char], fg: &mut Option<Rgb>, bg: &mut Option<Rgb>) {
    let seq: String = seq.iter().collect();
    if seq.is_empty() {
        *fg = None;
        *bg = None;
        return;
    }

    // Both `;` and `:` separate parameters in the wild.
    let parts: Vec<&str> = seq
        .split(';')
        .flat_map(|p| p.split(':'))
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        *fg = None;
        *bg = None;
        return;
    }

    let mut j = 0;
    while j < parts.len() {
        match parts[j] {
            "0" => {
                *fg = None;
                *bg = None;
            }
            "39" => *fg = None,
            "49" => *bg = None,
            "38" => {
                let (color, consumed) = parse_extended_color(&parts[j..]);
                if let ExtColor::Set(c) = color {
                    *fg = c;
                }
                j += consumed;
            }
            "48" => {
                let (color, consumed) = parse_extended_color(&parts[j..]);
                if let ExtColor::Set(c) = color {
                    *bg = c;
                }
                j += consumed;
            }
            code => {
                if let Ok(value) = code.parse::<u32>() {
                    match value {
                        30..=37 | 90..=97 => *fg = ansi_16(value),
                        40..=47 | 100..=107 => *bg = ansi_16(value - 10),
                        // Some terminals emit 0-7 instead of 30-37.
                        0..=7 => *fg = ansi_16(30 + value),
                        _ => {}
                    }
                }
            }
        }
        j += 1;
    }
}

/// Parse `38;2;r;g;b` / `38;5;n` style tails. `parts[0]` is the introducer.
/// Returns the outcome plus how many extra parameters were consumed.
fn parse_extended_color(parts: &[&str]) -> (ExtColor, usize) {
    if parts.len() >= 5 && parts[1] == "2" {
        let rgb = (|| {
            let r = parts[2].parse::<u8>().ok()?;
            let g = parts[3].parse::<u8>().ok()?;
            let b = parts[4].parse::<u8>().ok()?;
            Some(Rgb::new(r, g, b))
        })();
        let outcome = match rgb {
            Some(c) => ExtColor::Set(Some(c)),
            None => ExtColor::Keep,
        };
        return (outcome, 4);
    }
    if parts.len() >= 3 && parts[1] == "5" {
        let outcome = match parts[2].parse::<u32>() {
            Ok(idx) => ExtColor::Set(ansi_256(idx)),
            Err(_) => ExtColor::Keep,
        };
        return (outcome, 2);
    }
    (ExtColor::Keep, 0)
}

/// Cell width of one character: 0 (combining/control), 1, or 2.
fn char_cell_width(ch: char) -> usize {
    if is_private_use(ch) {
        // Nerd-font and powerline glyphs render wide in terminals.
        return 2;
    }
    UnicodeWidthChar::width(ch).unwrap_or(0)
}

const fn is_private_use(ch: char) -> bool {
    matches!(
        ch as u32,
        0xE000..=0xF8FF | 0xF0000..=0xFFFFD | 0x10_0000..=0x10_FFFD
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(lines: &[&str]) -> Vec<Vec<Cell>> {
        let owned: Vec<String> = lines.iter().map(|s| (*s).to_string()).collect();
        parse_ansi_grid(&owned)
    }

    fn glyphs(row: &[Cell]) -> String {
        row.iter().map(|c| c.glyph.unwrap_or('·')).collect()
    }

    #[test]
    fn plain_text_cells() {
        let g = grid(&["ab c"]);
        assert_eq!(g.len(), 1);
        assert_eq!(glyphs(&g[0]), "ab c");
        assert!(g[0].iter().all(|c| c.fg.is_none() && c.bg.is_none()));
    }

    #[test]
    fn truecolor_sgr_applies_and_resets() {
        let g = grid(&["\x1b[38;2;10;20;30mab\x1b[0mc"]);
        let red = Rgb::new(10, 20, 30);
        assert_eq!(g[0][0].fg, Some(red));
        assert_eq!(g[0][1].fg, Some(red));
        assert_eq!(g[0][2].fg, None);
    }

    #[test]
    fn palette_sgr_forms() {
        let g = grid(&["\x1b[31ma\x1b[39mb\x1b[44mc\x1b[49md\x1b[38;5;196me"]);
        assert_eq!(g[0][0].fg, ansi_16(31));
        assert_eq!(g[0][1].fg, None);
        assert_eq!(g[0][2].bg, ansi_16(34));
        assert_eq!(g[0][3].bg, None);
        assert_eq!(g[0][4].fg, Some(Rgb::new(255, 0, 0)));
    }

    #[test]
    fn bare_low_codes_set_foreground() {
        let g = grid(&["\x1b[1ma\x1b[7mb"]);
        assert_eq!(g[0][0].fg, ansi_16(31));
        assert_eq!(g[0][1].fg, ansi_16(37));
    }

    #[test]
    fn colon_separated_params() {
        let g = grid(&["\x1b[38:2:10:20:30ma"]);
        assert_eq!(g[0][0].fg, Some(Rgb::new(10, 20, 30)));
    }

    #[test]
    fn colors_never_bleed_across_lines() {
        let g = grid(&["\x1b[31mred", "plain"]);
        assert_eq!(g[0][0].fg, ansi_16(31));
        assert!(g[1].iter().all(|c| c.fg.is_none()));
    }

    #[test]
    fn osc_sequences_emit_no_cells() {
        let g = grid(&["\x1b]8;;http://x\x07link\x1b]8;;\x07"]);
        assert_eq!(glyphs(&g[0]), "link");
        let g = grid(&["\x1b]0;title\x1b\\after"]);
        assert_eq!(glyphs(&g[0]), "after");
    }

    #[test]
    fn unterminated_osc_drops_rest_of_line() {
        let g = grid(&["ab\x1b]0;title with no end"]);
        assert_eq!(glyphs(&g[0]), "ab");
    }

    #[test]
    fn tabs_expand_to_eight_column_stops() {
        let g = grid(&["a\tb"]);
        assert_eq!(glyphs(&g[0]), "a       b");
        let g = grid(&["\tb"]);
        assert_eq!(glyphs(&g[0]), "        b");
    }

    #[test]
    fn carriage_return_resets_tab_stops_only() {
        // CR rewinds the column counter without clearing emitted cells.
        let g = grid(&["abc\r\tz"]);
        assert_eq!(glyphs(&g[0]), "abc        z");
    }

    #[test]
    fn wide_glyphs_emit_continuation_cells() {
        let g = grid(&["漢a"]);
        assert_eq!(g[0].len(), 3);
        assert_eq!(g[0][0].glyph, Some('漢'));
        assert_eq!(g[0][1].glyph, None);
        assert_eq!(g[0][2].glyph, Some('a'));
        assert!(g[0][1].is_fill());
        assert!(!g[0][1].is_content());
    }

    #[test]
    fn combining_marks_are_dropped() {
        let g = grid(&["e\u{0301}x"]);
        assert_eq!(glyphs(&g[0]), "ex");
    }

    #[test]
    fn control_chars_are_dropped() {
        let g = grid(&["a\u{0001}b\u{007f}c"]);
        assert_eq!(glyphs(&g[0]), "abc");
    }

    #[test]
    fn private_use_glyphs_are_neutralized() {
        // Powerline branch symbol: wide, blanked, foreground discarded.
        let g = grid(&["\x1b[31m\u{e0a0}x"]);
        assert_eq!(g[0].len(), 3);
        assert_eq!(g[0][0].glyph, Some(' '));
        assert_eq!(g[0][0].fg, None);
        // The running foreground was cleared for subsequent cells too.
        assert_eq!(g[0][2].fg, None);
    }

    #[test]
    fn private_use_keeps_background() {
        let g = grid(&["\x1b[41m\u{e0b0}"]);
        assert_eq!(g[0][0].bg, ansi_16(31));
        assert_eq!(g[0][1].bg, ansi_16(31));
    }

    #[test]
    fn malformed_sgr_is_harmless() {
        let g = grid(&["\x1b[38;2;300;0;0mab"]);
        // Unparseable channel: color left untouched.
        assert_eq!(g[0][0].fg, None);
        assert_eq!(glyphs(&g[0]), "ab");
    }

    #[test]
    fn out_of_range_palette_index_unsets() {
        let g = grid(&["\x1b[31m\x1b[38;5;999ma"]);
        assert_eq!(g[0][0].fg, None);
    }
}
