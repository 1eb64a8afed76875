#![forbid(unsafe_code)]

//! Card row geometry and text fitting.
//!
//! Pure layout math: how many cards fit, how wide each is, when previews
//! must shrink or give way to title-only cards, and how titles and
//! ANSI-styled preview lines are clipped to a width. All functions are
//! deterministic in their inputs; the switcher owns the drawing itself.

use crate::theme::{Align, Theme, WrapMode};

/// Upper bound on simultaneously visible cards; beyond this the row becomes
/// a window centered on the selection.
pub const MAX_VISIBLE_CARDS: usize = 7;

/// Resolved card-row geometry for one screen size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardLayout {
    /// Interior preview width (0 when title-only).
    pub preview_cols: usize,
    /// Interior preview height (0 when title-only).
    pub preview_rows: usize,
    /// Full card width including borders.
    pub card_w: usize,
    /// Full card height including borders and title row.
    pub card_h: usize,
    /// Gap between adjacent cards.
    pub gap: usize,
    /// How many cards are shown at once.
    pub max_cards: usize,
    /// Whether previews were dropped entirely.
    pub title_only: bool,
}

/// Compute the card geometry for a `rows` × `cols` screen holding
/// `tab_count` tabs.
///
/// Fitting order: preview rows shrink toward the theme minimum to fit
/// height; the gap degrades (theme → 1 → 0) and card width shrinks to fit
/// all visible cards across; when the preview area would fall below the
/// theme's minimum columns or the card still cannot fit, cards degrade to
/// title-only.
#[must_use]
pub fn compute_layout(theme: &Theme, rows: usize, cols: usize, tab_count: usize) -> CardLayout {
    let max_height = rows.saturating_sub(2).max(1);
    let max_width = cols.saturating_sub(2).max(1);
    let target_cards = tab_count.clamp(1, MAX_VISIBLE_CARDS);

    let mut preview_rows = theme.preview_rows;
    while preview_rows + 3 > max_height && preview_rows > theme.min_preview_rows {
        preview_rows -= 1;
    }

    let mut gap = theme.gap;
    let mut card_w = 0usize;
    let mut fitted = false;
    for gap_try in [theme.gap, 1, 0] {
        gap = gap_try;
        let Some(available) = max_width.checked_sub(gap * target_cards.saturating_sub(1)) else {
            continue;
        };
        if available == 0 {
            continue;
        }
        card_w = (available / target_cards).max(theme.card_min_width);
        if total_width(card_w, target_cards, gap) <= max_width {
            fitted = true;
            break;
        }
    }
    if !fitted {
        gap = 0;
        card_w = (max_width / target_cards).max(theme.card_min_width);
    }

    let mut preview_cols = card_w.saturating_sub(4);
    let mut card_h = preview_rows + 3;
    let mut title_only = false;

    if preview_cols < theme.min_preview_cols || card_h > max_height || card_w < theme.card_min_width
    {
        title_only = true;
        preview_cols = 0;
        preview_rows = 0;
        card_h = theme.card_min_height.max(3);
        let available = max_width.saturating_sub(gap * target_cards.saturating_sub(1));
        if available > 0 {
            card_w = (available / target_cards).max(theme.card_min_width);
        }
    }

    CardLayout {
        preview_cols,
        preview_rows,
        card_w,
        card_h,
        gap,
        max_cards: target_cards,
        title_only,
    }
}

fn total_width(card_w: usize, cards: usize, gap: usize) -> usize {
    cards * card_w + cards.saturating_sub(1) * gap
}

/// The visible slice of the tab list: all of it when it fits, otherwise the
/// maximal contiguous window centered on the selection, clamped to the list
/// bounds.
#[must_use]
pub fn visible_window(len: usize, selected: usize, max_cards: usize) -> std::ops::Range<usize> {
    if len <= max_cards {
        return 0..len;
    }
    let half = max_cards / 2;
    let start = selected.saturating_sub(half);
    let end = (start + max_cards).min(len);
    let start = end.saturating_sub(max_cards);
    start..end
}

/// Leftmost column (0-based) of the card row given its total width.
#[must_use]
pub fn row_start_x(align: Align, cols: usize, total_w: usize) -> usize {
    match align {
        Align::Left => 0,
        Align::Right => cols.saturating_sub(total_w),
        Align::Center => cols.saturating_sub(total_w) / 2,
    }
}

/// Topmost row (0-based) of the card row given the card height.
#[must_use]
pub fn row_start_y(align: crate::theme::VerticalAlign, rows: usize, card_h: usize) -> usize {
    use crate::theme::VerticalAlign;
    match align {
        VerticalAlign::Top => 0,
        VerticalAlign::Bottom => rows.saturating_sub(card_h),
        VerticalAlign::Center => rows.saturating_sub(card_h) / 2,
    }
}

/// Shorten plain text to `max_len` characters, ellipsized when it helps.
#[must_use]
pub fn truncate(text: &str, max_len: usize, ellipsis: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if max_len == 0 {
        return String::new();
    }
    if chars.len() <= max_len {
        return text.to_string();
    }
    let ell_len = ellipsis.chars().count();
    if max_len <= 3 || ell_len >= max_len {
        return chars[..max_len].iter().collect();
    }
    let mut out: String = chars[..max_len - ell_len].iter().collect();
    out.push_str(ellipsis);
    out
}

/// Shorten text to `max_len` *visible* characters: SGR escape sequences
/// cost nothing and are passed through, and a reset is appended so clipped
/// styling cannot leak past the line.
#[must_use]
pub fn truncate_ansi(text: &str, max_len: usize) -> String {
    if max_len == 0 {
        return String::new();
    }
    if !text.contains('\x1b') {
        return truncate(text, max_len, "...");
    }
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut visible = 0usize;
    let mut i = 0usize;
    while i < chars.len() && visible < max_len {
        if chars[i] == '\x1b' {
            let Some(end) = chars[i + 1..].iter().position(|&c| c == 'm') else {
                break;
            };
            let end = i + 1 + end;
            out.extend(&chars[i..=end]);
            i = end + 1;
            continue;
        }
        out.push(chars[i]);
        visible += 1;
        i += 1;
    }
    out.push_str("\x1b[0m");
    out
}

/// Clip one rendered preview line to the preview width, reset-wrapped so
/// card styling and preview styling cannot interfere.
#[must_use]
pub fn clip_preview_line(text: &str, max_len: usize) -> String {
    format!("\x1b[0m{}\x1b[0m", truncate_ansi(text, max_len))
}

/// Format a tab title into the card's title row: padded, aligned, and
/// shortened per the theme.
#[must_use]
pub fn format_title(theme: &Theme, text: &str, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    let pad = theme.title_padding;
    let inner = width.saturating_sub(pad * 2);
    let content = match theme.wrap_title {
        WrapMode::Clip => {
            let chars: Vec<char> = text.chars().collect();
            chars[..chars.len().min(inner)].iter().collect::<String>()
        }
        WrapMode::Truncate => truncate(text, inner, &theme.ellipsis),
    };
    let content_len = content.chars().count();
    let fill = inner.saturating_sub(content_len);
    let (left, right) = match theme.title_align {
        Align::Left => (0, fill),
        Align::Right => (fill, 0),
        Align::Center => (fill / 2, fill - fill / 2),
    };
    let mut out = String::with_capacity(width);
    out.push_str(&" ".repeat(pad));
    out.push_str(&" ".repeat(left));
    out.push_str(&content);
    out.push_str(&" ".repeat(right));
    out.push_str(&" ".repeat(pad));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn theme() -> Theme {
        Theme::default()
    }

    #[test]
    fn roomy_screen_keeps_theme_geometry() {
        // 4 cards of preview width >= 24 need a wide screen.
        let layout = compute_layout(&theme(), 40, 160, 4);
        assert!(!layout.title_only);
        assert_eq!(layout.preview_rows, 12);
        assert_eq!(layout.card_h, 15);
        assert_eq!(layout.gap, 2);
        assert!(layout.preview_cols >= 24);
        assert_eq!(layout.preview_cols, layout.card_w - 4);
    }

    #[test]
    fn short_screen_shrinks_preview_rows() {
        let layout = compute_layout(&theme(), 12, 160, 2);
        assert!(layout.preview_rows < 12);
        assert!(layout.preview_rows >= theme().min_preview_rows || layout.title_only);
        assert!(layout.card_h <= 10 || layout.title_only);
    }

    #[test]
    fn narrow_screen_degrades_to_title_only() {
        let layout = compute_layout(&theme(), 40, 50, 4);
        assert!(layout.title_only);
        assert_eq!(layout.preview_cols, 0);
        assert_eq!(layout.preview_rows, 0);
        assert_eq!(layout.card_h, 3);
    }

    #[test]
    fn card_count_caps_at_visible_maximum() {
        let layout = compute_layout(&theme(), 40, 300, 20);
        assert_eq!(layout.max_cards, MAX_VISIBLE_CARDS);
    }

    #[test]
    fn visible_window_fits_whole_list() {
        assert_eq!(visible_window(4, 2, 7), 0..4);
    }

    #[test]
    fn visible_window_centers_on_selection() {
        assert_eq!(visible_window(20, 10, 7), 7..14);
        // Clamped at the edges.
        assert_eq!(visible_window(20, 0, 7), 0..7);
        assert_eq!(visible_window(20, 19, 7), 13..20);
    }

    #[test]
    fn truncate_respects_ellipsis() {
        assert_eq!(truncate("short", 10, "..."), "short");
        assert_eq!(truncate("a long tab title", 10, "..."), "a long ...");
        assert_eq!(truncate("abcdef", 3, "..."), "abc");
        assert_eq!(truncate("abcdef", 0, "..."), "");
    }

    #[test]
    fn truncate_ansi_ignores_escape_cost() {
        let styled = "\x1b[31mabcdef\x1b[0m";
        let out = truncate_ansi(styled, 3);
        assert!(out.starts_with("\x1b[31mabc"));
        assert!(out.ends_with("\x1b[0m"));
    }

    #[test]
    fn truncate_ansi_plain_passthrough() {
        assert_eq!(truncate_ansi("plain", 10), "plain");
    }

    #[test]
    fn format_title_alignment() {
        let mut t = theme();
        t.title_padding = 1;
        assert_eq!(format_title(&t, "ab", 6), " ab   ");
        t.title_align = Align::Right;
        assert_eq!(format_title(&t, "ab", 6), "   ab ");
        t.title_align = Align::Center;
        assert_eq!(format_title(&t, "ab", 6), "  ab  ");
    }

    #[test]
    fn format_title_truncates_long_titles() {
        let t = theme();
        let out = format_title(&t, "a very long tab title", 12);
        assert_eq!(out.chars().count(), 12);
        assert!(out.contains("..."));
    }

    #[test]
    fn row_alignment() {
        assert_eq!(row_start_x(Align::Left, 100, 40), 0);
        assert_eq!(row_start_x(Align::Center, 100, 40), 30);
        assert_eq!(row_start_x(Align::Right, 100, 40), 60);
        // Oversized rows clamp to the origin.
        assert_eq!(row_start_x(Align::Center, 10, 40), 0);
    }
}
