//! Property tests for the block downsampler.

use proptest::prelude::*;
use tabflip_preview::block::{ColorMode, render_block_preview};

fn fill_count(rendered: &[String]) -> usize {
    rendered
        .iter()
        .flat_map(|line| line.chars())
        .filter(|&c| c == '█' || c == '▀' || c == '▄')
        .count()
}

/// Build a width×height source where the first `filled` positions
/// (row-major) are `x` and the rest are spaces. The bottom-right corner is
/// always filled so both densities trim to the same content height and the
/// comparison stays cellwise.
fn source(width: usize, height: usize, filled: usize) -> Vec<String> {
    (0..height)
        .map(|r| {
            (0..width)
                .map(|c| {
                    let anchored = r == height - 1 && c == width - 1;
                    if anchored || r * width + c < filled {
                        'x'
                    } else {
                        ' '
                    }
                })
                .collect()
        })
        .collect()
}

proptest! {
    /// Adding source fill never removes rendered fill: the downsampler is
    /// monotonic in density for fixed thresholds.
    #[test]
    fn fill_is_monotonic(
        width in 1usize..20,
        height in 1usize..20,
        cols in 1usize..10,
        rows in 1usize..6,
        filled in 0usize..400,
    ) {
        let cells = width * height;
        let filled = filled.min(cells);
        let sparser = source(width, height, filled);
        let denser = source(width, height, (filled + cells.div_ceil(4)).min(cells));
        let a = fill_count(&render_block_preview(&sparser, cols, rows, ColorMode::None));
        let b = fill_count(&render_block_preview(&denser, cols, rows, ColorMode::None));
        prop_assert!(b >= a, "fill dropped from {a} to {b}");
    }

    /// Output geometry is always exactly rows lines of cols glyphs
    /// (plain path; no escapes to account for).
    #[test]
    fn plain_output_geometry(
        lines in proptest::collection::vec("[ -~]{0,40}", 0..30),
        cols in 1usize..20,
        rows in 1usize..10,
    ) {
        let lines: Vec<String> = lines;
        let out = render_block_preview(&lines, cols, rows, ColorMode::None);
        prop_assert_eq!(out.len(), rows);
        for line in &out {
            prop_assert_eq!(line.chars().count(), cols);
        }
    }

    /// The renderer never panics on arbitrary escape-laden input.
    #[test]
    fn colored_path_never_panics(
        lines in proptest::collection::vec(".*", 0..10),
        cols in 0usize..12,
        rows in 0usize..6,
    ) {
        let mut lines: Vec<String> = lines;
        if let Some(first) = lines.first_mut() {
            first.insert_str(0, "\x1b[38;5;30m");
        }
        let _ = render_block_preview(&lines, cols, rows, ColorMode::Both);
    }
}
