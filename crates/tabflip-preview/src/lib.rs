//! Preview pipeline: captured ANSI screen text → colored cell grid →
//! half-block card.

pub mod block;
pub mod color;
pub mod grid;

pub use block::{ColorMode, render_block_preview};
pub use color::Rgb;
pub use grid::{Cell, parse_ansi_grid};
