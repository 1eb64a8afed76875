#![forbid(unsafe_code)]

//! RGB color type and the fixed ANSI palettes.

/// RGB color (opaque).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    /// Red channel (0–255).
    pub r: u8,
    /// Green channel (0–255).
    pub g: u8,
    /// Blue channel (0–255).
    pub b: u8,
}

impl Rgb {
    /// Create a new RGB color.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Truecolor foreground SGR for this color.
    #[must_use]
    pub fn fg_sequence(self) -> String {
        format!("\x1b[38;2;{};{};{}m", self.r, self.g, self.b)
    }

    /// Truecolor background SGR for this color.
    #[must_use]
    pub fn bg_sequence(self) -> String {
        format!("\x1b[48;2;{};{};{}m", self.r, self.g, self.b)
    }
}

/// The 16-color palette keyed by SGR foreground code (30–37 normal,
/// 90–97 bright).
#[must_use]
pub const fn ansi_16(code: u32) -> Option<Rgb> {
    let rgb = match code {
        30 => Rgb::new(0, 0, 0),
        31 => Rgb::new(205, 49, 49),
        32 => Rgb::new(13, 188, 121),
        33 => Rgb::new(229, 229, 16),
        34 => Rgb::new(36, 114, 200),
        35 => Rgb::new(188, 63, 188),
        36 => Rgb::new(17, 168, 205),
        37 => Rgb::new(229, 229, 229),
        90 => Rgb::new(102, 102, 102),
        91 => Rgb::new(241, 76, 76),
        92 => Rgb::new(35, 209, 139),
        93 => Rgb::new(245, 245, 67),
        94 => Rgb::new(59, 142, 234),
        95 => Rgb::new(214, 112, 214),
        96 => Rgb::new(41, 184, 219),
        97 => Rgb::new(229, 229, 229),
        _ => return None,
    };
    Some(rgb)
}

/// The 256-color palette: 0–15 basic + bright, 16–231 a 6×6×6 cube,
/// 232–255 a 24-step grayscale ramp.
#[must_use]
pub const fn ansi_256(index: u32) -> Option<Rgb> {
    match index {
        0..=7 => ansi_16(30 + index),
        8..=15 => ansi_16(90 + (index - 8)),
        16..=231 => {
            let idx = index - 16;
            let r = (idx / 36) % 6;
            let g = (idx / 6) % 6;
            let b = idx % 6;
            Some(Rgb::new(cube_level(r), cube_level(g), cube_level(b)))
        }
        232..=255 => {
            let gray = (8 + (index - 232) * 10) as u8;
            Some(Rgb::new(gray, gray, gray))
        }
        _ => None,
    }
}

/// Cube channel level: `0 → 0, n → 55 + 40n`.
const fn cube_level(n: u32) -> u8 {
    if n == 0 { 0 } else { (55 + n * 40) as u8 }
}
