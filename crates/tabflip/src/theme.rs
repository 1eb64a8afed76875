#![forbid(unsafe_code)]

//! Theme loading.
//!
//! Visual styling knobs for the card row, read from a YAML document in
//! which every field is optional. Lookup order: `--theme PATH`, then the
//! `TABFLIP_THEME` env var, then built-in defaults. A missing or malformed
//! file never fails the session: it falls back to defaults with a warning,
//! the same soft treatment the persisted caches get.

use std::path::Path;

use serde::Deserialize;
use tabflip_core::logging::warn;
use tabflip_preview::ColorMode;

/// Env var naming a theme file when no `--theme` flag is given.
pub const THEME_ENV_VAR: &str = "TABFLIP_THEME";

/// Glyphs for one border style.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BorderStyle {
    /// Horizontal edge.
    pub h: String,
    /// Vertical edge.
    pub v: String,
    /// Corners: top-left, top-right, bottom-left, bottom-right.
    pub tl: String,
    pub tr: String,
    pub bl: String,
    pub br: String,
}

impl Default for BorderStyle {
    fn default() -> Self {
        Self {
            h: "-".to_string(),
            v: "|".to_string(),
            tl: "+".to_string(),
            tr: "+".to_string(),
            bl: "+".to_string(),
            br: "+".to_string(),
        }
    }
}

impl BorderStyle {
    fn selected_default() -> Self {
        Self {
            h: "=".to_string(),
            v: "#".to_string(),
            ..Self::default()
        }
    }
}

/// Horizontal alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    #[default]
    Center,
    Right,
}

/// Vertical alignment of the card row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAlign {
    Top,
    #[default]
    Center,
    Bottom,
}

/// How over-long text is shortened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WrapMode {
    /// Truncate with an ellipsis.
    #[default]
    Truncate,
    /// Hard clip.
    Clip,
}

/// Resolved theme. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub name: String,
    pub border: BorderStyle,
    pub border_selected: BorderStyle,
    pub title_align: Align,
    pub title_padding: usize,
    pub title_invert_selected: bool,
    pub wrap_title: WrapMode,
    pub wrap_preview: WrapMode,
    pub ellipsis: String,
    pub align: Align,
    pub vertical_align: VerticalAlign,
    pub gap: usize,
    pub preview_rows: usize,
    pub min_preview_rows: usize,
    pub min_preview_cols: usize,
    pub card_min_width: usize,
    pub card_min_height: usize,
    pub preview_color_mode: ColorMode,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            border: BorderStyle::default(),
            border_selected: BorderStyle::selected_default(),
            title_align: Align::Left,
            title_padding: 1,
            title_invert_selected: true,
            wrap_title: WrapMode::Truncate,
            wrap_preview: WrapMode::Truncate,
            ellipsis: "...".to_string(),
            align: Align::Center,
            vertical_align: VerticalAlign::Center,
            gap: 2,
            preview_rows: 12,
            min_preview_rows: 6,
            min_preview_cols: 24,
            card_min_width: 7,
            card_min_height: 3,
            preview_color_mode: ColorMode::Both,
        }
    }
}

/// Load a theme, falling back to defaults on any failure.
#[must_use]
pub fn load_theme(path: Option<&Path>) -> Theme {
    let Some(path) = path else {
        return Theme::default();
    };
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            warn!(path = %path.display(), %err, "theme file unreadable, using defaults");
            return Theme::default();
        }
    };
    match serde_yaml_ng::from_str::<ThemeFile>(&text) {
        Ok(file) => file.resolve(),
        Err(err) => {
            warn!(path = %path.display(), %err, "theme file invalid, using defaults");
            Theme::default()
        }
    }
}

// The on-disk document: sectioned, every field optional.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThemeFile {
    name: Option<String>,
    border: BorderSection,
    text: TextSection,
    wrap: WrapSection,
    layout: LayoutSection,
    size: SizeSection,
    preview: PreviewSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BorderSection {
    #[serde(alias = "default")]
    normal: Option<PartialBorder>,
    selected: Option<PartialBorder>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialBorder {
    h: Option<String>,
    v: Option<String>,
    tl: Option<String>,
    tr: Option<String>,
    bl: Option<String>,
    br: Option<String>,
}

impl PartialBorder {
    fn merge_into(&self, base: &mut BorderStyle) {
        if let Some(h) = &self.h {
            base.h = h.clone();
        }
        if let Some(v) = &self.v {
            base.v = v.clone();
        }
        if let Some(tl) = &self.tl {
            base.tl = tl.clone();
        }
        if let Some(tr) = &self.tr {
            base.tr = tr.clone();
        }
        if let Some(bl) = &self.bl {
            base.bl = bl.clone();
        }
        if let Some(br) = &self.br {
            base.br = br.clone();
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TextSection {
    title_align: Option<Align>,
    title_padding: Option<usize>,
    title_invert_selected: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WrapSection {
    title: Option<WrapMode>,
    preview: Option<WrapMode>,
    ellipsis: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LayoutSection {
    align: Option<Align>,
    vertical_align: Option<VerticalAlign>,
    gap: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SizeSection {
    preview_rows: Option<usize>,
    min_preview_rows: Option<usize>,
    min_preview_cols: Option<usize>,
    card_min_width: Option<usize>,
    card_min_height: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PreviewSection {
    color_mode: Option<String>,
}

impl ThemeFile {
    fn resolve(self) -> Theme {
        let mut theme = Theme::default();
        if let Some(name) = self.name {
            theme.name = name;
        }
        if let Some(normal) = &self.border.normal {
            normal.merge_into(&mut theme.border);
        }
        if let Some(selected) = &self.border.selected {
            selected.merge_into(&mut theme.border_selected);
        }
        if let Some(v) = self.text.title_align {
            theme.title_align = v;
        }
        if let Some(v) = self.text.title_padding {
            theme.title_padding = v;
        }
        if let Some(v) = self.text.title_invert_selected {
            theme.title_invert_selected = v;
        }
        if let Some(v) = self.wrap.title {
            theme.wrap_title = v;
        }
        if let Some(v) = self.wrap.preview {
            theme.wrap_preview = v;
        }
        if let Some(v) = self.wrap.ellipsis {
            theme.ellipsis = v;
        }
        if let Some(v) = self.layout.align {
            theme.align = v;
        }
        if let Some(v) = self.layout.vertical_align {
            theme.vertical_align = v;
        }
        if let Some(v) = self.layout.gap {
            theme.gap = v;
        }
        if let Some(v) = self.size.preview_rows {
            theme.preview_rows = v;
        }
        if let Some(v) = self.size.min_preview_rows {
            theme.min_preview_rows = v;
        }
        if let Some(v) = self.size.min_preview_cols {
            theme.min_preview_cols = v;
        }
        if let Some(v) = self.size.card_min_width {
            theme.card_min_width = v;
        }
        if let Some(v) = self.size.card_min_height {
            theme.card_min_height = v;
        }
        if let Some(mode) = self.preview.color_mode {
            match ColorMode::parse(&mode) {
                Some(parsed) => theme.preview_color_mode = parsed,
                None => warn!(%mode, "unknown preview color mode, keeping default"),
            }
        }
        theme
    }
}
