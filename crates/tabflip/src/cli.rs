#![forbid(unsafe_code)]

//! Command-line parsing.
//!
//! The switching surface is deliberately forgiving, since it is wired to
//! keyboard shortcuts: `next`/`prev`/`left`/`right`/`1`/`-1` all work and
//! unknown words are ignored. The `preview` subcommand is a debugging
//! surface and validates strictly.

use std::path::PathBuf;

use tabflip_preview::ColorMode;

use crate::switcher::Direction;

/// Parsed invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the switcher.
    Switch(SwitchArgs),
    /// Render a block preview from captured text.
    Preview(PreviewArgs),
}

/// Arguments for a switcher run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SwitchArgs {
    /// Cycle direction chosen by the invocation gesture.
    pub direction: Direction,
    /// Theme file, when given on the command line.
    pub theme_path: Option<PathBuf>,
}

/// Arguments for the `preview` subcommand.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewArgs {
    pub cols: usize,
    pub rows: usize,
    /// Input file; stdin when absent.
    pub file: Option<PathBuf>,
    pub color_mode: ColorMode,
}

/// A usage error, printed to stderr with exit status 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageError(pub String);

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UsageError {}

/// Parse process arguments (without the program name).
pub fn parse(args: &[String]) -> Result<Command, UsageError> {
    if args.first().map(String::as_str) == Some("preview") {
        return parse_preview(&args[1..]).map(Command::Preview);
    }
    Ok(Command::Switch(parse_switch(args)))
}

fn parse_switch(args: &[String]) -> SwitchArgs {
    let mut out = SwitchArgs::default();
    let mut it = args.iter();
    while let Some(raw) = it.next() {
        let arg = raw.trim();
        let low = arg.to_ascii_lowercase();
        match low.as_str() {
            "prev" | "previous" | "left" | "-1" => out.direction = Direction::Prev,
            "next" | "right" | "1" => out.direction = Direction::Next,
            "--theme" => out.theme_path = it.next().map(PathBuf::from),
            _ => {
                if let Some(path) = low.strip_prefix("--theme=") {
                    // Use the original casing for the path itself.
                    let start = arg.len() - path.len();
                    out.theme_path = Some(PathBuf::from(&arg[start..]));
                }
            }
        }
    }
    out
}

fn parse_preview(args: &[String]) -> Result<PreviewArgs, UsageError> {
    let mut cols: Option<usize> = None;
    let mut rows: Option<usize> = None;
    let mut file: Option<PathBuf> = None;
    let mut color_mode = ColorMode::Both;

    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--cols" => cols = Some(parse_number(it.next(), "--cols")?),
            "--rows" => rows = Some(parse_number(it.next(), "--rows")?),
            "--file" => {
                file = Some(PathBuf::from(required_value(it.next(), "--file")?));
            }
            "--color-mode" => {
                let value = required_value(it.next(), "--color-mode")?;
                color_mode = ColorMode::parse(value).ok_or_else(|| {
                    UsageError(format!(
                        "invalid --color-mode {value:?} (expected none|fg|bg|both)"
                    ))
                })?;
            }
            other => return Err(UsageError(format!("unknown preview argument {other:?}"))),
        }
    }

    let cols = cols.ok_or_else(|| UsageError("preview requires --cols".to_string()))?;
    let rows = rows.ok_or_else(|| UsageError("preview requires --rows".to_string()))?;
    Ok(PreviewArgs {
        cols,
        rows,
        file,
        color_mode,
    })
}

fn required_value<'a>(value: Option<&'a String>, flag: &str) -> Result<&'a str, UsageError> {
    value
        .map(String::as_str)
        .ok_or_else(|| UsageError(format!("{flag} requires a value")))
}

fn parse_number(value: Option<&String>, flag: &str) -> Result<usize, UsageError> {
    let value = required_value(value, flag)?;
    value
        .parse()
        .map_err(|_| UsageError(format!("{flag} requires a number, got {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn default_is_switch_next() {
        let cmd = parse(&[]).unwrap();
        assert_eq!(cmd, Command::Switch(SwitchArgs::default()));
    }

    #[test]
    fn direction_spellings() {
        for word in ["prev", "previous", "left", "-1", "PREV"] {
            let Command::Switch(args) = parse(&strings(&[word])).unwrap() else {
                panic!("expected switch");
            };
            assert_eq!(args.direction, Direction::Prev, "word {word:?}");
        }
        for word in ["next", "right", "1"] {
            let Command::Switch(args) = parse(&strings(&[word])).unwrap() else {
                panic!("expected switch");
            };
            assert_eq!(args.direction, Direction::Next, "word {word:?}");
        }
    }

    #[test]
    fn unknown_switch_words_are_ignored() {
        let Command::Switch(args) = parse(&strings(&["bogus", "prev"])).unwrap() else {
            panic!("expected switch");
        };
        assert_eq!(args.direction, Direction::Prev);
    }

    #[test]
    fn theme_flag_forms() {
        let Command::Switch(args) = parse(&strings(&["--theme", "/a/b.yaml"])).unwrap() else {
            panic!("expected switch");
        };
        assert_eq!(args.theme_path, Some(PathBuf::from("/a/b.yaml")));

        let Command::Switch(args) = parse(&strings(&["--theme=/A/B.yaml"])).unwrap() else {
            panic!("expected switch");
        };
        assert_eq!(args.theme_path, Some(PathBuf::from("/A/B.yaml")));
    }

    #[test]
    fn preview_requires_dimensions() {
        assert!(parse(&strings(&["preview"])).is_err());
        assert!(parse(&strings(&["preview", "--cols", "40"])).is_err());
        let cmd = parse(&strings(&["preview", "--cols", "40", "--rows", "12"])).unwrap();
        assert_eq!(
            cmd,
            Command::Preview(PreviewArgs {
                cols: 40,
                rows: 12,
                file: None,
                color_mode: ColorMode::Both,
            })
        );
    }

    #[test]
    fn preview_full_form() {
        let cmd = parse(&strings(&[
            "preview",
            "--cols",
            "30",
            "--rows",
            "8",
            "--file",
            "/tmp/cap.txt",
            "--color-mode",
            "fg",
        ]))
        .unwrap();
        assert_eq!(
            cmd,
            Command::Preview(PreviewArgs {
                cols: 30,
                rows: 8,
                file: Some(PathBuf::from("/tmp/cap.txt")),
                color_mode: ColorMode::Fg,
            })
        );
    }

    #[test]
    fn preview_rejects_garbage() {
        assert!(parse(&strings(&["preview", "--cols", "x", "--rows", "1"])).is_err());
        assert!(parse(&strings(&["preview", "--wat"])).is_err());
        assert!(
            parse(&strings(&[
                "preview",
                "--cols",
                "1",
                "--rows",
                "1",
                "--color-mode",
                "sparkles"
            ]))
            .is_err()
        );
    }
}
