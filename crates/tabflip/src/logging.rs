#![forbid(unsafe_code)]

//! Logging initialization.
//!
//! The switcher owns the terminal screen while it runs, so diagnostics must
//! never reach stdout. When `TABFLIP_LOG` holds a filter directive (e.g.
//! `tabflip=debug`), events are appended to a log file; otherwise no
//! subscriber is installed and every tracing macro is a no-op.

use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Filter directive env var; logging is off when unset or empty.
pub const LOG_ENV_VAR: &str = "TABFLIP_LOG";

/// Log file override env var.
pub const LOG_PATH_ENV_VAR: &str = "TABFLIP_LOG_PATH";

fn log_path() -> PathBuf {
    if let Ok(path) = std::env::var(LOG_PATH_ENV_VAR)
        && !path.is_empty()
    {
        return PathBuf::from(path);
    }
    crate::store::cache_dir().join("tabflip").join("debug.log")
}

/// Install the file subscriber when logging is requested. Failures are
/// silent: a broken log setup must not break switching.
pub fn init() {
    let Ok(filter) = std::env::var(LOG_ENV_VAR) else {
        return;
    };
    if filter.trim().is_empty() {
        return;
    }
    let path = log_path();
    if let Some(parent) = path.parent()
        && std::fs::create_dir_all(parent).is_err()
    {
        return;
    }
    let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
}
