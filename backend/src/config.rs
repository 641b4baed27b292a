//! Runtime configuration.
//!
//! Every value has a compiled default and a `CARNETIFY_*` environment
//! override so deployments can relocate storage without rebuilding.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Nominal print resolution. Cards are converted to physical page sizes at
/// this DPI (`mm = px / 300 * 25.4`).
pub const RENDER_DPI: f64 = 300.0;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// SQLite database file.
pub fn db_path() -> String {
    env_or("CARNETIFY_DB", "carnetify.sqlite")
}

/// Directory holding the TTF files the font table resolves against.
pub fn fonts_dir() -> PathBuf {
    PathBuf::from(env_or("CARNETIFY_FONTS_DIR", "./fonts"))
}

/// Root under which each job gets its own temporary working directory.
pub fn work_root() -> PathBuf {
    PathBuf::from(env_or("CARNETIFY_WORK_DIR", "./jobs"))
}

/// Durable location finished archives are promoted to.
pub fn archive_root() -> PathBuf {
    PathBuf::from(env_or("CARNETIFY_ARCHIVE_DIR", "./archives"))
}

/// Backpressure: pause after every N processed records.
pub fn pause_every() -> usize {
    env_parse("CARNETIFY_PAUSE_EVERY", 5)
}

/// Backpressure: length of that pause.
pub fn pause_duration() -> Duration {
    Duration::from_millis(env_parse("CARNETIFY_PAUSE_MS", 200))
}

/// How long finished jobs and their archives are retained before the sweeper
/// evicts them.
pub fn retention() -> Duration {
    Duration::from_secs(env_parse("CARNETIFY_RETENTION_SECS", 3600))
}

pub fn bind_host() -> String {
    env_or("CARNETIFY_HOST", "127.0.0.1")
}

pub fn bind_port() -> u16 {
    env_parse("CARNETIFY_PORT", 8080)
}
