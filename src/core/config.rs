//! Engine configuration from environment variables.
//!
//! Load configuration using `Config::from_env()` after calling `dotenvy::dotenv()`.
//! Every setting has a built-in default; a variable that is set but cannot be
//! parsed is reported and ignored.

use crate::core::collab::presence::DEFAULT_PRESENCE_STALE_SECS;
use crate::core::collab::throttling::{
    DEFAULT_AUTOSAVE_MS, DEFAULT_CURSOR_THROTTLE_MS, DEFAULT_HEARTBEAT_SECS,
};
use crate::core::export::DEFAULT_EXPORT_ROWS;
use crate::core::history::MAX_UNDO;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const ENV_UNDO_DEPTH: &str = "SCHEMABOARD_UNDO_DEPTH";
pub const ENV_AUTOSAVE_MS: &str = "SCHEMABOARD_AUTOSAVE_MS";
pub const ENV_EXPORT_ROWS: &str = "SCHEMABOARD_EXPORT_ROWS";
pub const ENV_HEARTBEAT_SECS: &str = "SCHEMABOARD_HEARTBEAT_SECS";
pub const ENV_CURSOR_THROTTLE_MS: &str = "SCHEMABOARD_CURSOR_THROTTLE_MS";
pub const ENV_PRESENCE_STALE_SECS: &str = "SCHEMABOARD_PRESENCE_STALE_SECS";

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Number of undo snapshots kept
    pub undo_depth: usize,
    /// Debounce delay between the last edit and the autosave write
    pub autosave_delay: Duration,
    /// Generated rows per table when exporting with fake data
    pub export_rows: usize,
    /// Presence heartbeat interval
    pub heartbeat_interval: Duration,
    /// Minimum interval between two cursor writes
    pub cursor_throttle: Duration,
    /// Presence entries older than this are not connected
    pub presence_stale_after: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            undo_depth: MAX_UNDO,
            autosave_delay: Duration::from_millis(DEFAULT_AUTOSAVE_MS),
            export_rows: DEFAULT_EXPORT_ROWS,
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            cursor_throttle: Duration::from_millis(DEFAULT_CURSOR_THROTTLE_MS),
            presence_stale_after: Duration::from_secs(DEFAULT_PRESENCE_STALE_SECS),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Call `dotenvy::dotenv()` before this to load from `.env` file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            undo_depth: parse_or(&lookup, ENV_UNDO_DEPTH, defaults.undo_depth),
            autosave_delay: Duration::from_millis(parse_or(
                &lookup,
                ENV_AUTOSAVE_MS,
                DEFAULT_AUTOSAVE_MS,
            )),
            export_rows: parse_or(&lookup, ENV_EXPORT_ROWS, defaults.export_rows),
            heartbeat_interval: Duration::from_secs(parse_or(
                &lookup,
                ENV_HEARTBEAT_SECS,
                DEFAULT_HEARTBEAT_SECS,
            )),
            cursor_throttle: Duration::from_millis(parse_or(
                &lookup,
                ENV_CURSOR_THROTTLE_MS,
                DEFAULT_CURSOR_THROTTLE_MS,
            )),
            presence_stale_after: Duration::from_secs(parse_or(
                &lookup,
                ENV_PRESENCE_STALE_SECS,
                DEFAULT_PRESENCE_STALE_SECS,
            )),
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "ignoring unparseable configuration value");
                default
            }
        },
    }
}
