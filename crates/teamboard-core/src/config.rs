//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client runs with zero configuration.

use std::path::PathBuf;
use std::str::FromStr;

use directories::ProjectDirs;

use teamboard_shared::constants::{
    DEFAULT_HISTORY_LIMIT, DEFAULT_RECENT_LIMIT, DEFAULT_SNAPSHOT_CAPACITY,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// SQLite document database.
    /// Env: `TEAMBOARD_DB_PATH`
    /// Default: `<data dir>/teamboard.db`
    pub db_path: PathBuf,

    /// Local convenience cache (JSON).
    /// Env: `TEAMBOARD_CACHE_PATH`
    /// Default: `<data dir>/local-cache.json`
    pub cache_path: PathBuf,

    /// Env: `TEAMBOARD_RECENT_LIMIT`
    pub recent_limit: usize,

    /// Env: `TEAMBOARD_HISTORY_LIMIT`
    pub history_limit: usize,

    /// Change notices buffered per collection before a slow subscriber is
    /// resynced from a fresh snapshot.
    /// Env: `TEAMBOARD_SNAPSHOT_CAPACITY`
    pub snapshot_capacity: usize,
}

fn data_dir() -> PathBuf {
    match ProjectDirs::from("com", "teamboard", "teamboard") {
        Some(dirs) => dirs.data_dir().to_path_buf(),
        None => {
            tracing::warn!("No platform data directory, using the working directory");
            PathBuf::from(".")
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let dir = data_dir();
        Self {
            db_path: dir.join("teamboard.db"),
            cache_path: dir.join("local-cache.json"),
            recent_limit: DEFAULT_RECENT_LIMIT,
            history_limit: DEFAULT_HISTORY_LIMIT,
            snapshot_capacity: DEFAULT_SNAPSHOT_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with variables read through `var`.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = var("TEAMBOARD_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(path) = var("TEAMBOARD_CACHE_PATH") {
            config.cache_path = PathBuf::from(path);
        }

        parse_positive(&var, "TEAMBOARD_RECENT_LIMIT", &mut config.recent_limit);
        parse_positive(&var, "TEAMBOARD_HISTORY_LIMIT", &mut config.history_limit);
        parse_positive(&var, "TEAMBOARD_SNAPSHOT_CAPACITY", &mut config.snapshot_capacity);

        config
    }
}

/// Overwrite `slot` with the parsed value of `key` if it is a positive number.
fn parse_positive<T>(var: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T)
where
    T: FromStr + PartialOrd + Default,
{
    let Some(raw) = var(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => *slot = value,
        _ => tracing::warn!(%key, value = %raw, "Invalid value, using default"),
    }
}
