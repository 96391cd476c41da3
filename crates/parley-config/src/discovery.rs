//! Config directory discovery.
//!
//! All parley state lives under one directory:
//!
//! ```text
//! ~/.config/parley/
//!   client.yaml        contexts
//!   credentials.json   access/refresh tokens
//!   logs/              rolling JSON logs
//! ```

use std::path::PathBuf;

/// Application name for XDG directory resolution.
const APP_NAME: &str = "parley";

/// Environment variable to override the config directory.
///
/// When set, this takes precedence over the platform default (XDG/Application Support).
/// Useful for testing and running multiple instances side by side.
const CONFIG_DIR_ENV: &str = "PARLEY_CONFIG_DIR";

/// Default credentials filename within the config directory.
const CREDENTIALS_FILE: &str = "credentials.json";

/// Get the XDG config directory for parley.
///
/// Checks `PARLEY_CONFIG_DIR` env var first, then falls back to platform default.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Default location of the persisted credential store.
pub fn credentials_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(CREDENTIALS_FILE))
}

/// Directory for rolling log files.
pub fn log_dir() -> PathBuf {
    xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}
