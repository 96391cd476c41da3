//! Client configuration for the parley chat client.
//!
//! Provides kubeconfig-style YAML configuration with:
//! - Named connection contexts (server URL + timeout + sign-in path)
//! - `current-context` for default selection
//! - Per-context credential storage (file or in-memory)
//!
//! Everything lives under the XDG config directory (`~/.config/parley` on
//! Linux), overridable with `PARLEY_CONFIG_DIR`.

pub mod client;
pub mod discovery;
pub mod error;

pub use client::{
    client_config_path, load_client_config, load_client_config_from, save_client_config,
    save_client_config_to, ClientConfig, ClientDefaults, Context, CredentialStorage,
    DEFAULT_SERVER_URL, DEFAULT_SIGNIN_PATH,
};
pub use discovery::{credentials_path, log_dir, xdg_config_dir};
pub use error::{ConfigError, Result};
