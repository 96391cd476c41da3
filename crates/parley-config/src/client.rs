//! Client configuration for connecting to chat servers.
//!
//! Implements a kubeconfig-style configuration with named contexts:
//!
//! ```yaml
//! api-version: v1
//! kind: ClientConfig
//!
//! current-context: local
//!
//! contexts:
//!   - name: local
//!     server: http://localhost:8000/api
//!   - name: staging
//!     server: https://chat.staging.example.com/api
//!     timeout: 60
//!     signin-path: /login
//!     credentials:
//!       type: file
//!       path: ~/.config/parley/staging-credentials.json
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Client Config
// ─────────────────────────────────────────────────────────────────────────────

/// API version for the client config file format.
pub const API_VERSION: &str = "v1";

/// Kind identifier for client config files.
pub const KIND: &str = "ClientConfig";

/// Server used when neither a flag nor a context names one.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000/api";

/// Unauthenticated entry point the client returns to when a session ends.
pub const DEFAULT_SIGNIN_PATH: &str = "/signin";

/// Default config filename.
const CLIENT_CONFIG_FILE: &str = "client.yaml";

/// Root client configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClientConfig {
    /// API version (always "v1" currently).
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Config kind (always "ClientConfig").
    #[serde(default = "default_kind")]
    pub kind: String,

    /// Name of the current/default context.
    #[serde(default)]
    pub current_context: Option<String>,

    /// Named connection contexts.
    #[serde(default)]
    pub contexts: Vec<Context>,

    /// Default settings applied to all contexts.
    #[serde(default)]
    pub defaults: ClientDefaults,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    KIND.to_string()
}

impl ClientConfig {
    /// Create an empty client config.
    pub fn new() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            ..Default::default()
        }
    }

    /// Parse from a YAML string.
    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        serde_yaml::from_str(yaml_str).map_err(|e| ConfigError::ParseYaml(e.to_string()))
    }

    /// Serialize to a YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::ParseYaml(e.to_string()))
    }

    /// Get the current context, if set and valid.
    pub fn current(&self) -> Option<&Context> {
        self.current_context
            .as_ref()
            .and_then(|name| self.get_context(name))
    }

    /// Get a context by name.
    pub fn get_context(&self, name: &str) -> Option<&Context> {
        self.contexts.iter().find(|c| c.name == name)
    }

    /// Get a mutable context by name.
    pub fn get_context_mut(&mut self, name: &str) -> Option<&mut Context> {
        self.contexts.iter_mut().find(|c| c.name == name)
    }

    /// Add or update a context.
    pub fn set_context(&mut self, context: Context) {
        if let Some(existing) = self.get_context_mut(&context.name) {
            *existing = context;
        } else {
            self.contexts.push(context);
        }
    }

    /// Remove a context by name.
    pub fn remove_context(&mut self, name: &str) -> Option<Context> {
        let pos = self.contexts.iter().position(|c| c.name == name)?;
        if self.current_context.as_deref() == Some(name) {
            self.current_context = None;
        }
        Some(self.contexts.remove(pos))
    }

    /// Set the current context by name.
    ///
    /// Returns an error if the context doesn't exist.
    pub fn use_context(&mut self, name: &str) -> Result<()> {
        if self.get_context(name).is_some() {
            self.current_context = Some(name.to_string());
            Ok(())
        } else {
            Err(ConfigError::ContextNotFound(name.to_string()))
        }
    }

    /// List all context names.
    pub fn context_names(&self) -> Vec<&str> {
        self.contexts.iter().map(|c| c.name.as_str()).collect()
    }

    /// Get the effective server URL for the current context.
    pub fn current_server_url(&self) -> Option<String> {
        self.current().map(|c| c.server.clone())
    }

    /// Request timeout for a context, falling back to the defaults.
    pub fn timeout_for(&self, context: Option<&Context>) -> Duration {
        let secs = context
            .and_then(|c| c.timeout)
            .unwrap_or(self.defaults.timeout);
        Duration::from_secs(secs)
    }

    /// Sign-in entry point for a context, falling back to the defaults.
    pub fn signin_path_for(&self, context: Option<&Context>) -> String {
        context
            .and_then(|c| c.signin_path.clone())
            .unwrap_or_else(|| self.defaults.signin_path.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Context
// ─────────────────────────────────────────────────────────────────────────────

/// A named connection context (server + credential storage bundle).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Context {
    /// Unique name for this context.
    pub name: String,

    /// Base URL of the chat API, including any path prefix
    /// (e.g. "http://localhost:8000/api").
    pub server: String,

    /// Where access/refresh tokens are kept for this context.
    #[serde(default)]
    pub credentials: Option<CredentialStorage>,

    /// Request timeout override (seconds).
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Sign-in entry point override.
    #[serde(default)]
    pub signin_path: Option<String>,
}

impl Context {
    /// Create a new context with just a name and server URL.
    pub fn new(name: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server: server.into(),
            credentials: None,
            timeout: None,
            signin_path: None,
        }
    }

    /// Set the credential storage.
    pub fn with_credentials(mut self, credentials: CredentialStorage) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the sign-in entry point.
    pub fn with_signin_path(mut self, path: impl Into<String>) -> Self {
        self.signin_path = Some(path.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Credential storage
// ─────────────────────────────────────────────────────────────────────────────

/// Where a context keeps its access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CredentialStorage {
    /// JSON file on disk. `None` means the default `credentials.json`.
    File {
        #[serde(default)]
        path: Option<PathBuf>,
    },

    /// Process memory only; nothing survives the run.
    Memory,
}

impl CredentialStorage {
    /// Create file storage at an explicit path.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File {
            path: Some(path.into()),
        }
    }

    /// Resolve the on-disk path for file storage, expanding `~`.
    ///
    /// Returns `Ok(None)` for in-memory storage.
    pub fn resolve_path(&self) -> Result<Option<PathBuf>> {
        match self {
            CredentialStorage::Memory => Ok(None),
            CredentialStorage::File { path: Some(path) } => Ok(Some(expand_path(path))),
            CredentialStorage::File { path: None } => crate::credentials_path()
                .map(Some)
                .ok_or(ConfigError::NoConfigDir),
        }
    }
}

impl Default for CredentialStorage {
    fn default() -> Self {
        Self::File { path: None }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Default settings applied to all contexts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClientDefaults {
    /// Default request timeout in seconds.
    pub timeout: u64,

    /// Default sign-in entry point.
    pub signin_path: String,
}

impl Default for ClientDefaults {
    fn default() -> Self {
        Self {
            timeout: 30,
            signin_path: DEFAULT_SIGNIN_PATH.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading / Saving
// ─────────────────────────────────────────────────────────────────────────────

/// Get the path to the client config file.
pub fn client_config_path() -> Option<PathBuf> {
    crate::xdg_config_dir().map(|d| d.join(CLIENT_CONFIG_FILE))
}

/// Load the client configuration.
///
/// Returns a default config if the file doesn't exist.
pub fn load_client_config() -> Result<ClientConfig> {
    load_client_config_from(client_config_path().as_deref())
}

/// Load client config from a specific path.
pub fn load_client_config_from(path: Option<&Path>) -> Result<ClientConfig> {
    let Some(path) = path else {
        return Ok(ClientConfig::new());
    };

    if !path.exists() {
        return Ok(ClientConfig::new());
    }

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;

    ClientConfig::from_yaml(&contents)
}

/// Save the client configuration.
pub fn save_client_config(config: &ClientConfig) -> Result<()> {
    let path = client_config_path().ok_or(ConfigError::NoConfigDir)?;
    save_client_config_to(config, &path)
}

/// Save client config to a specific path.
pub fn save_client_config_to(config: &ClientConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_yaml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Expand ~ to home directory in paths.
fn expand_path(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/"))
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config() {
        let config = ClientConfig::new();
        assert_eq!(config.api_version, API_VERSION);
        assert_eq!(config.kind, KIND);
        assert!(config.current_context.is_none());
        assert!(config.contexts.is_empty());
        assert_eq!(config.defaults.signin_path, "/signin");
    }

    #[test]
    fn test_parse_minimal_yaml() {
        let yaml = r#"
api-version: v1
kind: ClientConfig
current-context: local
contexts:
  - name: local
    server: http://localhost:8000/api
"#;
        let config = ClientConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.current_context.as_deref(), Some("local"));
        assert_eq!(config.contexts.len(), 1);
        assert_eq!(config.contexts[0].server, "http://localhost:8000/api");
        assert!(config.contexts[0].credentials.is_none());
    }

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r#"
current-context: staging

contexts:
  - name: local
    server: http://localhost:8000/api
    credentials:
      type: memory

  - name: staging
    server: https://chat.staging.example.com/api
    timeout: 60
    signin-path: /login
    credentials:
      type: file
      path: /tmp/parley-staging.json

defaults:
  timeout: 15
  signin-path: /welcome
"#;
        let config = ClientConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.contexts.len(), 2);

        let local = config.get_context("local").unwrap();
        assert_eq!(local.credentials, Some(CredentialStorage::Memory));
        assert_eq!(config.timeout_for(Some(local)), Duration::from_secs(15));
        assert_eq!(config.signin_path_for(Some(local)), "/welcome");

        let staging = config.current().unwrap();
        assert_eq!(staging.name, "staging");
        assert_eq!(config.timeout_for(Some(staging)), Duration::from_secs(60));
        assert_eq!(config.signin_path_for(Some(staging)), "/login");
        assert_eq!(
            staging.credentials,
            Some(CredentialStorage::file("/tmp/parley-staging.json"))
        );
    }

    #[test]
    fn test_current_context() {
        let yaml = r#"
current-context: local
contexts:
  - name: local
    server: http://localhost:8000/api
"#;
        let config = ClientConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            config.current_server_url(),
            Some("http://localhost:8000/api".to_string())
        );
    }

    #[test]
    fn test_set_context() {
        let mut config = ClientConfig::new();

        config.set_context(Context::new("local", "http://localhost:8000/api"));
        assert_eq!(config.contexts.len(), 1);

        config.set_context(Context::new("local", "http://localhost:9000/api"));
        assert_eq!(config.contexts.len(), 1);
        assert_eq!(config.contexts[0].server, "http://localhost:9000/api");
    }

    #[test]
    fn test_remove_context() {
        let mut config = ClientConfig::new();
        config.set_context(Context::new("local", "http://localhost:8000/api"));
        config.set_context(Context::new("remote", "https://remote.example.com/api"));
        config.current_context = Some("local".to_string());

        let removed = config.remove_context("remote").unwrap();
        assert_eq!(removed.name, "remote");
        assert_eq!(config.current_context.as_deref(), Some("local"));

        // Removing the current context clears it
        config.remove_context("local");
        assert!(config.current_context.is_none());
        assert!(config.remove_context("local").is_none());
    }

    #[test]
    fn test_use_context() {
        let mut config = ClientConfig::new();
        config.set_context(Context::new("local", "http://localhost:8000/api"));

        config.use_context("local").unwrap();
        assert_eq!(config.current_context.as_deref(), Some("local"));

        let err = config.use_context("nonexistent").unwrap_err();
        assert!(matches!(err, ConfigError::ContextNotFound(_)));
    }

    #[test]
    fn test_context_builder() {
        let context = Context::new("test", "http://test.local/api")
            .with_credentials(CredentialStorage::Memory)
            .with_timeout(5)
            .with_signin_path("/auth");

        assert_eq!(context.timeout, Some(5));
        assert_eq!(context.signin_path.as_deref(), Some("/auth"));
        assert_eq!(context.credentials, Some(CredentialStorage::Memory));
    }

    #[test]
    fn test_memory_storage_has_no_path() {
        assert!(CredentialStorage::Memory.resolve_path().unwrap().is_none());
        let explicit = CredentialStorage::file("/var/tmp/creds.json");
        assert_eq!(
            explicit.resolve_path().unwrap(),
            Some(PathBuf::from("/var/tmp/creds.json"))
        );
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("client.yaml");

        let mut config = ClientConfig::new();
        config.set_context(Context::new("local", "http://localhost:8000/api").with_timeout(10));
        config.use_context("local").unwrap();

        save_client_config_to(&config, &path).unwrap();
        let loaded = load_client_config_from(Some(&path)).unwrap();

        assert_eq!(loaded.current_context.as_deref(), Some("local"));
        assert_eq!(loaded.contexts[0].timeout, Some(10));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_client_config_from(Some(&dir.path().join("absent.yaml"))).unwrap();
        assert!(config.contexts.is_empty());
        assert_eq!(config.defaults.timeout, 30);
    }

    #[test]
    fn test_expand_path() {
        let path = PathBuf::from("~/test/creds.json");
        let expanded = expand_path(&path);
        if dirs::home_dir().is_some() {
            assert!(!expanded.to_str().unwrap().starts_with("~/"));
        }

        let absolute = PathBuf::from("/absolute/path");
        assert_eq!(expand_path(&absolute), absolute);
    }
}
