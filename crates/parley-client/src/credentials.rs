//! Credential persistence.
//!
//! The store is a synchronous, process-wide key-value map holding two opaque
//! strings: the access token and the refresh token. Writes are best effort;
//! a failed write is logged and the caller carries on (the next request just
//! goes out unauthenticated).

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

/// Store key for the short-lived bearer token.
pub const ACCESS_TOKEN: &str = "accessToken";

/// Store key for the long-lived refresh token.
pub const REFRESH_TOKEN: &str = "refreshToken";

/// Access and refresh token as issued by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// ============================================================================
// CredentialStore Trait
// ============================================================================

/// Persistent key-value storage for session credentials.
pub trait CredentialStore: Send + Sync + std::fmt::Debug {
    /// Read an entry.
    fn get(&self, name: &str) -> Option<String>;

    /// Write an entry. Failures are logged, never returned.
    fn set(&self, name: &str, value: &str);

    /// Remove every entry, credentials and any other session state.
    fn clear_all(&self);
}

impl dyn CredentialStore + '_ {
    /// Current access token, if any.
    pub fn access_token(&self) -> Option<String> {
        self.get(ACCESS_TOKEN).filter(|t| !t.is_empty())
    }

    /// Current refresh token, if any.
    pub fn refresh_token(&self) -> Option<String> {
        self.get(REFRESH_TOKEN).filter(|t| !t.is_empty())
    }

    /// Persist a fresh access token and, when the server rotated it, the
    /// refresh token. An absent refresh token leaves the stored one alone.
    pub fn store_tokens(&self, access_token: &str, refresh_token: Option<&str>) {
        self.set(ACCESS_TOKEN, access_token);
        if let Some(refresh) = refresh_token {
            self.set(REFRESH_TOKEN, refresh);
        }
    }

    /// Persist a full pair (login/registration).
    pub fn store_pair(&self, pair: &CredentialPair) {
        self.store_tokens(&pair.access_token, Some(&pair.refresh_token));
    }

    /// Whether any credentials are present.
    pub fn has_credentials(&self) -> bool {
        self.access_token().is_some() || self.refresh_token().is_some()
    }
}

/// Shared credential store for use across async contexts.
pub type SharedCredentialStore = Arc<dyn CredentialStore>;

// ============================================================================
// MemoryCredentialStore
// ============================================================================

/// In-memory store; nothing outlives the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with a token pair.
    pub fn with_pair(pair: &CredentialPair) -> Self {
        let store = Self::new();
        {
            let mut entries = store.entries.write();
            entries.insert(ACCESS_TOKEN.to_string(), pair.access_token.clone());
            entries.insert(REFRESH_TOKEN.to_string(), pair.refresh_token.clone());
        }
        store
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, name: &str) -> Option<String> {
        self.entries.read().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) {
        self.entries
            .write()
            .insert(name.to_string(), value.to_string());
    }

    fn clear_all(&self) {
        self.entries.write().clear();
    }
}

// ============================================================================
// FileCredentialStore
// ============================================================================

/// JSON-file store. The file is read once on open and rewritten after every
/// write, so it always mirrors the in-memory map.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileCredentialStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// An unreadable or corrupt file is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt credentials file");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read credentials file");
                BTreeMap::new()
            }
        };

        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    /// Get the credentials file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(entries).map_err(std::io::Error::other)?;
        let tmp = self.path.with_extension("json.tmp");

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        std::fs::rename(&tmp, &self.path)
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, name: &str) -> Option<String> {
        self.entries.read().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) {
        let mut entries = self.entries.write();
        entries.insert(name.to_string(), value.to_string());
        if let Err(e) = self.persist(&entries) {
            tracing::warn!(
                path = %self.path.display(),
                key = name,
                error = %e,
                "Failed to persist credential; continuing with in-memory value"
            );
        }
    }

    fn clear_all(&self) {
        self.entries.write().clear();
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Credentials file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove credentials file")
            }
        }
    }
}
