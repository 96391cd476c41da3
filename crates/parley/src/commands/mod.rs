//! CLI command handlers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use console::Style;
use parley_client::{
    FileCredentialStore, MemoryCredentialStore, ParleyClient, SharedCredentialStore, Upload,
};
use parley_config::{ClientConfig, CredentialStorage, DEFAULT_SERVER_URL};
use serde::Serialize;

pub mod ask;
pub mod auth;
pub mod chat;
pub mod config;
pub mod repl;
pub mod session;
pub mod transcribe;

/// Shared context for all commands.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Server URL from `--server` / `PARLEY_SERVER_URL`.
    pub server: Option<String>,
    /// Context name from `--context`.
    pub context: Option<String>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Keep credentials in memory only.
    pub ephemeral: bool,
}

/// Everything needed to build a client, resolved from flags and config.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub server_url: String,
    pub timeout: Duration,
    pub signin_path: String,
    pub credentials: CredentialStorage,
}

impl Context {
    /// Resolve the connection against the client config on disk.
    pub fn connection(&self) -> Result<Connection> {
        let config = parley_config::load_client_config()?;
        self.resolve(&config)
    }

    /// Resolve the connection against a given config.
    ///
    /// Server precedence: `--server`, then `--context`, then the current
    /// context, then the built-in default.
    pub fn resolve(&self, config: &ClientConfig) -> Result<Connection> {
        let context = match &self.context {
            Some(name) => Some(
                config
                    .get_context(name)
                    .ok_or_else(|| anyhow::anyhow!("Context \"{}\" not found", name))?,
            ),
            None => config.current(),
        };

        let server_url = self
            .server
            .clone()
            .or_else(|| context.map(|c| c.server.clone()))
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

        let credentials = if self.ephemeral {
            CredentialStorage::Memory
        } else {
            context
                .and_then(|c| c.credentials.clone())
                .unwrap_or_default()
        };

        Ok(Connection {
            server_url,
            timeout: config.timeout_for(context),
            signin_path: config.signin_path_for(context),
            credentials,
        })
    }

    /// Build an API client for this invocation.
    pub fn client(&self) -> Result<ParleyClient> {
        let connection = self.connection()?;
        tracing::debug!(server = %connection.server_url, "Connecting");

        let store: SharedCredentialStore = match connection.credentials.resolve_path()? {
            Some(path) => Arc::new(FileCredentialStore::open(path)),
            None => Arc::new(MemoryCredentialStore::new()),
        };

        Ok(ParleyClient::builder()
            .base_url(connection.server_url)
            .timeout(connection.timeout)
            .signin_path(connection.signin_path)
            .credential_store(store)
            .build()?)
    }

    /// Print a value as pretty JSON.
    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

/// Read a file into an upload, guessing its content type from the extension.
pub async fn read_upload(path: &Path) -> Result<Upload> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    let upload = Upload::new(file_name, bytes);
    Ok(match mime_type_for(path) {
        Some(mime) => upload.with_mime_type(mime),
        None => upload,
    })
}

fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "webm" => "audio/webm",
        _ => return None,
    };
    Some(mime)
}

/// Whether an error means the session was terminated.
pub fn session_ended(err: &anyhow::Error) -> bool {
    err.downcast_ref::<parley_client::Error>()
        .is_some_and(parley_client::Error::is_session_ended)
}

/// Tell the user their session is gone.
pub fn print_session_expired() {
    let red = Style::new().red();
    let dim = Style::new().dim();
    eprintln!("{}", red.apply_to("Session expired. Please log in again."));
    eprintln!("{}", dim.apply_to("Run 'parley login' to sign in."));
}
