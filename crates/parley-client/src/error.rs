//! Client error types.

use thiserror::Error;

use crate::refresh::RefreshError;

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed (network unreachable, timeout, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from server.
        message: String,
    },

    /// Authentication failed after the one allowed retry.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token refresh failed; the session has been terminated.
    #[error("Session expired: {0}")]
    Refresh(#[from] RefreshError),

    /// Server answered 2xx with a body we could not use.
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_)) || matches!(self, Error::Api { status: 404, .. })
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth(_))
            || matches!(self, Error::Api { status: 401, .. })
            || self.is_session_ended()
    }

    /// Check if the session was terminated by a failed refresh.
    pub fn is_session_ended(&self) -> bool {
        matches!(self, Error::Refresh(_))
    }

    /// Check if this is a server error.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Api { status, .. } if *status >= 500)
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error body returned by the server.
///
/// The backend is inconsistent about where it puts the message, so every
/// known location is optional.
#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub non_field_errors: Vec<String>,
    #[serde(default)]
    pub username: Vec<String>,
    #[serde(default)]
    pub email: Vec<String>,
    #[serde(default)]
    pub password1: Vec<String>,
}

impl ErrorResponse {
    /// Best human-readable message in the body, if any.
    pub fn into_message(self) -> Option<String> {
        if let Some(msg) = self.error.or(self.detail).or(self.message) {
            return Some(msg);
        }
        if let Some(msg) = self.non_field_errors.into_iter().next() {
            return Some(msg);
        }
        let fields = [
            ("Username", self.username),
            ("Email", self.email),
            ("Password", self.password1),
        ];
        fields.into_iter().find_map(|(label, errors)| {
            errors
                .into_iter()
                .next()
                .map(|msg| format!("{}: {}", label, msg))
        })
    }
}
