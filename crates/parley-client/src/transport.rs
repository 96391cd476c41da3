//! Replayable requests and the auth interceptors.
//!
//! A request has to survive being sent twice (once with the stale token,
//! once with the refreshed one), so it is kept as owned data and turned into
//! a `reqwest` request on every attempt.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;

use crate::credentials::CredentialStore;
use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// An API call: method, path relative to the base URL, headers and body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attach a multipart body.
    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Whether this request has already been replayed after a refresh.
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retried = true;
    }

    /// Pin the bearer token used for the next send.
    pub(crate) fn set_bearer(&mut self, token: &str) -> Result<()> {
        let value = bearer_value(token)
            .ok_or_else(|| Error::InvalidResponse("access token is not a valid header value".into()))?;
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// Request payload.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(MultipartForm),
}

// ─────────────────────────────────────────────────────────────────────────────
// Multipart
// ─────────────────────────────────────────────────────────────────────────────

/// A file to upload.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: None,
            bytes,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

#[derive(Debug, Clone)]
enum FormPart {
    Text(String),
    File(Upload),
}

/// Owned multipart form that can be rebuilt for every send.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    parts: Vec<(String, FormPart)>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push((name.into(), FormPart::Text(value.into())));
        self
    }

    pub fn file(mut self, name: impl Into<String>, upload: Upload) -> Self {
        self.parts.push((name.into(), FormPart::File(upload)));
        self
    }

    /// Field names in insertion order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(name, _)| name.as_str())
    }

    pub(crate) fn to_form(&self) -> Result<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for (name, part) in &self.parts {
            form = match part {
                FormPart::Text(value) => form.text(name.clone(), value.clone()),
                FormPart::File(upload) => {
                    let mut part = reqwest::multipart::Part::bytes(upload.bytes.clone())
                        .file_name(upload.file_name.clone());
                    if let Some(mime) = &upload.mime_type {
                        part = part.mime_str(mime)?;
                    }
                    form.part(name.clone(), part)
                }
            };
        }
        Ok(form)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Interceptors
// ─────────────────────────────────────────────────────────────────────────────

/// Build an `Authorization: Bearer` value, or `None` if the token contains
/// bytes that cannot go in a header.
pub(crate) fn bearer_value(token: &str) -> Option<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).ok()?;
    value.set_sensitive(true);
    Some(value)
}

/// Request interceptor: attach the stored access token.
///
/// A header already present on the request (a replay pinned to a refreshed
/// token, or one set by the caller) wins. A missing token is not an error;
/// the request simply goes out unauthenticated.
pub fn authorize(headers: &mut HeaderMap, store: &dyn CredentialStore) {
    if headers.contains_key(AUTHORIZATION) {
        return;
    }
    let Some(token) = store.access_token() else {
        return;
    };
    match bearer_value(&token) {
        Some(value) => {
            headers.insert(AUTHORIZATION, value);
        }
        None => tracing::warn!("Stored access token is not a valid header value; sending unauthenticated"),
    }
}

/// What the response interceptor does with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// Not an authorization failure; hand it back unchanged.
    PassThrough,
    /// First 401 for this request; refresh and replay once.
    RefreshRequired,
    /// 401 on a request that was already replayed; give up.
    Failed,
}

/// Response interceptor decision for a status code.
pub fn classify(status: StatusCode, already_retried: bool) -> AuthDecision {
    match (status, already_retried) {
        (StatusCode::UNAUTHORIZED, false) => AuthDecision::RefreshRequired,
        (StatusCode::UNAUTHORIZED, true) => AuthDecision::Failed,
        _ => AuthDecision::PassThrough,
    }
}
