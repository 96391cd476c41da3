//! Request and response types for the chat API.
//!
//! The backend is loose about field names (`id` vs `_id`, `text` vs
//! `content`, snake vs camel case timestamps), so responses are read into
//! permissive `Raw*` shapes and normalised into the public types.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Chat
// ─────────────────────────────────────────────────────────────────────────────

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    /// True for messages the user sent, false for assistant replies.
    pub is_user: bool,
    pub timestamp: DateTime<Utc>,
    /// Image URL attached to the message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ChatMessage {
    /// A message typed by the user, stamped now.
    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            is_user: true,
            timestamp: Utc::now(),
            image: None,
        }
    }

    /// An assistant reply, stamped now.
    pub fn assistant(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            is_user: false,
            ..Self::user(id, text)
        }
    }
}

/// A conversation and its messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body for `POST /chat/`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

/// Signed-in user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// Result of a successful login or registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub access: String,
    pub refresh: String,
    pub user: UserProfile,
}

/// Input for account registration.
#[derive(Debug, Clone, Default)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl RegisterRequest {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = first.into();
        self.last_name = last.into();
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Normalisation
// ─────────────────────────────────────────────────────────────────────────────

/// Message as the backend may send it.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawMessage {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    id: Option<String>,
    #[serde(default, rename = "_id", deserialize_with = "opt_string_or_number")]
    object_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    is_user: Option<bool>,
    #[serde(default, rename = "isUser")]
    is_user_camel: Option<bool>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

impl RawMessage {
    pub(crate) fn normalize(self) -> ChatMessage {
        let timestamp = first_time([self.timestamp, self.created_at]).unwrap_or_else(Utc::now);
        ChatMessage {
            id: first_non_empty([self.id, self.object_id])
                .unwrap_or_else(|| timestamp.timestamp_millis().to_string()),
            text: first_non_empty([self.text, self.content]).unwrap_or_default(),
            is_user: self.is_user.or(self.is_user_camel).unwrap_or(false)
                || self.role.as_deref() == Some("user"),
            timestamp,
            image: first_non_empty([self.image, self.image_url]),
        }
    }
}

/// Session as the backend may send it.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawSession {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    id: Option<String>,
    #[serde(default, rename = "_id", deserialize_with = "opt_string_or_number")]
    object_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    messages: Option<Vec<RawMessage>>,
    #[serde(default, rename = "createdAt")]
    created_at_camel: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default, rename = "updatedAt")]
    updated_at_camel: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

impl RawSession {
    pub(crate) fn normalize(self) -> ChatSession {
        let created_at =
            first_time([self.created_at_camel, self.created_at]).unwrap_or_else(Utc::now);
        ChatSession {
            id: first_non_empty([self.id, self.object_id])
                .unwrap_or_else(|| created_at.timestamp_millis().to_string()),
            title: first_non_empty([self.title])
                .unwrap_or_else(|| format!("Chat {}", created_at.format("%Y-%m-%d"))),
            messages: self
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(RawMessage::normalize)
                .collect(),
            created_at,
            updated_at: first_time([self.updated_at_camel, self.updated_at]),
        }
    }
}

/// Parse a list of sessions from either a bare array or a paginated
/// `{"results": [...]}` envelope. Anything else is an empty list.
pub(crate) fn sessions_from_value(value: serde_json::Value) -> Vec<ChatSession> {
    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("results") {
            Some(serde_json::Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<RawSession>(item) {
            Ok(raw) => Some(raw.normalize()),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable chat session");
                None
            }
        })
        .collect()
}

/// First non-empty string among `keys` in a JSON object.
pub(crate) fn text_field(value: &serde_json::Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse a backend timestamp: RFC 3339, or a naive ISO datetime taken as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn first_non_empty<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates.into_iter().flatten().find(|s| !s.is_empty())
}

fn first_time<const N: usize>(candidates: [Option<String>; N]) -> Option<DateTime<Utc>> {
    candidates
        .into_iter()
        .flatten()
        .find_map(|raw| parse_timestamp(&raw))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(opt_string_or_number(deserializer)?.unwrap_or_default())
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?.map(String::from))
}
