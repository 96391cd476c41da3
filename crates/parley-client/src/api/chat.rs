//! Chat API.

use serde_json::{Value, json};

use crate::client::ParleyClient;
use crate::error::Result;
use crate::transport::{MultipartForm, Upload};
use crate::types::{ChatRequest, ChatSession, RawSession, sessions_from_value, text_field};

/// Keys the backend may put the assistant reply under.
const REPLY_KEYS: &[&str] = &["response", "message", "content"];

/// Keys the backend may put a transcription under.
const TRANSCRIPTION_KEYS: &[&str] = &["transcription", "text"];

/// Chat API client.
pub struct ChatApi {
    client: ParleyClient,
}

impl ChatApi {
    pub(crate) fn new(client: ParleyClient) -> Self {
        Self { client }
    }

    /// Send a prompt and get the assistant's reply text.
    pub async fn send(&self, prompt: &str, session_id: Option<&str>) -> Result<String> {
        let mut request = ChatRequest::new(prompt);
        request.session_id = session_id.map(str::to_string);

        let body: Value = self.client.post("chat/", &request).await?;
        Ok(text_field(&body, REPLY_KEYS).unwrap_or_default())
    }

    /// Send a prompt with an attached image.
    pub async fn send_with_image(
        &self,
        prompt: &str,
        image: Upload,
        session_id: Option<&str>,
    ) -> Result<String> {
        let mut form = MultipartForm::new().text("prompt", prompt).file("image", image);
        if let Some(id) = session_id {
            form = form.text("session_id", id);
        }

        let body: Value = self.client.post_multipart("chat/", form).await?;
        Ok(text_field(&body, REPLY_KEYS).unwrap_or_default())
    }

    /// List the user's chat sessions, newest first as the server orders them.
    pub async fn history(&self) -> Result<Vec<ChatSession>> {
        let body: Value = self.client.get("chat-history/").await?;
        Ok(sessions_from_value(body))
    }

    /// Get a session with its messages.
    pub async fn session(&self, id: &str) -> Result<ChatSession> {
        let raw: RawSession = self.client.get(&format!("chat/{}/", id)).await?;
        Ok(raw.normalize())
    }

    /// Start a new session on the server.
    pub async fn create_session(&self) -> Result<ChatSession> {
        let raw: RawSession = self.client.post_empty("chat/new/").await?;
        Ok(raw.normalize())
    }

    /// Delete a session. Deleting one that no longer exists succeeds.
    pub async fn delete_session(&self, id: &str) -> Result<()> {
        match self.client.delete(&format!("chat/{}/", id)).await {
            Err(e) if e.is_not_found() => {
                tracing::debug!(session_id = id, "Session already gone");
                Ok(())
            }
            other => other,
        }
    }

    /// Rename a session.
    pub async fn rename_session(&self, id: &str, title: &str) -> Result<()> {
        self.client
            .patch(&format!("chat/{}/", id), &json!({ "title": title }))
            .await
    }

    /// Transcribe an audio clip to text.
    pub async fn transcribe(&self, audio: Upload) -> Result<String> {
        let form = MultipartForm::new().file("audio", audio);
        let body: Value = self.client.post_multipart("transcribe-audio/", form).await?;
        Ok(text_field(&body, TRANSCRIPTION_KEYS).unwrap_or_default())
    }
}
