//! Chat session state for the interactive client.
//!
//! Holds the session list, the selected session and the last user-facing
//! error. Sessions created locally (before the server has seen them) are
//! tracked so their ids are never sent to the server; after the first reply
//! they take over the id the server assigned.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use parley_client::{ChatMessage, ChatSession, ParleyClient, Upload};

/// Longest prefix of the first message used as a session title.
const TITLE_CHARS: usize = 30;

/// Title given to sessions created locally.
const NEW_CHAT_TITLE: &str = "New Chat";

/// Chat operations the state manager needs from the server.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn history(&self) -> parley_client::Result<Vec<ChatSession>>;

    async fn send(&self, prompt: &str, session_id: Option<&str>) -> parley_client::Result<String>;

    async fn send_with_image(
        &self,
        prompt: &str,
        image: Upload,
        session_id: Option<&str>,
    ) -> parley_client::Result<String>;

    async fn delete_session(&self, id: &str) -> parley_client::Result<()>;

    async fn rename_session(&self, id: &str, title: &str) -> parley_client::Result<()>;
}

#[async_trait]
impl ChatBackend for ParleyClient {
    async fn history(&self) -> parley_client::Result<Vec<ChatSession>> {
        self.chat().history().await
    }

    async fn send(&self, prompt: &str, session_id: Option<&str>) -> parley_client::Result<String> {
        self.chat().send(prompt, session_id).await
    }

    async fn send_with_image(
        &self,
        prompt: &str,
        image: Upload,
        session_id: Option<&str>,
    ) -> parley_client::Result<String> {
        self.chat().send_with_image(prompt, image, session_id).await
    }

    async fn delete_session(&self, id: &str) -> parley_client::Result<()> {
        self.chat().delete_session(id).await
    }

    async fn rename_session(&self, id: &str, title: &str) -> parley_client::Result<()> {
        self.chat().rename_session(id, title).await
    }
}

/// Local view of the user's chat sessions.
pub struct ChatState<B> {
    backend: B,
    history: Vec<ChatSession>,
    current: Option<String>,
    local: HashSet<String>,
    loading: bool,
    error: Option<String>,
}

impl<B: ChatBackend> ChatState<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            history: Vec::new(),
            current: None,
            local: HashSet::new(),
            loading: false,
            error: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The selected session, if any.
    pub fn current(&self) -> Option<&ChatSession> {
        let id = self.current.as_deref()?;
        self.history.iter().find(|s| s.id == id)
    }

    pub fn history(&self) -> &[ChatSession] {
        &self.history
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Last user-facing error.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Whether a session exists only on this side.
    pub fn is_local(&self, id: &str) -> bool {
        self.local.contains(id)
    }

    /// Replace the session list with the server's.
    ///
    /// On failure the list is emptied and the error recorded.
    pub async fn load_history(&mut self) -> parley_client::Result<()> {
        self.loading = true;
        let result = self.backend.history().await;
        self.loading = false;

        match result {
            Ok(sessions) => {
                self.history = sessions;
                self.local.clear();
                if self.current().is_none() {
                    self.current = None;
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load chat history");
                self.error = Some("Failed to load chat history".to_string());
                self.history.clear();
                self.local.clear();
                self.current = None;
                Err(e)
            }
        }
    }

    /// Load history and select the most recent session, or start one.
    pub async fn initialize(&mut self) {
        // Failure is already recorded in `error`
        let _ = self.load_history().await;
        match self.history.first() {
            Some(first) => self.current = Some(first.id.clone()),
            None => {
                self.new_session();
            }
        }
    }

    /// Start a fresh local session and select it.
    pub fn new_session(&mut self) -> &ChatSession {
        let id = uuid::Uuid::new_v4().to_string();
        self.history.insert(
            0,
            ChatSession {
                id: id.clone(),
                title: NEW_CHAT_TITLE.to_string(),
                messages: Vec::new(),
                created_at: Utc::now(),
                updated_at: None,
            },
        );
        self.local.insert(id.clone());
        self.current = Some(id);
        &self.history[0]
    }

    /// Select a session from the list.
    pub fn load_session(&mut self, id: &str) -> bool {
        if self.history.iter().any(|s| s.id == id) {
            self.current = Some(id.to_string());
            true
        } else {
            self.error = Some(format!("Session {} not found", id));
            false
        }
    }

    /// Send a message in the current session.
    ///
    /// Blank input is ignored and yields `Ok(None)`. On failure the user's
    /// message stays in the session and the error is recorded.
    pub async fn send_message(&mut self, text: &str) -> parley_client::Result<Option<String>> {
        self.send(text, None).await
    }

    /// Send a message with an image in the current session.
    pub async fn send_message_with_image(
        &mut self,
        text: &str,
        image: Upload,
    ) -> parley_client::Result<Option<String>> {
        self.send(text, Some(image)).await
    }

    async fn send(
        &mut self,
        text: &str,
        image: Option<Upload>,
    ) -> parley_client::Result<Option<String>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let session_id = match self.current() {
            Some(session) => session.id.clone(),
            None => self.new_session().id.clone(),
        };
        let server_id = (!self.is_local(&session_id)).then(|| session_id.clone());

        let mut user_message = ChatMessage::user(message_id(), text);
        if let Some(image) = &image {
            user_message.image = Some(image.file_name.clone());
        }
        self.update_session(&session_id, |session| {
            if session.messages.is_empty() {
                session.title = title_from(text);
            }
            session.messages.push(user_message);
        });

        self.loading = true;
        let result = match image {
            Some(image) => {
                self.backend
                    .send_with_image(text, image, server_id.as_deref())
                    .await
            }
            None => self.backend.send(text, server_id.as_deref()).await,
        };
        self.loading = false;

        match result {
            Ok(reply) => {
                let message = ChatMessage::assistant(message_id(), reply.clone());
                self.update_session(&session_id, |session| session.messages.push(message));
                if server_id.is_none() {
                    self.adopt_server_session(&session_id).await;
                }
                Ok(Some(reply))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to send message");
                self.error = Some("Failed to send message".to_string());
                Err(e)
            }
        }
    }

    /// Rename the current session.
    pub async fn rename_current(&mut self, title: &str) -> parley_client::Result<()> {
        let Some(id) = self.current.clone() else {
            return Ok(());
        };
        if !self.is_local(&id)
            && let Err(e) = self.backend.rename_session(&id, title).await
        {
            self.error = Some("Failed to rename session".to_string());
            return Err(e);
        }
        self.update_session(&id, |session| session.title = title.to_string());
        Ok(())
    }

    /// Delete a session; if it was selected, move to the next one.
    pub async fn delete_session(&mut self, id: &str) -> parley_client::Result<()> {
        if !self.is_local(id)
            && let Err(e) = self.backend.delete_session(id).await
        {
            tracing::warn!(error = %e, session_id = id, "Failed to delete session");
            self.error = Some("Failed to delete session".to_string());
            return Err(e);
        }

        self.history.retain(|s| s.id != id);
        self.local.remove(id);

        if self.current.as_deref() == Some(id) {
            match self.history.first() {
                Some(next) => self.current = Some(next.id.clone()),
                None => {
                    self.new_session();
                }
            }
        }
        Ok(())
    }

    /// Swap a local session's id for the one the server created on its
    /// first message, so later messages continue that conversation.
    ///
    /// The new server session is the first one in history we did not know
    /// about. If none shows up, the session stays local.
    async fn adopt_server_session(&mut self, local_id: &str) {
        let known: HashSet<String> = self
            .history
            .iter()
            .filter(|s| !self.local.contains(&s.id))
            .map(|s| s.id.clone())
            .collect();

        let sessions = match self.backend.history().await {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::debug!(error = %e, "Could not look up new server session");
                return;
            }
        };
        let Some(created) = sessions.into_iter().find(|s| !known.contains(&s.id)) else {
            return;
        };

        tracing::debug!(local_id, server_id = %created.id, "Session saved on server");
        if let Some(session) = self.history.iter_mut().find(|s| s.id == local_id) {
            session.id = created.id.clone();
            session.created_at = created.created_at;
        }
        self.local.remove(local_id);
        if self.current.as_deref() == Some(local_id) {
            self.current = Some(created.id);
        }
    }

    fn update_session(&mut self, id: &str, f: impl FnOnce(&mut ChatSession)) {
        if let Some(session) = self.history.iter_mut().find(|s| s.id == id) {
            f(session);
            session.updated_at = Some(Utc::now());
        }
    }
}

/// Title for a session from its first message.
fn title_from(text: &str) -> String {
    let mut chars = text.chars();
    let prefix: String = chars.by_ref().take(TITLE_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", prefix)
    } else {
        prefix
    }
}

fn message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records calls and answers from canned results.
    #[derive(Default)]
    struct FakeBackend {
        sessions: Vec<ChatSession>,
        /// Sessions the server started for messages sent without an id.
        created: Mutex<Vec<ChatSession>>,
        fail: bool,
        sent: Mutex<Vec<(String, Option<String>)>>,
        deleted: Mutex<Vec<String>>,
        renamed: Mutex<Vec<(String, String)>>,
    }

    fn failure() -> parley_client::Error {
        parley_client::Error::Api {
            status: 500,
            message: "boom".to_string(),
        }
    }

    #[async_trait]
    impl ChatBackend for FakeBackend {
        async fn history(&self) -> parley_client::Result<Vec<ChatSession>> {
            if self.fail {
                return Err(failure());
            }
            let mut sessions = self.created.lock().unwrap().clone();
            sessions.extend(self.sessions.iter().cloned());
            Ok(sessions)
        }

        async fn send(
            &self,
            prompt: &str,
            session_id: Option<&str>,
        ) -> parley_client::Result<String> {
            self.sent
                .lock()
                .unwrap()
                .push((prompt.to_string(), session_id.map(str::to_string)));
            if self.fail {
                return Err(failure());
            }
            if session_id.is_none() {
                let mut created = self.created.lock().unwrap();
                let id = format!("srv-{}", created.len() + 1);
                created.insert(0, server_session(&id, prompt));
            }
            Ok(format!("echo: {}", prompt))
        }

        async fn send_with_image(
            &self,
            prompt: &str,
            image: Upload,
            session_id: Option<&str>,
        ) -> parley_client::Result<String> {
            self.send(&format!("{} [{}]", prompt, image.file_name), session_id)
                .await
        }

        async fn delete_session(&self, id: &str) -> parley_client::Result<()> {
            if self.fail {
                return Err(failure());
            }
            self.deleted.lock().unwrap().push(id.to_string());
            Ok(())
        }

        async fn rename_session(&self, id: &str, title: &str) -> parley_client::Result<()> {
            self.renamed
                .lock()
                .unwrap()
                .push((id.to_string(), title.to_string()));
            Ok(())
        }
    }

    fn server_session(id: &str, title: &str) -> ChatSession {
        ChatSession {
            id: id.to_string(),
            title: title.to_string(),
            messages: Vec::new(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn backend_with(ids: &[&str]) -> FakeBackend {
        FakeBackend {
            sessions: ids.iter().map(|id| server_session(id, id)).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_initialize_selects_first_session() {
        let mut state = ChatState::new(backend_with(&["s1", "s2"]));

        state.initialize().await;

        assert_eq!(state.history().len(), 2);
        assert_eq!(state.current().unwrap().id, "s1");
        assert!(state.error().is_none());
    }

    #[tokio::test]
    async fn test_initialize_with_empty_history_starts_new_chat() {
        let mut state = ChatState::new(backend_with(&[]));

        state.initialize().await;

        let current = state.current().unwrap();
        assert_eq!(current.title, "New Chat");
        assert!(state.is_local(&current.id));
    }

    #[tokio::test]
    async fn test_failed_history_records_error() {
        let mut state = ChatState::new(FakeBackend {
            fail: true,
            ..backend_with(&["s1"])
        });

        assert!(state.load_history().await.is_err());

        assert_eq!(state.error(), Some("Failed to load chat history"));
        assert!(state.history().is_empty());
        assert!(!state.is_loading());

        state.clear_error();
        assert!(state.error().is_none());
    }

    #[tokio::test]
    async fn test_first_message_titles_session() {
        let mut state = ChatState::new(backend_with(&[]));
        state.new_session();

        let reply = state
            .send_message("Plan a three day trip to Lisbon in spring")
            .await
            .unwrap();

        assert_eq!(reply.as_deref(), Some("echo: Plan a three day trip to Lisbon in spring"));
        let current = state.current().unwrap();
        assert_eq!(current.title, "Plan a three day trip to Lisbo...");
        assert_eq!(current.messages.len(), 2);
        assert!(current.messages[0].is_user);
        assert!(!current.messages[1].is_user);

        // Later messages leave the title alone
        state.send_message("Add a day in Porto").await.unwrap();
        assert_eq!(state.current().unwrap().title, "Plan a three day trip to Lisbo...");
    }

    #[tokio::test]
    async fn test_short_first_message_is_whole_title() {
        let mut state = ChatState::new(backend_with(&[]));
        state.send_message("  hello  ").await.unwrap();
        assert_eq!(state.current().unwrap().title, "hello");
    }

    #[tokio::test]
    async fn test_blank_message_is_ignored() {
        let mut state = ChatState::new(backend_with(&[]));
        state.new_session();

        assert_eq!(state.send_message("   ").await.unwrap(), None);

        assert!(state.current().unwrap().messages.is_empty());
        assert!(state.backend().sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_id_only_sent_for_server_sessions() {
        let mut state = ChatState::new(backend_with(&["s1"]));
        state.initialize().await;

        state.send_message("on the server").await.unwrap();
        state.new_session();
        state.send_message("local only").await.unwrap();

        let sent = state.backend().sent.lock().unwrap().clone();
        assert_eq!(sent[0], ("on the server".to_string(), Some("s1".to_string())));
        assert_eq!(sent[1], ("local only".to_string(), None));
    }

    #[tokio::test]
    async fn test_local_session_takes_server_id_after_first_reply() {
        let mut state = ChatState::new(backend_with(&["s1"]));
        state.initialize().await;
        let local_id = state.new_session().id.clone();

        state.send_message("first").await.unwrap();

        let current = state.current().unwrap();
        assert_eq!(current.id, "srv-1");
        assert_eq!(current.title, "first");
        assert_eq!(current.messages.len(), 2);
        assert!(!state.is_local("srv-1"));
        assert!(state.history().iter().all(|s| s.id != local_id));

        state.send_message("second").await.unwrap();

        let sent = state.backend().sent.lock().unwrap().clone();
        assert_eq!(sent[0], ("first".to_string(), None));
        assert_eq!(sent[1], ("second".to_string(), Some("srv-1".to_string())));
        assert_eq!(state.backend().created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_send_keeps_user_message() {
        let mut state = ChatState::new(FakeBackend {
            fail: true,
            ..Default::default()
        });
        state.new_session();

        assert!(state.send_message("hello").await.is_err());

        assert_eq!(state.error(), Some("Failed to send message"));
        let current = state.current().unwrap();
        assert_eq!(current.messages.len(), 1);
        assert_eq!(current.messages[0].text, "hello");
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn test_send_with_image() {
        let mut state = ChatState::new(backend_with(&[]));
        state.new_session();

        let reply = state
            .send_message_with_image("what is this?", Upload::new("cat.png", vec![1]))
            .await
            .unwrap();

        assert_eq!(reply.as_deref(), Some("echo: what is this? [cat.png]"));
        assert_eq!(
            state.current().unwrap().messages[0].image.as_deref(),
            Some("cat.png")
        );
    }

    #[tokio::test]
    async fn test_delete_current_moves_to_next() {
        let mut state = ChatState::new(backend_with(&["s1", "s2"]));
        state.initialize().await;

        state.delete_session("s1").await.unwrap();

        assert_eq!(state.current().unwrap().id, "s2");
        assert_eq!(*state.backend().deleted.lock().unwrap(), vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_last_session_starts_new_chat() {
        let mut state = ChatState::new(backend_with(&["s1"]));
        state.initialize().await;

        state.delete_session("s1").await.unwrap();

        assert_eq!(state.history().len(), 1);
        assert_eq!(state.current().unwrap().title, "New Chat");
    }

    #[tokio::test]
    async fn test_delete_local_session_skips_server() {
        let mut state = ChatState::new(backend_with(&[]));
        let id = state.new_session().id.clone();

        state.delete_session(&id).await.unwrap();

        assert!(state.backend().deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_session() {
        let mut state = ChatState::new(backend_with(&["s1", "s2"]));
        state.initialize().await;

        assert!(state.load_session("s2"));
        assert_eq!(state.current().unwrap().id, "s2");

        assert!(!state.load_session("missing"));
        assert_eq!(state.current().unwrap().id, "s2");
        assert!(state.error().is_some());
    }

    #[tokio::test]
    async fn test_rename_current() {
        let mut state = ChatState::new(backend_with(&["s1"]));
        state.initialize().await;

        state.rename_current("Renamed").await.unwrap();

        assert_eq!(state.current().unwrap().title, "Renamed");
        assert_eq!(
            *state.backend().renamed.lock().unwrap(),
            vec![("s1".to_string(), "Renamed".to_string())]
        );
    }

    #[test]
    fn test_title_from_counts_characters() {
        assert_eq!(title_from("short"), "short");
        assert_eq!(title_from(&"é".repeat(30)), "é".repeat(30));
        assert_eq!(title_from(&"é".repeat(31)), format!("{}...", "é".repeat(30)));
    }
}
