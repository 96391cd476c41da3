//! Session termination.
//!
//! When a refresh fails the session is over: every persisted credential is
//! wiped and subscribers are told to send the user back to the sign-in entry
//! point. Subscribers watch a [`SessionState`] channel instead of being
//! called back, so late subscribers still see the final state.

use tokio::sync::watch;

use crate::credentials::SharedCredentialStore;

/// Authentication state of the client as seen by the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Credentials may be present; requests go out authenticated.
    Active,
    /// Credentials were cleared; the user must sign in again.
    SignedOut {
        /// Unauthenticated entry point to navigate to.
        redirect_to: String,
    },
}

/// Clears the credential store and publishes the signed-out state.
#[derive(Debug)]
pub struct SessionTerminator {
    store: SharedCredentialStore,
    signin_path: String,
    state: watch::Sender<SessionState>,
}

impl SessionTerminator {
    pub fn new(store: SharedCredentialStore, signin_path: impl Into<String>) -> Self {
        let (state, _) = watch::channel(SessionState::Active);
        Self {
            store,
            signin_path: signin_path.into(),
            state,
        }
    }

    /// Where the client is sent after termination.
    pub fn signin_path(&self) -> &str {
        &self.signin_path
    }

    /// Subscribe to session state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// End the session. Safe to call repeatedly or on an empty store.
    pub fn terminate(&self) {
        self.store.clear_all();

        let signed_out = SessionState::SignedOut {
            redirect_to: self.signin_path.clone(),
        };
        let changed = self.state.send_if_modified(|current| {
            if *current == signed_out {
                false
            } else {
                *current = signed_out.clone();
                true
            }
        });

        if changed {
            tracing::info!(redirect_to = %self.signin_path, "Session terminated");
        } else {
            tracing::debug!("Session already terminated");
        }
    }

    /// Mark the session active again after a fresh sign-in.
    pub fn reactivate(&self) {
        self.state.send_if_modified(|current| {
            if *current == SessionState::Active {
                false
            } else {
                *current = SessionState::Active;
                true
            }
        });
    }
}
