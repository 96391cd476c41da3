//! Single-flight access token refresh.
//!
//! When a request comes back 401 the client asks the [`RefreshCoordinator`]
//! for a new access token. The first caller to arrive while the coordinator
//! is idle performs the refresh; everyone who arrives while it is running is
//! queued and handed the same outcome once it settles, so any number of
//! concurrently failing requests produce exactly one refresh call.
//!
//! ```text
//!            request_refresh()             refresh settles
//!   Idle ──────────────────────▶ Refreshing ───────────────▶ Idle
//!                                  │   ▲     (waiters settled FIFO,
//!                 request_refresh()│   │      then state cleared)
//!                                  └───┘
//!                                 enqueue
//! ```
//!
//! A failed refresh is fatal to the session: the [`SessionTerminator`] runs
//! before any waiter observes the error.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use url::Url;

use crate::credentials::SharedCredentialStore;
use crate::error::ErrorResponse;
use crate::session::SessionTerminator;

/// Refresh endpoint, relative to the API base URL.
pub const REFRESH_PATH: &str = "users/token/refresh/";

/// Why a refresh could not produce a new access token.
///
/// `Clone` so one outcome can be handed to every queued caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// No refresh token stored; nothing to refresh with.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// Server refused the refresh token.
    #[error("refresh rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Refresh call never got an answer.
    #[error("refresh request failed: {0}")]
    Transport(String),

    /// 2xx answer without a usable access token.
    #[error("malformed refresh response: {0}")]
    MalformedResponse(String),

    /// The refreshing task went away before settling.
    #[error("refresh abandoned before completing")]
    Abandoned,
}

/// Tokens returned by a successful refresh.
///
/// The backend may or may not rotate the refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshedTokens {
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

// ============================================================================
// TokenRefresher
// ============================================================================

/// Performs the actual refresh network call.
#[async_trait]
pub trait TokenRefresher: Send + Sync + fmt::Debug {
    /// Exchange a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshError>;
}

/// `POST /users/token/refresh/` with `{"refresh": ...}`.
///
/// Uses the bare HTTP client: the refresh call itself never goes through the
/// auth interceptors, so a 401 here is a plain failure rather than a nested
/// refresh.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    http: reqwest::Client,
    url: Url,
    timeout: Duration,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

impl HttpTokenRefresher {
    /// Create a refresher for the API rooted at `base_url`.
    pub fn new(
        http: reqwest::Client,
        base_url: &Url,
        timeout: Duration,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            http,
            url: base_url.join(REFRESH_PATH)?,
            timeout,
        })
    }

    /// Refresh endpoint URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshError> {
        let response = self
            .http
            .post(self.url.clone())
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                message: rejection_message(status, &body),
            });
        }

        let tokens: RefreshedTokens = serde_json::from_slice(&body)
            .map_err(|e| RefreshError::MalformedResponse(e.to_string()))?;
        if tokens.access.is_empty() {
            return Err(RefreshError::MalformedResponse(
                "empty access token".to_string(),
            ));
        }

        Ok(tokens)
    }
}

fn rejection_message(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<ErrorResponse>(body)
        .ok()
        .and_then(ErrorResponse::into_message)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

// ============================================================================
// RefreshCoordinator
// ============================================================================

type Waiter = oneshot::Sender<Result<String, RefreshError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshState {
    Idle,
    Refreshing,
}

#[derive(Debug)]
struct Flight {
    state: RefreshState,
    waiters: Vec<Waiter>,
}

/// Owns the refresh-in-flight state and the queue of waiting callers.
///
/// The lock is never held across an `.await`: the idle check and the switch
/// to `Refreshing` happen in one critical section, and so do draining the
/// queue and switching back to `Idle`.
pub struct RefreshCoordinator {
    store: SharedCredentialStore,
    refresher: Arc<dyn TokenRefresher>,
    terminator: Arc<SessionTerminator>,
    flight: Mutex<Flight>,
}

impl RefreshCoordinator {
    pub fn new(
        store: SharedCredentialStore,
        refresher: Arc<dyn TokenRefresher>,
        terminator: Arc<SessionTerminator>,
    ) -> Self {
        Self {
            store,
            refresher,
            terminator,
            flight: Mutex::new(Flight {
                state: RefreshState::Idle,
                waiters: Vec::new(),
            }),
        }
    }

    /// Whether a refresh call is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.flight.lock().state == RefreshState::Refreshing
    }

    /// Number of callers waiting on the in-flight refresh.
    pub fn pending(&self) -> usize {
        self.flight.lock().waiters.len()
    }

    /// Get a fresh access token, sharing any refresh already in flight.
    ///
    /// On failure the session has already been terminated by the time the
    /// error is returned.
    pub async fn request_refresh(&self) -> Result<String, RefreshError> {
        let waiter = {
            let mut flight = self.flight.lock();
            match flight.state {
                RefreshState::Refreshing => {
                    let (tx, rx) = oneshot::channel();
                    flight.waiters.push(tx);
                    tracing::debug!(queued = flight.waiters.len(), "Refresh in flight, waiting");
                    Some(rx)
                }
                RefreshState::Idle => {
                    flight.state = RefreshState::Refreshing;
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            return rx.await.unwrap_or(Err(RefreshError::Abandoned));
        }

        let mut guard = InFlight {
            coordinator: self,
            settled: false,
        };

        let outcome = self.perform_refresh().await;
        if let Err(e) = &outcome {
            tracing::warn!(error = %e, "Token refresh failed, ending session");
            self.terminator.terminate();
        }

        guard.settle(&outcome);
        outcome
    }

    async fn perform_refresh(&self) -> Result<String, RefreshError> {
        let Some(refresh_token) = self.store.refresh_token() else {
            return Err(RefreshError::MissingRefreshToken);
        };

        tracing::info!("Access token rejected, refreshing");
        let tokens = self.refresher.refresh(&refresh_token).await?;

        self.store
            .store_tokens(&tokens.access, tokens.refresh.as_deref());
        tracing::info!(rotated = tokens.refresh.is_some(), "Token refreshed");

        Ok(tokens.access)
    }

    /// Hand the outcome to every waiter in arrival order, then go idle.
    fn settle(&self, outcome: &Result<String, RefreshError>) {
        let mut flight = self.flight.lock();
        let waiters = std::mem::take(&mut flight.waiters);
        if !waiters.is_empty() {
            tracing::debug!(waiters = waiters.len(), ok = outcome.is_ok(), "Releasing queued requests");
        }
        for waiter in waiters {
            // Receiver gone means that caller stopped caring
            let _ = waiter.send(outcome.clone());
        }
        flight.state = RefreshState::Idle;
    }
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flight = self.flight.lock();
        f.debug_struct("RefreshCoordinator")
            .field("state", &flight.state)
            .field("waiters", &flight.waiters.len())
            .field("refresher", &self.refresher)
            .finish()
    }
}

/// Settles the flight if the refreshing future is dropped mid-call, so
/// queued callers are not stranded and the coordinator can go idle again.
struct InFlight<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(&mut self, outcome: &Result<String, RefreshError>) {
        self.coordinator.settle(outcome);
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("Refresh dropped before completing");
            self.coordinator.settle(&Err(RefreshError::Abandoned));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
