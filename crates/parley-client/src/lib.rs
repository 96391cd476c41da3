//! HTTP client SDK for the parley chat service.
//!
//! This crate provides a typed client for the chat backend, with
//! transparent access-token refresh.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use parley_client::{FileCredentialStore, ParleyClient, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = ParleyClient::builder()
//!     .base_url("http://localhost:8000/api")
//!     .credential_store(Arc::new(FileCredentialStore::open("credentials.json")))
//!     .build()?;
//!
//! client.auth().login("alice", "hunter2").await?;
//!
//! let session = client.chat().create_session().await?;
//! let reply = client.chat().send("Hello!", Some(&session.id)).await?;
//! println!("{}", reply);
//! # Ok(())
//! # }
//! ```
//!
//! # Authentication
//!
//! Requests carry `Authorization: Bearer <access token>` from the
//! [`CredentialStore`]. When the server answers 401 the client refreshes
//! the access token once and replays the request. Concurrent 401s share a
//! single refresh through the [`RefreshCoordinator`]. If the refresh fails
//! the [`SessionTerminator`] clears the store and publishes
//! [`SessionState::SignedOut`].
//!
//! # API Coverage
//!
//! - **Chat**: Send prompts (optionally with an image), list, load, create,
//!   rename and delete sessions, transcribe audio
//! - **Auth**: Login, register, logout, profile

pub mod api;
pub mod client;
pub mod credentials;
pub mod error;
pub mod refresh;
pub mod session;
pub mod transport;
pub mod types;

pub use client::{ClientBuilder, ParleyClient};
pub use credentials::{
    ACCESS_TOKEN, CredentialPair, CredentialStore, FileCredentialStore, MemoryCredentialStore,
    REFRESH_TOKEN, SharedCredentialStore,
};
pub use error::{Error, Result};
pub use refresh::{
    HttpTokenRefresher, REFRESH_PATH, RefreshCoordinator, RefreshError, RefreshedTokens,
    TokenRefresher,
};
pub use session::{SessionState, SessionTerminator};
pub use transport::{ApiRequest, AuthDecision, MultipartForm, RequestBody, Upload};
pub use types::*;
