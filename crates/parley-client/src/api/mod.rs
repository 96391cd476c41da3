//! API endpoint implementations.

mod auth;
mod chat;

pub use auth::AuthApi;
pub use chat::ChatApi;
