//! Account API: login, registration, logout and profile.

use serde::Serialize;
use serde_json::{Value, json};

use crate::client::ParleyClient;
use crate::credentials::CredentialPair;
use crate::error::{Error, Result};
use crate::refresh::RefreshError;
use crate::types::{AuthResponse, RegisterRequest, UserProfile, text_field};

/// Account API client.
pub struct AuthApi {
    client: ParleyClient,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    username: &'a str,
    email: &'a str,
    password1: &'a str,
    password2: &'a str,
    first_name: &'a str,
    last_name: &'a str,
}

impl AuthApi {
    pub(crate) fn new(client: ParleyClient) -> Self {
        Self { client }
    }

    /// Sign in and store the issued token pair.
    ///
    /// Any stored tokens are dropped first so the request goes out
    /// anonymous. The user profile comes from the login body when present,
    /// otherwise from `GET /users/profile/` with the new token.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse> {
        self.client.credentials().clear_all();
        let body: Value = self
            .client
            .post(
                "users/login/",
                &json!({ "username": username, "password": password }),
            )
            .await
            .map_err(rejected_credentials)?;

        let pair = token_pair(&body, "login")?;
        self.start_session(&pair);

        let user = match body.get("user").filter(|u| u.is_object()) {
            Some(user) => serde_json::from_value(user.clone())?,
            None => match self.profile().await {
                Ok(user) => user,
                Err(e) => {
                    // Half a sign-in is no sign-in
                    self.client.credentials().clear_all();
                    return Err(e);
                }
            },
        };

        tracing::info!(username = %user.username, "Signed in");
        Ok(AuthResponse {
            access: pair.access_token,
            refresh: pair.refresh_token,
            user,
        })
    }

    /// Create an account. The server signs the new user in directly.
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse> {
        self.client.credentials().clear_all();
        let body: Value = self
            .client
            .post(
                "users/register/",
                &RegisterBody {
                    username: &request.username,
                    email: &request.email,
                    password1: &request.password,
                    password2: &request.password,
                    first_name: &request.first_name,
                    last_name: &request.last_name,
                },
            )
            .await
            .map_err(rejected_credentials)?;

        let pair = token_pair(&body, "registration")?;
        self.start_session(&pair);

        let user = body.get("user").cloned().unwrap_or(Value::Null);
        let user = UserProfile {
            id: user
                .get("id")
                .map(|id| match id {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default(),
            username: text_field(&user, &["username"]).unwrap_or_else(|| request.username.clone()),
            email: text_field(&user, &["email"]).unwrap_or_else(|| request.email.clone()),
            first_name: text_field(&user, &["first_name"])
                .or_else(|| non_empty(&request.first_name)),
            last_name: text_field(&user, &["last_name"]).or_else(|| non_empty(&request.last_name)),
        };

        tracing::info!(username = %user.username, "Registered");
        Ok(AuthResponse {
            access: pair.access_token,
            refresh: pair.refresh_token,
            user,
        })
    }

    /// Sign out. Local credentials are cleared even if the server call fails.
    pub async fn logout(&self) {
        if let Some(refresh) = self.client.credentials().refresh_token() {
            let result: Result<Value> = self
                .client
                .post("users/logout/", &json!({ "refresh": refresh }))
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, "Logout request failed");
            }
        }
        self.client.terminator().terminate();
    }

    /// Fetch the signed-in user's profile.
    pub async fn profile(&self) -> Result<UserProfile> {
        self.client.get("users/profile/").await
    }

    fn start_session(&self, pair: &CredentialPair) {
        self.client.credentials().store_pair(pair);
        self.client.terminator().reactivate();
    }
}

fn token_pair(body: &Value, what: &str) -> Result<CredentialPair> {
    match (
        text_field(body, &["access"]),
        text_field(body, &["refresh"]),
    ) {
        (Some(access), Some(refresh)) => Ok(CredentialPair::new(access, refresh)),
        _ => Err(Error::InvalidResponse(format!(
            "{} response is missing tokens",
            what
        ))),
    }
}

/// A 401 on an anonymous request has no refresh token behind it; report it
/// as bad credentials rather than an expired session.
fn rejected_credentials(err: Error) -> Error {
    match err {
        Error::Refresh(RefreshError::MissingRefreshToken) => {
            Error::Auth("Invalid username or password".to_string())
        }
        other => other,
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
