//! Main client implementation.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use url::Url;

use crate::api::{AuthApi, ChatApi};
use crate::credentials::{MemoryCredentialStore, SharedCredentialStore};
use crate::error::{Error, ErrorResponse, Result};
use crate::refresh::{HttpTokenRefresher, RefreshCoordinator, TokenRefresher};
use crate::session::{SessionState, SessionTerminator};
use crate::transport::{ApiRequest, AuthDecision, MultipartForm, RequestBody, authorize, classify};

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default unauthenticated entry point.
const DEFAULT_SIGNIN_PATH: &str = "/signin";

/// Parley API client.
///
/// Every request goes through the auth interceptors: the stored access token
/// is attached on the way out, and a 401 on the way back triggers one shared
/// token refresh and a single replay of the request.
///
/// # Example
///
/// ```no_run
/// use parley_client::ParleyClient;
///
/// # async fn example() -> parley_client::Result<()> {
/// let client = ParleyClient::builder()
///     .base_url("http://localhost:8000/api")
///     .build()?;
///
/// client.auth().login("alice", "hunter2").await?;
/// let sessions = client.chat().history().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ParleyClient {
    inner: Arc<ClientInner>,
}

/// Inner client state (shared across clones).
struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    store: SharedCredentialStore,
    terminator: Arc<SessionTerminator>,
    coordinator: Arc<RefreshCoordinator>,
}

impl std::fmt::Debug for ParleyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParleyClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("timeout", &self.inner.timeout)
            .field("coordinator", &self.inner.coordinator)
            .finish_non_exhaustive()
    }
}

impl ParleyClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// The credential store backing this client.
    pub fn credentials(&self) -> &SharedCredentialStore {
        &self.inner.store
    }

    /// Session terminator; fires when a refresh fails or on logout.
    pub fn terminator(&self) -> &Arc<SessionTerminator> {
        &self.inner.terminator
    }

    /// Watch for the session being signed out.
    pub fn subscribe_session(&self) -> watch::Receiver<SessionState> {
        self.inner.terminator.subscribe()
    }

    /// The shared refresh coordinator.
    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.inner.coordinator
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Access the chat API.
    pub fn chat(&self) -> ChatApi {
        ChatApi::new(self.clone())
    }

    /// Access the account API.
    pub fn auth(&self) -> AuthApi {
        AuthApi::new(self.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a URL for an API path.
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        let path = path.trim_start_matches('/');
        self.inner.base_url.join(path).map_err(Error::from)
    }

    /// Send a request through the auth interceptors.
    ///
    /// The returned response is whatever the server finally answered: the
    /// original response when no refresh was needed, the replayed response
    /// after a refresh, or a second 401 if the replay was rejected too.
    /// Transport failures are returned as-is and never trigger a refresh.
    pub async fn execute(&self, mut request: ApiRequest) -> Result<reqwest::Response> {
        let response = self.send(&request).await?;

        match classify(response.status(), request.is_retried()) {
            AuthDecision::PassThrough => Ok(response),
            AuthDecision::Failed => {
                tracing::debug!(path = %request.path, "Request rejected after refresh");
                Ok(response)
            }
            AuthDecision::RefreshRequired => {
                request.mark_retried();
                let token = self.inner.coordinator.request_refresh().await?;
                request.set_bearer(&token)?;
                tracing::debug!(path = %request.path, "Replaying request with refreshed token");
                self.send(&request).await
            }
        }
    }

    async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response> {
        let url = self.url(&request.path)?;
        let mut headers = request.headers.clone();
        authorize(&mut headers, self.inner.store.as_ref());

        let builder = self
            .inner
            .http
            .request(request.method.clone(), url)
            .headers(headers)
            .timeout(self.inner.timeout);

        let builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Multipart(form) => builder.multipart(form.to_form()?),
        };

        tracing::debug!(method = %request.method, path = %request.path, "Sending request");
        Ok(builder.send().await?)
    }

    /// Execute a request and decode a JSON body.
    pub(crate) async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let response = self.execute(request).await?;
        self.handle_response(response).await
    }

    /// Execute a request, discarding any body.
    pub(crate) async fn call_unit(&self, request: ApiRequest) -> Result<()> {
        let response = self.execute(request).await?;
        if !response.status().is_success() {
            return Err(self.extract_error(response).await);
        }
        Ok(())
    }

    /// Make a GET request.
    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.call(ApiRequest::get(path)).await
    }

    /// Make a POST request with a JSON body.
    pub(crate) async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(ApiRequest::post(path).json(body)?).await
    }

    /// Make a POST request without a body.
    pub(crate) async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.call(ApiRequest::post(path)).await
    }

    /// Make a multipart POST request.
    pub(crate) async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: MultipartForm,
    ) -> Result<T> {
        self.call(ApiRequest::post(path).multipart(form)).await
    }

    /// Make a PATCH request.
    pub(crate) async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.call_unit(ApiRequest::patch(path).json(body)?).await
    }

    /// Make a DELETE request.
    pub(crate) async fn delete(&self, path: &str) -> Result<()> {
        self.call_unit(ApiRequest::delete(path)).await
    }

    /// Handle a response, extracting the body or error.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            return Err(self.extract_error(response).await);
        }

        let body = response.bytes().await?;
        // Some endpoints answer 2xx with an empty body
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_value(serde_json::Value::Null)?);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Extract an error from a failed response.
    async fn extract_error(&self, response: reqwest::Response) -> Error {
        let status = response.status().as_u16();

        let message = match response.bytes().await {
            Ok(body) => serde_json::from_slice::<ErrorResponse>(&body)
                .ok()
                .and_then(ErrorResponse::into_message),
            Err(_) => None,
        }
        .unwrap_or_else(|| format!("HTTP {}", status));

        match status {
            401 => Error::Auth(message),
            404 => Error::NotFound(message),
            _ => Error::Api { status, message },
        }
    }
}

/// Builder for creating a ParleyClient.
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: Option<String>,
    timeout: Duration,
    user_agent: Option<String>,
    store: Option<SharedCredentialStore>,
    signin_path: String,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
            store: None,
            signin_path: DEFAULT_SIGNIN_PATH.to_string(),
            refresher: None,
        }
    }

    /// Set the API base URL (including any `/api` prefix).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Use a specific credential store. Defaults to an in-memory store.
    pub fn credential_store(mut self, store: SharedCredentialStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Where the session sends the user once it is terminated.
    pub fn signin_path(mut self, path: impl Into<String>) -> Self {
        self.signin_path = path.into();
        self
    }

    /// Replace the HTTP refresh call.
    pub fn token_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ParleyClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config("base_url is required".to_string()))?;

        // Parse and normalize base URL
        let mut base_url = Url::parse(&base_url)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("parley-client/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .build()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let terminator = Arc::new(SessionTerminator::new(store.clone(), self.signin_path));
        let refresher: Arc<dyn TokenRefresher> = match self.refresher {
            Some(refresher) => refresher,
            None => Arc::new(HttpTokenRefresher::new(
                http.clone(),
                &base_url,
                self.timeout,
            )?),
        };
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            refresher,
            terminator.clone(),
        ));

        Ok(ParleyClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                timeout: self.timeout,
                store,
                terminator,
                coordinator,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialPair;

    #[test]
    fn test_builder_requires_base_url() {
        let result = ClientBuilder::new().build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_rejects_bad_url() {
        let result = ClientBuilder::new().base_url("not a url").build();
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_builder_normalizes_trailing_slash() {
        let client = ClientBuilder::new()
            .base_url("http://localhost:8000/api")
            .build()
            .unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8000/api/");

        let client = ClientBuilder::new()
            .base_url("http://localhost:8000/api/")
            .build()
            .unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8000/api/");
    }

    #[test]
    fn test_url_building() {
        let client = ClientBuilder::new()
            .base_url("http://localhost:8000/api")
            .build()
            .unwrap();

        let url = client.url("chat-history/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/chat-history/");

        let url = client.url("/chat/42/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/chat/42/");
    }

    #[test]
    fn test_builder_uses_given_store_and_signin_path() {
        let store: SharedCredentialStore =
            Arc::new(MemoryCredentialStore::with_pair(&CredentialPair::new("a", "r")));
        let client = ClientBuilder::new()
            .base_url("http://localhost:8000/api")
            .credential_store(store.clone())
            .signin_path("/login")
            .build()
            .unwrap();

        assert_eq!(client.credentials().access_token().as_deref(), Some("a"));
        assert_eq!(client.terminator().signin_path(), "/login");
        assert!(!client.coordinator().is_refreshing());
        assert_eq!(client.subscribe_session().borrow().clone(), SessionState::Active);
    }
}
