//! Chat and account endpoints against a mock backend.

use std::sync::Arc;

use parley_client::{
    CredentialPair, Error, MemoryCredentialStore, ParleyClient, RegisterRequest, SessionState,
    SharedCredentialStore, Upload,
};
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup(signed_in: bool) -> (MockServer, ParleyClient, SharedCredentialStore) {
    let server = MockServer::start().await;
    let store: SharedCredentialStore = if signed_in {
        Arc::new(MemoryCredentialStore::with_pair(&CredentialPair::new("a1", "r1")))
    } else {
        Arc::new(MemoryCredentialStore::new())
    };
    let client = ParleyClient::builder()
        .base_url(format!("{}/api", server.uri()))
        .credential_store(store.clone())
        .build()
        .unwrap();
    (server, client, store)
}

#[tokio::test]
async fn test_send_extracts_reply() {
    let (server, client, _store) = setup(true).await;
    Mock::given(method("POST"))
        .and(path("/api/chat/"))
        .and(header("Authorization", "Bearer a1"))
        .and(body_json(json!({"prompt": "hi", "session_id": "s1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "hello!"})))
        .mount(&server)
        .await;

    let reply = client.chat().send("hi", Some("s1")).await.unwrap();
    assert_eq!(reply, "hello!");
}

#[tokio::test]
async fn test_send_without_reply_field_is_empty() {
    let (server, client, _store) = setup(true).await;
    Mock::given(method("POST"))
        .and(path("/api/chat/"))
        .and(body_json(json!({"prompt": "hi"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    assert_eq!(client.chat().send("hi", None).await.unwrap(), "");
}

#[tokio::test]
async fn test_send_with_image_is_multipart() {
    let (server, client, _store) = setup(true).await;
    Mock::given(method("POST"))
        .and(path("/api/chat/"))
        .and(body_string_contains("name=\"image\"; filename=\"cat.png\""))
        .and(body_string_contains("name=\"session_id\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "a cat"})))
        .mount(&server)
        .await;

    let image = Upload::new("cat.png", b"not really a png".to_vec()).with_mime_type("image/png");
    let reply = client
        .chat()
        .send_with_image("what is this?", image, Some("s1"))
        .await
        .unwrap();
    assert_eq!(reply, "a cat");
}

#[tokio::test]
async fn test_history_accepts_paginated_envelope() {
    let (server, client, _store) = setup(true).await;
    Mock::given(method("GET"))
        .and(path("/api/chat-history/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 1,
            "results": [{
                "_id": 3,
                "title": "Trip ideas",
                "created_at": "2024-06-01T12:00:00Z",
                "messages": [
                    {"id": 1, "content": "Where to?", "role": "user"},
                    {"id": 2, "content": "Lisbon.", "role": "assistant"}
                ]
            }]
        })))
        .mount(&server)
        .await;

    let sessions = client.chat().history().await.unwrap();

    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, "3");
    assert_eq!(sessions[0].title, "Trip ideas");
    assert!(sessions[0].messages[0].is_user);
    assert!(!sessions[0].messages[1].is_user);
    assert_eq!(sessions[0].messages[1].text, "Lisbon.");
}

#[tokio::test]
async fn test_session_not_found() {
    let (server, client, _store) = setup(true).await;
    Mock::given(method("GET"))
        .and(path("/api/chat/missing/"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found."})))
        .mount(&server)
        .await;

    let err = client.chat().session("missing").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "Not found: Not found.");
}

#[tokio::test]
async fn test_create_rename_and_delete_session() {
    let (server, client, _store) = setup(true).await;
    Mock::given(method("POST"))
        .and(path("/api/chat/new/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "s9",
            "createdAt": "2024-06-02T09:30:00Z"
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/chat/s9/"))
        .and(body_json(json!({"title": "Renamed"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "s9"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/chat/s9/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let session = client.chat().create_session().await.unwrap();
    assert_eq!(session.id, "s9");
    assert_eq!(session.title, "Chat 2024-06-02");
    assert!(session.messages.is_empty());

    client.chat().rename_session("s9", "Renamed").await.unwrap();
    client.chat().delete_session("s9").await.unwrap();
}

#[tokio::test]
async fn test_delete_missing_session_succeeds() {
    let (server, client, _store) = setup(true).await;
    Mock::given(method("DELETE"))
        .and(path("/api/chat/gone/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    client.chat().delete_session("gone").await.unwrap();
}

#[tokio::test]
async fn test_transcribe() {
    let (server, client, _store) = setup(true).await;
    Mock::given(method("POST"))
        .and(path("/api/transcribe-audio/"))
        .and(body_string_contains("name=\"audio\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "hello world"})))
        .mount(&server)
        .await;

    let text = client
        .chat()
        .transcribe(Upload::new("clip.webm", vec![0; 16]))
        .await
        .unwrap();
    assert_eq!(text, "hello world");
}

#[tokio::test]
async fn test_login_stores_tokens_and_fetches_profile() {
    let (server, client, store) = setup(false).await;
    Mock::given(method("POST"))
        .and(path("/api/users/login/"))
        .and(body_json(json!({"username": "alice", "password": "pw"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access": "a1", "refresh": "r1"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/profile/"))
        .and(header("Authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "username": "alice",
            "email": "alice@example.com"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let auth = client.auth().login("alice", "pw").await.unwrap();

    assert_eq!(auth.user.id, "1");
    assert_eq!(auth.user.email, "alice@example.com");
    assert_eq!(store.access_token().as_deref(), Some("a1"));
    assert_eq!(store.refresh_token().as_deref(), Some("r1"));
}

#[tokio::test]
async fn test_login_uses_embedded_user() {
    let (server, client, _store) = setup(false).await;
    Mock::given(method("POST"))
        .and(path("/api/users/login/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": "a1",
            "refresh": "r1",
            "user": {"id": "u1", "username": "alice", "email": "a@example.com"}
        })))
        .mount(&server)
        .await;

    let auth = client.auth().login("alice", "pw").await.unwrap();
    assert_eq!(auth.user.id, "u1");
    // No profile mock mounted: a profile fetch would have failed the login
}

#[tokio::test]
async fn test_login_requires_both_tokens() {
    let (server, client, store) = setup(false).await;
    Mock::given(method("POST"))
        .and(path("/api/users/login/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "a1"})))
        .mount(&server)
        .await;

    let err = client.auth().login("alice", "pw").await.unwrap_err();

    assert!(matches!(err, Error::InvalidResponse(_)));
    assert!(!store.has_credentials());
}

#[tokio::test]
async fn test_login_bad_credentials() {
    let (server, client, _store) = setup(false).await;
    Mock::given(method("POST"))
        .and(path("/api/users/login/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "non_field_errors": ["Unable to log in with provided credentials."]
        })))
        .mount(&server)
        .await;

    let err = client.auth().login("alice", "wrong").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "API error (400): Unable to log in with provided credentials."
    );
}

#[tokio::test]
async fn test_login_401_is_reported_as_bad_credentials() {
    let (server, client, _store) = setup(false).await;
    Mock::given(method("POST"))
        .and(path("/api/users/login/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "No account"})))
        .mount(&server)
        .await;

    let err = client.auth().login("alice", "wrong").await.unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
    assert!(!err.is_session_ended());
}

/// Rejects any request still carrying the expired token, and the expired
/// refresh token with it.
async fn mount_stale_token_rejection(server: &MockServer) {
    Mock::given(header("Authorization", "Bearer a1"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Given token not valid"})),
        )
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/users/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"detail": "Token is invalid or expired"})),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_over_stale_tokens_goes_out_anonymous() {
    let (server, client, store) = setup(true).await;
    mount_stale_token_rejection(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/users/login/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": "a9",
            "refresh": "r9",
            "user": {"id": 7, "username": "alice", "email": "a@example.com"}
        })))
        .mount(&server)
        .await;

    let auth = client.auth().login("alice", "pw").await.unwrap();

    assert_eq!(auth.access, "a9");
    assert_eq!(store.access_token().as_deref(), Some("a9"));
    assert_eq!(store.refresh_token().as_deref(), Some("r9"));
    assert_eq!(client.terminator().state(), SessionState::Active);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_register_over_stale_tokens_goes_out_anonymous() {
    let (server, client, store) = setup(true).await;
    mount_stale_token_rejection(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/users/register/"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"access": "a9", "refresh": "r9"})),
        )
        .mount(&server)
        .await;

    let request = RegisterRequest::new("bob", "bob@example.com", "pw");
    client.auth().register(&request).await.unwrap();

    assert_eq!(store.access_token().as_deref(), Some("a9"));
    let refreshes = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/api/users/token/refresh/")
        .count();
    assert_eq!(refreshes, 0);
}

#[tokio::test]
async fn test_register_reports_field_errors() {
    let (server, client, _store) = setup(false).await;
    Mock::given(method("POST"))
        .and(path("/api/users/register/"))
        .and(body_json(json!({
            "username": "alice",
            "email": "bad",
            "password1": "pw",
            "password2": "pw",
            "first_name": "",
            "last_name": ""
        })))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "email": ["Enter a valid email address."]
        })))
        .mount(&server)
        .await;

    let err = client
        .auth()
        .register(&RegisterRequest::new("alice", "bad", "pw"))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "API error (400): Email: Enter a valid email address."
    );
}

#[tokio::test]
async fn test_register_fills_user_from_input() {
    let (server, client, store) = setup(false).await;
    Mock::given(method("POST"))
        .and(path("/api/users/register/"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"access": "a1", "refresh": "r1"})),
        )
        .mount(&server)
        .await;

    let request = RegisterRequest::new("bob", "bob@example.com", "pw").with_name("Bob", "");
    let auth = client.auth().register(&request).await.unwrap();

    assert_eq!(auth.user.username, "bob");
    assert_eq!(auth.user.email, "bob@example.com");
    assert_eq!(auth.user.first_name.as_deref(), Some("Bob"));
    assert!(auth.user.last_name.is_none());
    assert!(store.has_credentials());
}

#[tokio::test]
async fn test_logout_clears_store_even_when_server_fails() {
    let (server, client, store) = setup(true).await;
    Mock::given(method("POST"))
        .and(path("/api/users/logout/"))
        .and(body_json(json!({"refresh": "r1"})))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    client.auth().logout().await;

    assert!(!store.has_credentials());
    assert!(matches!(
        client.terminator().state(),
        SessionState::SignedOut { .. }
    ));
}

#[tokio::test]
async fn test_logout_without_refresh_token_skips_server() {
    let (server, client, _store) = setup(false).await;

    client.auth().logout().await;

    assert!(server.received_requests().await.unwrap().is_empty());
}
