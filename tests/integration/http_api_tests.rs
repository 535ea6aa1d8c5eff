// =============
// tests/integration/http_api_tests.rs
// =============
//! The HTTP surface driven through `tower::ServiceExt::oneshot`.
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::test_utils::{eventually, TestEnv};
use roulette_backend_lib::config::Settings;
use roulette_backend_lib::router::create_router;
use roulette_backend_lib::store::KeyedStore;

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn new_identity(app: &Router) -> (String, String) {
    let (status, body) = call(app, Method::POST, "/v1/session", None, None).await;
    assert_eq!(status, StatusCode::OK);
    (
        body["uid"].as_str().unwrap().to_string(),
        body["token"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn test_health() {
    let env = TestEnv::idle(Settings::default());
    let app = create_router(env.state.clone());

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_requests_without_identity_are_rejected() {
    let env = TestEnv::idle(Settings::default());
    let app = create_router(env.state.clone());

    for (method, uri, body) in [
        (Method::GET, "/v1/match", None),
        (Method::POST, "/v1/match/end", None),
        (Method::DELETE, "/v1/queue", None),
        (Method::POST, "/v1/queue", Some(json!({"name": "x", "age": 20}))),
        (Method::POST, "/v1/chats/save", Some(json!({"chatId": "a_b"}))),
        (Method::POST, "/v1/chats/delete", Some(json!({}))),
    ] {
        let (status, body) = call(&app, method, uri, None, body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["error"]["code"], "unauthenticated");
    }

    let (status, _) = call(&app, Method::GET, "/v1/match", Some("forged"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_argument_errors() {
    let env = TestEnv::idle(Settings::default());
    let app = create_router(env.state.clone());
    let (_, token) = new_identity(&app).await;

    let (status, body) = call(&app, Method::POST, "/v1/chats/save", Some(&token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid-argument");

    let (status, _) = call(
        &app,
        Method::POST,
        "/v1/queue",
        Some(&token),
        Some(json!({"name": "Kid", "age": 9})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        Method::POST,
        "/v1/chats/delete",
        Some(&token),
        Some(json!({"chatId": "someone_else"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not-found");

    let (status, body) = call(&app, Method::POST, "/v1/match/end", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "No active match");
}

#[tokio::test]
async fn test_match_over_http() {
    let env = TestEnv::running(Settings::default());
    let app = create_router(env.state.clone());
    let (uid_a, token_a) = new_identity(&app).await;
    let (uid_b, token_b) = new_identity(&app).await;

    let (status, body) = call(&app, Method::GET, "/v1/match", Some(&token_a), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"match": null}));

    let (status, entry) = call(
        &app,
        Method::POST,
        "/v1/queue",
        Some(&token_a),
        Some(json!({"name": "Ada", "age": 29, "interests": ["Rust", "climbing"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entry["status"], "searching");
    assert_eq!(entry["gender"], "other");

    call(
        &app,
        Method::POST,
        "/v1/queue",
        Some(&token_b),
        Some(json!({"name": "Grace", "age": 33, "gender": "female", "interests": ["rust"]})),
    )
    .await;

    let app_ref = &app;
    let token = token_a.as_str();
    assert!(
        eventually(|| async move {
            let (_, body) = call(app_ref, Method::GET, "/v1/match", Some(token), None).await;
            !body["match"].is_null()
        })
        .await
    );

    let (_, body) = call(&app, Method::GET, "/v1/match", Some(&token_a), None).await;
    let current = &body["match"];
    assert_eq!(current["partnerUid"], uid_b.as_str());
    assert_eq!(current["partnerName"], "Grace");
    assert_eq!(current["partnerAvatar"], "G");
    let chat_id = current["chatId"].as_str().unwrap().to_string();

    let (status, message) = call(
        &app,
        Method::POST,
        &format!("/v1/chats/{chat_id}/messages"),
        Some(&token_b),
        Some(json!({"text": "hello Ada"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message["senderId"], uid_b.as_str());
    assert!(message["id"].is_string());

    let (status, body) = call(
        &app,
        Method::POST,
        "/v1/chats/save",
        Some(&token_a),
        Some(json!({"chatId": chat_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let (status, body) = call(
        &app,
        Method::POST,
        "/v1/chats/delete",
        Some(&token_b),
        Some(json!({"chatId": chat_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "chatId": chat_id}));

    let (status, _) = call(&app, Method::DELETE, "/v1/queue", Some(&token_a), None).await;
    assert_eq!(status, StatusCode::OK);
    let keyed = &env.keyed;
    let uid = uid_a.as_str();
    assert!(eventually(|| async move { keyed.queue_entry(uid).await.unwrap().is_none() }).await);

    env.stop().await;
}
