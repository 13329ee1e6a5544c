#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use cbt_backend::{
    assessment::ScoringPolicy, config::Config, routes::build_router,
    services::mail_service::LogMailer, utils::crypto::hash_password, AppState,
};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "correct horse battery staple";

pub fn test_config() -> Config {
    Config {
        server_address: "127.0.0.1:0".into(),
        jwt_secret: "test_secret_key".into(),
        jwt_ttl_minutes: 60,
        admin_email: ADMIN_EMAIL.into(),
        admin_password_hash: hash_password(ADMIN_PASSWORD).expect("hash"),
        public_rps: 1000,
        admin_rps: 1000,
        trust_forwarded_for: false,
        scoring: ScoringPolicy::default(),
        invitation_ttl_hours: 72,
        webapp_url: "http://localhost:3000".into(),
        mail_relay_url: None,
        webhook_url: None,
        webhook_secret: None,
        seed_tests_file: None,
        tick_interval_ms: 1000,
        log_json: false,
    }
}

pub fn app() -> (Router, AppState) {
    let state = AppState::new(test_config(), Arc::new(LogMailer));
    (build_router(state.clone()), state)
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let (status, bytes) = send_raw(app, method, uri, token, body).await;
    let json = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
    };
    (status, json)
}

pub async fn send_raw(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, bytes.to_vec())
}

pub async fn admin_token(app: &Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "admin login failed: {}", body);
    body["access_token"].as_str().expect("token").to_string()
}

/// Two questions: "2 + 2" (key 1) and "Capital of France" (key 0).
pub fn arithmetic_test_payload() -> JsonValue {
    json!({
        "title": "General Knowledge",
        "subject": "Mixed",
        "description": "Warm-up quiz",
        "duration_minutes": 10,
        "questions": [
            { "text": "2 + 2 = ?", "options": ["3", "4"], "correct_option_index": 1 },
            {
                "text": "Capital of France?",
                "options": ["Paris", "Rome", "Madrid"],
                "correct_option_index": 0
            }
        ]
    })
}

/// Creates the arithmetic test and invites `email`. Returns the test id and
/// the invitation's access token.
pub async fn create_and_invite(app: &Router, admin: &str, email: &str) -> (String, String) {
    let (status, test) = send(
        app,
        "POST",
        "/api/admin/tests",
        Some(admin),
        Some(arithmetic_test_payload()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create test failed: {}", test);
    let test_id = test["id"].as_str().expect("test id").to_string();

    let (status, outcome) = send(
        app,
        "POST",
        &format!("/api/admin/tests/{}/invitations", test_id),
        Some(admin),
        Some(json!({ "candidates": [{ "email": email, "name": "Ada Lovelace" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "invite failed: {}", outcome);
    let token = outcome["created"][0]["access_token"]
        .as_str()
        .expect("access token")
        .to_string();
    (test_id, token)
}
