//! API integration tests for passgate-server.
//!
//! These tests drive the HTTP API against an in-memory credential store,
//! exercising the ceremony/challenge lifecycle, the password fallback, and
//! the error taxonomy. Full signed ceremonies need a hardware authenticator;
//! the cryptographic verification itself belongs to the WebAuthn library.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use passgate_server::{create_router, AppState, Config};

/// Build the test router backed by in-memory storage
fn create_test_app() -> Router {
    let state = AppState::in_memory(Config::default()).expect("state should build");
    create_router(state)
}

/// Build a JSON POST request, optionally carrying a session cookie
fn post_json(uri: &str, body: &Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Extract the `passgate_session=...` pair from a Set-Cookie header
fn session_cookie(response: &axum::response::Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .next()
        .map(|s| s.to_string())
}

/// A syntactically valid attestation response that cannot verify
fn dummy_registration_response() -> Value {
    json!({
        "id": "AAAA",
        "rawId": "AAAA",
        "type": "public-key",
        "extensions": {},
        "response": {
            "attestationObject": "AAAA",
            "clientDataJSON": "AAAA"
        }
    })
}

/// A syntactically valid assertion response that cannot verify
fn dummy_authentication_response() -> Value {
    json!({
        "id": "AAAA",
        "rawId": "AAAA",
        "type": "public-key",
        "extensions": {},
        "response": {
            "authenticatorData": "AAAA",
            "clientDataJSON": "AAAA",
            "signature": "AAAA",
            "userHandle": null
        }
    })
}

// ============================================================================
// Health & Docs Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "passgate-server");
    assert_eq!(json["storage_persistent"], false);
}

#[tokio::test]
async fn test_ready_endpoint_returns_ok() {
    let app = create_test_app();

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_openapi_spec_documents_all_endpoints() {
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert!(json["openapi"].as_str().unwrap().starts_with("3."));
    for path in [
        "/register-user",
        "/register",
        "/register/complete",
        "/login",
        "/login/complete",
        "/login/password",
    ] {
        assert!(
            json["paths"][path].is_object(),
            "{} should be documented",
            path
        );
    }
}

// ============================================================================
// Password Provisioning Tests
// ============================================================================

#[tokio::test]
async fn test_register_user_creates_account() {
    let app = create_test_app();

    let response = app
        .oneshot(post_json(
            "/register-user",
            &json!({"username": "alice", "password": "pw1"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["user"]["username"], "alice");
    assert!(json["user"]["id"].is_string());
    // The password hash must never appear in a response
    assert!(json["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_register_user_duplicate_username_conflicts() {
    let app = create_test_app();

    let first = app
        .clone()
        .oneshot(post_json(
            "/register-user",
            &json!({"username": "alice", "password": "pw1"}),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(post_json(
            "/register-user",
            &json!({"username": "alice", "password": "pw2"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(second.status(), StatusCode::CONFLICT);
    let json = response_json(second).await;
    assert_eq!(json["code"], "USER_ALREADY_EXISTS");
}

#[tokio::test]
async fn test_register_user_requires_both_fields() {
    let app = create_test_app();

    let response = app
        .oneshot(post_json(
            "/register-user",
            &json!({"username": "alice"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert_eq!(json["code"], "MISSING_CREDENTIALS");
}

// ============================================================================
// Password Login Tests
// ============================================================================

#[tokio::test]
async fn test_password_login_succeeds_with_correct_password() {
    let app = create_test_app();

    let created = app
        .clone()
        .oneshot(post_json(
            "/register-user",
            &json!({"username": "alice", "password": "pw1"}),
            None,
        ))
        .await
        .unwrap();
    let created_json = response_json(created).await;
    let user_id = created_json["user"]["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(post_json(
            "/login/password",
            &json!({"username": "alice", "password": "pw1"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["userId"], Value::String(user_id));
}

#[tokio::test]
async fn test_password_login_rejects_wrong_password() {
    let app = create_test_app();

    app.clone()
        .oneshot(post_json(
            "/register-user",
            &json!({"username": "alice", "password": "pw1"}),
            None,
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(
            "/login/password",
            &json!({"username": "alice", "password": "wrong"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = response_json(response).await;
    assert_eq!(json["code"], "INVALID_PASSWORD");
}

#[tokio::test]
async fn test_password_login_unknown_user() {
    let app = create_test_app();

    let response = app
        .oneshot(post_json(
            "/login/password",
            &json!({"username": "nobody", "password": "pw"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = response_json(response).await;
    assert_eq!(json["code"], "USER_NOT_FOUND");
}

#[tokio::test]
async fn test_password_login_without_provisioned_password() {
    let app = create_test_app();

    // Passkey registration creates the user without any password hash
    let begin = app
        .clone()
        .oneshot(post_json("/register", &json!({"username": "carol"}), None))
        .await
        .unwrap();
    assert_eq!(begin.status(), StatusCode::OK);

    let response = app
        .oneshot(post_json(
            "/login/password",
            &json!({"username": "carol", "password": "anything"}),
            None,
        ))
        .await
        .unwrap();

    // Not InvalidPassword: the account has no password at all
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert_eq!(json["code"], "NO_PASSWORD_SET");
}

#[tokio::test]
async fn test_password_login_requires_both_fields() {
    let app = create_test_app();

    let response = app
        .oneshot(post_json("/login/password", &json!({"password": "pw"}), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert_eq!(json["code"], "MISSING_CREDENTIALS");
}

// ============================================================================
// Registration Ceremony Tests
// ============================================================================

#[tokio::test]
async fn test_register_returns_options_and_session_cookie() {
    let app = create_test_app();

    let response = app
        .oneshot(post_json("/register", &json!({"username": "dave"}), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).expect("begin should issue a session cookie");
    assert!(cookie.starts_with("passgate_session="));

    let json = response_json(response).await;
    let challenge = json["publicKey"]["challenge"].as_str().unwrap();
    assert!(!challenge.is_empty());
    assert_eq!(json["publicKey"]["rp"]["id"], "localhost");
    assert_eq!(json["publicKey"]["user"]["name"], "dave");
}

#[tokio::test]
async fn test_register_requires_username() {
    let app = create_test_app();

    let response = app
        .oneshot(post_json("/register", &json!({"username": "  "}), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert_eq!(json["code"], "MISSING_CREDENTIALS");
}

#[tokio::test]
async fn test_register_challenge_is_fresh_per_begin() {
    let app = create_test_app();

    let first = app
        .clone()
        .oneshot(post_json("/register", &json!({"username": "dave"}), None))
        .await
        .unwrap();
    let cookie = session_cookie(&first).unwrap();
    let first_json = response_json(first).await;

    // Same session, same username: the pending challenge is overwritten
    let second = app
        .oneshot(post_json(
            "/register",
            &json!({"username": "dave"}),
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second_json = response_json(second).await;

    assert_ne!(
        first_json["publicKey"]["challenge"],
        second_json["publicKey"]["challenge"],
        "challenges must never repeat across begin calls"
    );
}

#[tokio::test]
async fn test_register_complete_without_begin() {
    let app = create_test_app();

    // No cookie at all
    let response = app
        .clone()
        .oneshot(post_json(
            "/register/complete",
            &dummy_registration_response(),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert_eq!(json["code"], "NO_ACTIVE_CHALLENGE");

    // A cookie that was never issued a challenge
    let response = app
        .oneshot(post_json(
            "/register/complete",
            &dummy_registration_response(),
            Some("passgate_session=5bb38e1a-2ab3-4bd5-9d4b-09e3f2b9f3a1"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert_eq!(json["code"], "NO_ACTIVE_CHALLENGE");
}

#[tokio::test]
async fn test_register_complete_with_tampered_response_clears_challenge() {
    let app = create_test_app();

    let begin = app
        .clone()
        .oneshot(post_json("/register", &json!({"username": "carol"}), None))
        .await
        .unwrap();
    let cookie = session_cookie(&begin).unwrap();

    // The attestation cannot match the issued challenge
    let first = app
        .clone()
        .oneshot(post_json(
            "/register/complete",
            &dummy_registration_response(),
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::BAD_REQUEST);
    let json = response_json(first).await;
    assert_eq!(json["code"], "VERIFICATION_REJECTED");

    // The challenge was consumed by the failed attempt
    let second = app
        .oneshot(post_json(
            "/register/complete",
            &dummy_registration_response(),
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let json = response_json(second).await;
    assert_eq!(json["code"], "NO_ACTIVE_CHALLENGE");
}

// ============================================================================
// Authentication Ceremony Tests
// ============================================================================

#[tokio::test]
async fn test_login_unknown_user_gets_no_challenge() {
    let app = create_test_app();

    let response = app
        .oneshot(post_json("/login", &json!({"username": "bob"}), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    // No session entry means no cookie either
    assert!(session_cookie(&response).is_none());
    let json = response_json(response).await;
    assert_eq!(json["code"], "USER_NOT_FOUND");
}

#[tokio::test]
async fn test_login_user_without_passkeys() {
    let app = create_test_app();

    app.clone()
        .oneshot(post_json(
            "/register-user",
            &json!({"username": "alice", "password": "pw1"}),
            None,
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(post_json("/login", &json!({"username": "alice"}), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = response_json(response).await;
    assert_eq!(json["code"], "CREDENTIAL_NOT_FOUND");
}

#[tokio::test]
async fn test_login_complete_without_begin() {
    let app = create_test_app();

    let response = app
        .oneshot(post_json(
            "/login/complete",
            &dummy_authentication_response(),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert_eq!(json["code"], "NO_ACTIVE_CHALLENGE");
}

#[tokio::test]
async fn test_login_complete_after_register_begin_is_rejected() {
    let app = create_test_app();

    // A pending *registration* ceremony is not an authentication challenge
    let begin = app
        .clone()
        .oneshot(post_json("/register", &json!({"username": "erin"}), None))
        .await
        .unwrap();
    let cookie = session_cookie(&begin).unwrap();

    let response = app
        .clone()
        .oneshot(post_json(
            "/login/complete",
            &dummy_authentication_response(),
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert_eq!(json["code"], "NO_ACTIVE_CHALLENGE");

    // The mismatched attempt consumed the pending registration too
    let response = app
        .oneshot(post_json(
            "/register/complete",
            &dummy_registration_response(),
            Some(&cookie),
        ))
        .await
        .unwrap();
    let json = response_json(response).await;
    assert_eq!(json["code"], "NO_ACTIVE_CHALLENGE");
}

// ============================================================================
// Error Shape Tests
// ============================================================================

#[tokio::test]
async fn test_error_body_carries_message_and_code() {
    let app = create_test_app();

    let response = app
        .oneshot(post_json("/login", &json!({"username": "ghost"}), None))
        .await
        .unwrap();

    let json = response_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("ghost"));
    assert_eq!(json["code"], "USER_NOT_FOUND");
}
