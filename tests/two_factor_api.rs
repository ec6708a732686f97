use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use otpgate::{
    config::Config,
    handlers::create_router,
    models::Secret,
    repositories::InMemoryAccountRepository,
    services::{FixedClock, totp},
    state::AppState,
};

const NOW: i64 = 1_700_000_000;

struct TestApp {
    router: Router,
    clock: Arc<FixedClock>,
    state: AppState,
}

fn test_config() -> Config {
    Config {
        database_url: None,
        host: "127.0.0.1".to_string(),
        port: 0,
        totp_issuer: "TestApp".to_string(),
        encryption_key: None,
        totp_algorithm: "SHA1".to_string(),
        totp_digits: 6,
        totp_period: 30,
        totp_window_radius: 2,
        secret_bytes: 20,
        recovery_code_count: 10,
        recovery_code_length: 8,
        pending_setup_ttl_secs: 600,
    }
}

fn test_app() -> TestApp {
    let clock = Arc::new(FixedClock::at(NOW));
    let repo = Arc::new(InMemoryAccountRepository::new());
    let state = AppState::with_clock(repo, test_config(), clock.clone()).unwrap();
    TestApp {
        router: create_router(state.clone()),
        clock,
        state,
    }
}

async fn send(app: &TestApp, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_account(app: &TestApp, email: &str) -> String {
    let (status, body) = send(app, "POST", "/api/accounts", Some(json!({ "email": email }))).await;
    assert_eq!(status, StatusCode::OK);
    body["id"].as_str().unwrap().to_string()
}

fn code_for(app: &TestApp, secret: &str, unix: i64) -> String {
    let secret = Secret::from_base32(secret).unwrap();
    totp::compute_code(&secret, unix as u64, app.state.two_factor.engine().params())
        .unwrap()
        .to_string()
}

/// セットアップ〜有効化まで行い (secret, recovery_codes) を返す
async fn enable(app: &TestApp, user_id: &str) -> (String, Vec<String>) {
    let (status, body) = send(app, "POST", "/api/2fa/setup", Some(json!({ "user_id": user_id }))).await;
    assert_eq!(status, StatusCode::OK);
    let secret = body["secret"].as_str().unwrap().to_string();
    let recovery_codes: Vec<String> = body["recovery_codes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_str().unwrap().to_string())
        .collect();

    let code = code_for(app, &secret, NOW);
    let (status, body) = send(
        app,
        "POST",
        "/api/2fa/confirm",
        Some(json!({ "user_id": user_id, "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], true);

    (secret, recovery_codes)
}

#[tokio::test]
async fn health_check_returns_ok() {
    let app = test_app();
    let (status, body) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["clock"], "ok");
}

#[tokio::test]
async fn duplicate_account_is_conflict() {
    let app = test_app();
    create_account(&app, "alice@example.com").await;
    let (status, _) = send(
        &app,
        "POST",
        "/api/accounts",
        Some(json!({ "email": "alice@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn setup_returns_provisioning_uri() {
    let app = test_app();
    let user_id = create_account(&app, "alice@example.com").await;

    let (status, body) = send(&app, "POST", "/api/2fa/setup", Some(json!({ "user_id": user_id }))).await;
    assert_eq!(status, StatusCode::OK);

    let secret = body["secret"].as_str().unwrap();
    assert_eq!(secret.len(), 32);
    assert_eq!(
        body["provisioning_uri"],
        format!(
            "otpauth://totp/TestApp:alice%40example.com?secret={secret}&issuer=TestApp&algorithm=SHA1&digits=6&period=30"
        )
    );
    assert_eq!(body["recovery_codes"].as_array().unwrap().len(), 10);

    let (_, body) = send(&app, "GET", &format!("/api/2fa/status/{user_id}"), None).await;
    assert_eq!(body["state"], "pending_setup");
}

#[tokio::test]
async fn full_lifecycle() {
    let app = test_app();
    let user_id = create_account(&app, "alice@example.com").await;
    let (secret, recovery_codes) = enable(&app, &user_id).await;

    let (_, body) = send(&app, "GET", &format!("/api/2fa/status/{user_id}"), None).await;
    assert_eq!(body["state"], "enabled");
    assert_eq!(body["recovery_codes_remaining"], 10);

    // 時計が2周期進んでも直前に発行したコードは通る
    app.clock.advance(60);
    let code = code_for(&app, &secret, NOW);
    let (status, body) = send(
        &app,
        "POST",
        "/api/2fa/verify",
        Some(json!({ "user_id": user_id, "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["method"], "totp");

    // リカバリーコードは一度だけ
    let (status, body) = send(
        &app,
        "POST",
        "/api/2fa/verify",
        Some(json!({ "user_id": user_id, "code": recovery_codes[0] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["method"], "recovery_code");
    assert_eq!(body["recovery_codes_remaining"], 9);

    let (status, _) = send(
        &app,
        "POST",
        "/api/2fa/verify",
        Some(json!({ "user_id": user_id, "code": recovery_codes[0] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 無効化にリカバリーコードは使えない
    let (status, _) = send(
        &app,
        "POST",
        "/api/2fa/disable",
        Some(json!({ "user_id": user_id, "code": recovery_codes[1] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let code = code_for(&app, &secret, NOW + 60);
    let (status, body) = send(
        &app,
        "POST",
        "/api/2fa/disable",
        Some(json!({ "user_id": user_id, "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["disabled"], true);

    let (_, body) = send(&app, "GET", &format!("/api/2fa/status/{user_id}"), None).await;
    assert_eq!(body["state"], "disabled");
    assert_eq!(body["recovery_codes_remaining"], 0);
}

#[tokio::test]
async fn failed_confirmation_discards_candidate() {
    let app = test_app();
    let user_id = create_account(&app, "alice@example.com").await;
    let (_, body) = send(&app, "POST", "/api/2fa/setup", Some(json!({ "user_id": user_id }))).await;
    let secret = body["secret"].as_str().unwrap().to_string();

    let future = code_for(&app, &secret, NOW + 60);
    let (status, _) = send(
        &app,
        "POST",
        "/api/2fa/confirm",
        Some(json!({ "user_id": user_id, "code": future })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 候補は破棄されているので正しいコードでも確定できない
    let code = code_for(&app, &secret, NOW);
    let (status, _) = send(
        &app,
        "POST",
        "/api/2fa/confirm",
        Some(json!({ "user_id": user_id, "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, "GET", &format!("/api/2fa/status/{user_id}"), None).await;
    assert_eq!(body["state"], "disabled");
}

#[tokio::test]
async fn setup_when_enabled_is_conflict() {
    let app = test_app();
    let user_id = create_account(&app, "alice@example.com").await;
    enable(&app, &user_id).await;

    let (status, _) = send(&app, "POST", "/api/2fa/setup", Some(json!({ "user_id": user_id }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn regenerate_recovery_codes_requires_totp() {
    let app = test_app();
    let user_id = create_account(&app, "alice@example.com").await;
    let (secret, recovery_codes) = enable(&app, &user_id).await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/2fa/recovery-codes",
        Some(json!({ "user_id": user_id, "code": recovery_codes[0] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let code = code_for(&app, &secret, NOW);
    let (status, body) = send(
        &app,
        "POST",
        "/api/2fa/recovery-codes",
        Some(json!({ "user_id": user_id, "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recovery_codes"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn unknown_account_is_not_found() {
    let app = test_app();
    let (status, _) = send(
        &app,
        "POST",
        "/api/2fa/setup",
        Some(json!({ "user_id": uuid::Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_code_is_validation_error() {
    let app = test_app();
    let user_id = create_account(&app, "alice@example.com").await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/2fa/verify",
        Some(json!({ "user_id": user_id, "code": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[test]
fn unbounded_settings_are_rejected() {
    let repo = Arc::new(InMemoryAccountRepository::new());
    let config = Config {
        totp_window_radius: 1_000_000,
        ..test_config()
    };
    assert!(AppState::new(repo.clone(), config).is_err());

    let config = Config {
        pending_setup_ttl_secs: -600,
        ..test_config()
    };
    assert!(AppState::new(repo, config).is_err());
}
