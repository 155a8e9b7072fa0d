//! In-memory HTTP flows through the full router.

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use ledgerguard::{
    config::Config,
    handlers::create_router,
    repositories::MemoryStore,
    services::RecordingNotifier,
    state::AppState,
};

struct TestApp {
    router: Router,
    notifier: RecordingNotifier,
}

impl TestApp {
    fn new() -> Self {
        let config = Config::load_from(vec![
            (
                "DATABASE_URL".to_string(),
                "postgres://localhost/ledgerguard".to_string(),
            ),
            ("JWT_SECRET".to_string(), "integration-secret".to_string()),
        ])
        .unwrap();
        let notifier = RecordingNotifier::new();
        let state =
            AppState::in_memory(&MemoryStore::new(), Arc::new(notifier.clone()), config).unwrap();
        Self {
            router: create_router(state),
            notifier,
        }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn register(&self, username: &str, email: &str, password: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "username": username,
                "email": email,
                "full_name": "Test User",
                "password": password,
            })),
        )
        .await
    }

    /// 登録してメール認証まで済ませ、アクセストークンを返す
    async fn signed_in(&self, username: &str, email: &str) -> String {
        let (status, _) = self.register(username, email, "secret123").await;
        assert_eq!(status, StatusCode::CREATED);

        let token = self.notifier.last_to(email).unwrap().token().unwrap();
        let (status, _) = self
            .send(Method::GET, &format!("/api/auth/verify?token={token}"), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "username": username, "password": "secret123" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["access_token"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let (status, body) = app.send(Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_register_verify_login_me() {
    let app = TestApp::new();

    let (status, body) = app.register("alice", "alice@example.com", "secret123").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["username"], "alice");

    // 認証前のログインは拒否
    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "secret123" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "ACCOUNT_NOT_ENABLED");

    let token = app.notifier.last_to("alice@example.com").unwrap().token().unwrap();
    let (status, _) = app
        .send(Method::GET, &format!("/api/auth/verify?token={token}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);

    // 認証トークンは一度きり
    let (status, body) = app
        .send(Method::GET, &format!("/api/auth/verify?token={token}"), None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_TOKEN");

    let (status, tokens) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "secret123" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tokens["token_type"], "Bearer");

    let access = tokens["access_token"].as_str().unwrap();
    let (status, me) = app.send(Method::GET, "/api/auth/me", Some(access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "alice");
    assert_eq!(me["enabled"], true);
    assert!(me.get("password_hash").is_none());

    let (status, refreshed) = app
        .send(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": tokens["refresh_token"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(refreshed["access_token"].is_string());
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_invalid_input() {
    let app = TestApp::new();
    app.register("alice", "alice@example.com", "secret123").await;

    let (status, body) = app.register("alice", "other@example.com", "secret123").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Username already exists");

    let (status, body) = app.register("bob", "alice@example.com", "secret123").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Email already exists");

    let (status, body) = app.register("carol", "not-an-email", "123").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_FAILED");
    assert!(body["fields"]["email"].is_string());
    assert!(body["fields"]["password"].is_string());
}

#[tokio::test]
async fn test_login_requires_identifier_and_valid_password() {
    let app = TestApp::new();
    app.signed_in("alice", "alice@example.com").await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "password": "secret123" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_FAILED");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");
}

#[tokio::test]
async fn test_protected_routes_require_bearer_token() {
    let app = TestApp::new();

    let (status, body) = app.send(Method::GET, "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");

    let (status, _) = app
        .send(Method::GET, "/api/transactions", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_password_reset_flow() {
    let app = TestApp::new();
    app.signed_in("alice", "alice@example.com").await;

    let (status, _) = app
        .send(
            Method::POST,
            "/api/auth/forgot-password",
            None,
            Some(json!({ "email": "alice@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let message = app.notifier.last_to("alice@example.com").unwrap();
    assert_eq!(message.subject, "Reset your password");
    let token = message.token().unwrap();

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/auth/reset-password?token={token}"),
            None,
            Some(json!({ "new_password": "brand-new-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // 使用済みトークンは再利用できない
    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/auth/reset-password?token={token}"),
            None,
            Some(json!({ "new_password": "another-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_TOKEN");

    let (status, _) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "brand-new-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/forgot-password",
            None,
            Some(json!({ "email": "nobody@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_budget_enforcement_and_reports() {
    let app = TestApp::new();
    let access = app.signed_in("alice", "alice@example.com").await;

    let (status, budget) = app
        .send(
            Method::POST,
            "/api/budgets",
            Some(&access),
            Some(json!({
                "amount": "100",
                "start_date": "2024-01-01",
                "end_date": "2024-01-31",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(budget["category"].is_null());

    let (status, spent) = app
        .send(
            Method::POST,
            "/api/transactions",
            Some(&access),
            Some(json!({
                "amount": "80",
                "category": "Food",
                "date": "2024-01-10",
                "type": "EXPENSE",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/transactions",
            Some(&access),
            Some(json!({
                "amount": "25",
                "category": "Transport",
                "date": "2024-01-15",
                "type": "EXPENSE",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BUDGET_EXCEEDED");
    assert_eq!(
        body["message"],
        "Budget exceeded! limit: 100, current: 80, new: 25. Budget Type: Global"
    );

    // 収入は予算の対象外
    let (status, _) = app
        .send(
            Method::POST,
            "/api/transactions",
            Some(&access),
            Some(json!({
                "amount": "500",
                "category": "Salary",
                "date": "2024-01-25",
                "type": "INCOME",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, report) = app
        .send(
            Method::GET,
            "/api/reports/monthly?year=2024&month=1",
            Some(&access),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["total_income"], "500");
    assert_eq!(report["total_expense"], "80");
    assert_eq!(report["net_balance"], "420");
    assert_eq!(report["expense_by_category"]["Food"], "80");

    let (status, weekly) = app
        .send(
            Method::GET,
            "/api/reports/weekly?date=2024-01-10",
            Some(&access),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(weekly["start_date"], "2024-01-08");
    assert_eq!(weekly["end_date"], "2024-01-14");

    let id = spent["id"].as_str().unwrap();
    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/api/transactions/{id}"),
            Some(&access),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .send(
            Method::GET,
            &format!("/api/transactions/{id}"),
            Some(&access),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_transactions_are_scoped_to_owner() {
    let app = TestApp::new();
    let alice = app.signed_in("alice", "alice@example.com").await;
    let bob = app.signed_in("bob", "bob@example.com").await;

    let (status, created) = app
        .send(
            Method::POST,
            "/api/transactions",
            Some(&alice),
            Some(json!({
                "amount": "12.50",
                "category": "Food",
                "description": "lunch",
                "date": "2024-03-01",
                "type": "EXPENSE",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap();

    let (status, _) = app
        .send(
            Method::GET,
            &format!("/api/transactions/{id}"),
            Some(&bob),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, list) = app
        .send(Method::GET, "/api/transactions", Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_google_callback_without_configuration_redirects_with_error() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/api/oauth2/google/callback?code=abc&state=xyz")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(location.starts_with("http://localhost:3000/oauth2/redirect?error="));
}

#[tokio::test]
async fn test_out_of_range_inputs_are_client_errors() {
    let app = TestApp::new();
    let access = app.signed_in("alice", "alice@example.com").await;

    let (status, body) = app
        .send(
            Method::GET,
            "/api/reports/weekly?date=9999-12-31",
            Some(&access),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_INPUT");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/transactions",
            Some(&access),
            Some(json!({
                "amount": "0.001",
                "category": "Food",
                "date": "2024-01-10",
                "type": "EXPENSE",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_FAILED");
    assert!(body["fields"]["amount"].is_string());
}
