pub mod auth;
pub mod budgets;
pub mod extractors;
pub mod health;
pub mod oauth;
pub mod reports;
pub mod transactions;
pub mod validation;

use axum::{
    Router,
    routing::{get, post},
};

pub use auth::{
    forgot_password, login, me, refresh, register, resend_verification, reset_password,
    verify_email,
};
pub use budgets::{create_budget, list_budgets};
pub use extractors::AuthUser;
pub use health::health_check;
pub use oauth::{google_auth, google_callback};
pub use reports::{monthly_report, weekly_report};
pub use transactions::{create_transaction, delete_transaction, get_transaction, list_transactions};

use crate::state::AppState;

/// Router の構築
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        // 認証
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/verify", get(verify_email))
        .route("/api/auth/resend-verification", post(resend_verification))
        .route("/api/auth/forgot-password", post(forgot_password))
        .route("/api/auth/reset-password", post(reset_password))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/me", get(me))
        // ソーシャルログイン
        .route("/api/oauth2/google", get(google_auth))
        .route("/api/oauth2/google/callback", get(google_callback))
        // 予算・収支
        .route("/api/budgets", get(list_budgets).post(create_budget))
        .route(
            "/api/transactions",
            get(list_transactions).post(create_transaction),
        )
        .route(
            "/api/transactions/{id}",
            get(get_transaction).delete(delete_transaction),
        )
        .route("/api/reports/weekly", get(weekly_report))
        .route("/api/reports/monthly", get(monthly_report))
        .with_state(state)
}
