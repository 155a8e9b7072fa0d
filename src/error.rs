use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::repositories::StoreError;

/// フィールド単位のバリデーションエラー
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    AccountNotEnabled(String),

    #[error("{0}")]
    InvalidToken(String),

    #[error("Token has expired")]
    TokenExpired,

    #[error("Budget exceeded! limit: {limit}, current: {current}, new: {attempted}. Budget Type: {scope}")]
    BudgetExceeded {
        limit: Decimal,
        current: Decimal,
        attempted: Decimal,
        scope: String,
    },

    #[error("{0}")]
    InvalidInput(String),

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Invalid identity assertion: {0}")]
    InvalidAssertion(String),

    #[error("Failed to send notification")]
    Notification(String),

    #[error("OAuth authentication failed: {0}")]
    OAuthError(String),

    #[error("Invalid OAuth state parameter")]
    OAuthStateInvalid,

    #[error("OAuth provider error")]
    OAuthProviderError,

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// 呼び出し側が分岐に使う安定したエラー種別
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::AccountNotEnabled(_) => "ACCOUNT_NOT_ENABLED",
            Self::InvalidToken(_) => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::BudgetExceeded { .. } => "BUDGET_EXCEEDED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::InvalidAssertion(_) => "INVALID_ASSERTION",
            Self::Notification(_) => "NOTIFICATION_FAILED",
            Self::OAuthError(_) => "OAUTH_ERROR",
            Self::OAuthStateInvalid => "OAUTH_STATE_INVALID",
            Self::OAuthProviderError => "OAUTH_PROVIDER_ERROR",
            Self::Database(_) | Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) | Self::OAuthError(_) => StatusCode::UNAUTHORIZED,
            Self::AccountNotEnabled(_) => StatusCode::FORBIDDEN,
            Self::InvalidToken(_)
            | Self::TokenExpired
            | Self::BudgetExceeded { .. }
            | Self::InvalidInput(_)
            | Self::Validation(_)
            | Self::InvalidAssertion(_)
            | Self::OAuthStateInvalid => StatusCode::BAD_REQUEST,
            Self::Notification(_) | Self::OAuthProviderError => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(constraint) => {
                let message = match constraint.as_str() {
                    "users_username_key" => "Username already exists",
                    "users_email_key" => "Email already exists",
                    _ => "Resource already exists",
                };
                Self::Conflict(message.to_string())
            }
            StoreError::Database(e) => Self::Database(e),
        }
    }
}

impl From<garde::Report> for AppError {
    fn from(report: garde::Report) -> Self {
        let fields = report
            .iter()
            .map(|(path, error)| FieldError::new(path.to_string(), error.message()))
            .collect();
        Self::Validation(fields)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut fields = None;
        let mut details = None;

        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                "An internal error occurred".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                "An internal error occurred".to_string()
            }
            Self::Notification(reason) => {
                tracing::error!(reason = %reason, "通知送信エラー");
                self.to_string()
            }
            Self::OAuthError(e) => {
                tracing::error!(error = %e, "OAuth認証エラー");
                "Authentication failed".to_string()
            }
            Self::OAuthStateInvalid => {
                tracing::warn!("無効なOAuth stateパラメータ（CSRF攻撃の可能性）");
                self.to_string()
            }
            Self::Validation(errors) => {
                fields = Some(
                    errors
                        .iter()
                        .map(|e| (e.field.clone(), e.message.clone()))
                        .collect(),
                );
                self.to_string()
            }
            Self::BudgetExceeded {
                limit,
                current,
                attempted,
                scope,
            } => {
                details = Some(serde_json::json!({
                    "limit": limit,
                    "current": current,
                    "attempted": attempted,
                    "scope": scope,
                }));
                self.to_string()
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            error: self.kind(),
            message,
            fields,
            details,
        };

        (status, Json(body)).into_response()
    }
}
