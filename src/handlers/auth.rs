//! ローカル認証ハンドラー
//!
//! 登録・ログイン・メール認証・パスワードリセット・トークン更新を扱う。
//!
//! # Security
//! - パスワードはログに出力しない
//! - 認証トークンはクエリで受け取るが、ログにはユーザー名のみ残す

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, FieldError};
use crate::handlers::extractors::AuthUser;
use crate::handlers::validation::not_blank;
use crate::models::User;
use crate::services::{NewUser, SessionTokens};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[garde(custom(not_blank), length(max = 50))]
    pub username: String,
    #[garde(email)]
    pub email: String,
    #[garde(custom(not_blank), length(max = 100))]
    pub full_name: String,
    #[garde(length(min = 6, max = 128))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub message: &'static str,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[garde(skip)]
    pub username: Option<String>,
    #[garde(skip)]
    pub email: Option<String>,
    #[garde(length(min = 1))]
    pub password: String,
}

impl LoginRequest {
    /// username を優先し、無ければ email を識別子とする
    fn identifier(&self) -> Option<&str> {
        [self.username.as_deref(), self.email.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EmailRequest {
    #[garde(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[garde(length(min = 6, max = 128))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[garde(custom(not_blank))]
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// ユーザー登録ハンドラー
///
/// POST /api/auth/register
///
/// 登録直後のアカウントは無効状態で、認証メールのリンクで有効化される。
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    request.validate()?;

    let user = state
        .auth
        .register(NewUser {
            username: request.username.trim().to_string(),
            email: request.email.trim().to_string(),
            full_name: request.full_name.trim().to_string(),
            password: request.password,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user.id,
            username: user.username,
            email: user.email,
            message: "User registered successfully. Please check your email to verify your account.",
        }),
    ))
}

/// ログインハンドラー
///
/// POST /api/auth/login
///
/// username または email のどちらかとパスワードで認証し、セッショントークンを返す。
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<SessionTokens>, AppError> {
    request.validate()?;

    let identifier = request.identifier().ok_or_else(|| {
        AppError::Validation(vec![FieldError::new(
            "username",
            "username or email is required",
        )])
    })?;

    let tokens = state.auth.login(identifier, &request.password).await?;
    Ok(Json(tokens))
}

/// メール認証ハンドラー
///
/// GET /api/auth/verify?token=...
pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<MessageResponse>, AppError> {
    let user = state.verification.verify(&query.token).await?;
    tracing::info!(username = %user.username, "メール認証完了");

    Ok(Json(MessageResponse {
        message: "Email verified successfully. You can now log in.",
    }))
}

/// 認証メール再送ハンドラー
///
/// POST /api/auth/resend-verification
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    request.validate()?;
    state.verification.resend(request.email.trim()).await?;

    Ok(Json(MessageResponse {
        message: "Verification email sent. Please check your inbox.",
    }))
}

/// パスワードリセット要求ハンドラー
///
/// POST /api/auth/forgot-password
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    request.validate()?;
    state.password_reset.request_reset(request.email.trim()).await?;

    Ok(Json(MessageResponse {
        message: "Password reset link sent to your email.",
    }))
}

/// パスワードリセット実行ハンドラー
///
/// POST /api/auth/reset-password?token=...
pub async fn reset_password(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    request.validate()?;
    state
        .password_reset
        .reset_password(&query.token, &request.new_password)
        .await?;

    Ok(Json(MessageResponse {
        message: "Password has been reset successfully.",
    }))
}

/// トークン更新ハンドラー
///
/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<SessionTokens>, AppError> {
    request.validate()?;
    let tokens = state.auth.refresh(request.refresh_token.trim())?;
    Ok(Json(tokens))
}

/// ログイン中のユーザー情報
///
/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
) -> Result<Json<User>, AppError> {
    let user = state.auth.current_user(&username).await?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_request(username: Option<&str>, email: Option<&str>) -> LoginRequest {
        LoginRequest {
            username: username.map(str::to_string),
            email: email.map(str::to_string),
            password: "secret1".to_string(),
        }
    }

    #[test]
    fn test_login_identifier_prefers_username() {
        let request = login_request(Some("alice"), Some("alice@example.com"));
        assert_eq!(request.identifier(), Some("alice"));
    }

    #[test]
    fn test_login_identifier_falls_back_to_email() {
        let request = login_request(Some("   "), Some("alice@example.com"));
        assert_eq!(request.identifier(), Some("alice@example.com"));
        assert_eq!(login_request(None, None).identifier(), None);
    }

    #[test]
    fn test_register_request_validation() {
        let request = RegisterRequest {
            username: " ".to_string(),
            email: "not-an-email".to_string(),
            full_name: "Alice".to_string(),
            password: "123".to_string(),
        };
        let err: AppError = request.validate().unwrap_err().into();
        let AppError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        let names: Vec<_> = fields.iter().map(|f| f.field.as_str()).collect();
        assert!(names.contains(&"username"));
        assert!(names.contains(&"email"));
        assert!(names.contains(&"password"));
        assert!(!names.contains(&"full_name"));
    }
}
