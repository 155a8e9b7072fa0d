use std::sync::Arc;

use time::OffsetDateTime;

use crate::error::AppError;
use crate::repositories::{PasswordResetTokenStore, UserStore};
use crate::services::auth::{MIN_PASSWORD_LEN, hash_password};
use crate::services::email::{Notifier, password_reset_message};
use crate::services::token::{TokenPolicy, build_link, generate_token, hash_token};

/// パスワードリセットサービス
#[derive(Clone)]
pub struct PasswordResetService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn PasswordResetTokenStore>,
    notifier: Arc<dyn Notifier>,
    policy: TokenPolicy,
}

impl PasswordResetService {
    /// 新しい PasswordResetService を作成
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn PasswordResetTokenStore>,
        notifier: Arc<dyn Notifier>,
        policy: TokenPolicy,
    ) -> Self {
        Self {
            users,
            tokens,
            notifier,
            policy,
        }
    }

    /// パスワードリセットをリクエスト
    ///
    /// 未使用の既存トークンは破棄され、新しいトークンだけが有効になる。
    ///
    /// # Errors
    /// - ユーザー不在: `NotFound`
    /// - メール未認証: `AccountNotEnabled`
    ///
    /// # Security
    /// - トークン（平文）はログに出力しない
    pub async fn request_reset(&self, email: &str) -> Result<(), AppError> {
        tracing::info!(email = %email, "パスワードリセットリクエスト");

        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound("No account found with this email".to_string()))?;

        if !user.enabled {
            tracing::warn!(user_id = %user.id, "未認証アカウントのパスワードリセット要求");
            return Err(AppError::AccountNotEnabled(
                "Please verify your email before resetting your password".to_string(),
            ));
        }

        let token = generate_token();
        let expires_at = OffsetDateTime::now_utc() + self.policy.password_reset_ttl;

        self.tokens
            .replace_unused_for_user(user.id, &hash_token(&token), expires_at)
            .await?;

        let link = build_link(&self.policy.password_reset_url_base, &token);
        let (subject, body) = password_reset_message(&user.full_name, &link);
        self.notifier.send(&user.email, &subject, &body).await?;

        tracing::info!(user_id = %user.id, "パスワードリセットメール送信完了");
        Ok(())
    }

    /// パスワードをリセット
    ///
    /// 使用済みトークンは削除せず used_at を記録する。
    /// 同じトークンの同時使用は、使用済みマークに成功した一方だけが通る。
    ///
    /// # Security
    /// - トークン・新パスワードはログに出力しない
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::InvalidInput(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let reset_token = self
            .tokens
            .find_by_token_hash(&hash_token(token))
            .await?
            .ok_or_else(|| AppError::InvalidToken("Invalid password reset token".to_string()))?;

        if reset_token.is_expired_at(OffsetDateTime::now_utc()) {
            tracing::warn!(token_id = %reset_token.id, "期限切れトークン");
            return Err(AppError::TokenExpired);
        }

        if reset_token.is_used() {
            tracing::warn!(token_id = %reset_token.id, "使用済みトークン");
            return Err(AppError::InvalidToken(
                "Password reset token has already been used".to_string(),
            ));
        }

        let mut user = self
            .users
            .find_by_id(reset_token.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        let password_hash = hash_password(new_password)?;

        // パスワード更新より先に使用権を確定させる
        if !self.tokens.mark_as_used(reset_token.id).await? {
            tracing::warn!(token_id = %reset_token.id, "トークンの同時使用を拒否");
            return Err(AppError::InvalidToken(
                "Password reset token has already been used".to_string(),
            ));
        }

        user.password_hash = Some(password_hash);
        self.users.save(&user).await?;

        tracing::info!(user_id = %reset_token.user_id, "パスワードリセット完了");
        Ok(())
    }
}
