use std::sync::Arc;

use time::OffsetDateTime;

use crate::error::AppError;
use crate::models::User;
use crate::repositories::{UserStore, VerificationTokenStore};
use crate::services::email::{Notifier, verification_message};
use crate::services::token::{IssuedToken, TokenPolicy, build_link, generate_token, hash_token};

/// メール認証サービス
///
/// トークンはユーザーごとに1つ。再発行すると以前のトークンは無効になる。
#[derive(Clone)]
pub struct EmailVerificationService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn VerificationTokenStore>,
    notifier: Arc<dyn Notifier>,
    policy: TokenPolicy,
}

impl EmailVerificationService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn VerificationTokenStore>,
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

    /// 認証トークンを発行し、認証リンクを送信
    ///
    /// # Security
    /// - トークン（平文）はログに出力しない
    pub async fn issue(&self, user: &User) -> Result<IssuedToken, AppError> {
        let token = generate_token();
        let expires_at = OffsetDateTime::now_utc() + self.policy.verification_ttl;

        self.tokens
            .replace_for_user(user.id, &hash_token(&token), expires_at)
            .await?;

        let link = build_link(&self.policy.verification_url_base, &token);
        let (subject, body) = verification_message(&user.full_name, &link);
        self.notifier.send(&user.email, &subject, &body).await?;

        tracing::info!(user_id = %user.id, "メール認証トークン発行");
        Ok(IssuedToken { token, expires_at })
    }

    /// トークンを検証してアカウントを有効化
    ///
    /// 成功したトークンは削除されるため、2回目以降は `InvalidToken` になる。
    pub async fn verify(&self, token: &str) -> Result<User, AppError> {
        let stored = self
            .tokens
            .find_by_token_hash(&hash_token(token))
            .await?
            .ok_or_else(|| AppError::InvalidToken("Invalid verification token".to_string()))?;

        if stored.is_expired_at(OffsetDateTime::now_utc()) {
            tracing::warn!(token_id = %stored.id, "期限切れの認証トークン");
            return Err(AppError::TokenExpired);
        }

        let mut user = self
            .users
            .find_by_id(stored.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        user.enabled = true;
        let user = self.users.save(&user).await?;
        self.tokens.delete(stored.id).await?;

        tracing::info!(user_id = %user.id, "メール認証完了");
        Ok(user)
    }

    /// 未認証アカウントに認証メールを再送
    pub async fn resend(&self, email: &str) -> Result<(), AppError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound("No account found with this email".to_string()))?;

        if user.enabled {
            return Err(AppError::InvalidInput(
                "Account is already verified".to_string(),
            ));
        }

        self.issue(&user).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryStore;
    use crate::services::email::RecordingNotifier;
    use time::Duration;

    struct Fixture {
        store: MemoryStore,
        notifier: RecordingNotifier,
        service: EmailVerificationService,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let service = EmailVerificationService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(notifier.clone()),
            TokenPolicy::default(),
        );
        Fixture {
            store,
            notifier,
            service,
        }
    }

    async fn disabled_user(store: &MemoryStore) -> User {
        let user = User::new_local("carol", "carol@example.com", "Carol", "hash".into());
        store.save(&user).await.unwrap()
    }

    #[tokio::test]
    async fn test_issue_sets_24h_expiry_and_sends_link() {
        let f = fixture();
        let user = disabled_user(&f.store).await;

        let issued = f.service.issue(&user).await.unwrap();
        let expected = OffsetDateTime::now_utc() + Duration::hours(24);
        assert!((issued.expires_at - expected).abs() < Duration::seconds(5));

        let stored = VerificationTokenStore::find_by_user_id(&f.store, user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.token_hash, hash_token(&issued.token));
        assert_ne!(stored.token_hash, issued.token);

        let message = f.notifier.last_to("carol@example.com").unwrap();
        assert_eq!(message.token().as_deref(), Some(issued.token.as_str()));
    }

    #[tokio::test]
    async fn test_verify_enables_user_once() {
        let f = fixture();
        let user = disabled_user(&f.store).await;
        let issued = f.service.issue(&user).await.unwrap();

        let verified = f.service.verify(&issued.token).await.unwrap();
        assert!(verified.enabled);

        let err = f.service.verify(&issued.token).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_verify_unknown_token() {
        let f = fixture();
        let err = f.service.verify("no-such-token").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_verify_expired_token() {
        let f = fixture();
        let user = disabled_user(&f.store).await;
        let token = generate_token();
        f.store
            .replace_for_user(
                user.id,
                &hash_token(&token),
                OffsetDateTime::now_utc() - Duration::minutes(1),
            )
            .await
            .unwrap();

        let err = f.service.verify(&token).await.unwrap_err();
        assert!(matches!(err, AppError::TokenExpired));

        let user = UserStore::find_by_id(&f.store, user.id).await.unwrap().unwrap();
        assert!(!user.enabled);
    }

    #[tokio::test]
    async fn test_reissue_supersedes_previous_token() {
        let f = fixture();
        let user = disabled_user(&f.store).await;
        let first = f.service.issue(&user).await.unwrap();
        let second = f.service.issue(&user).await.unwrap();

        let err = f.service.verify(&first.token).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(_)));
        assert!(f.service.verify(&second.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_resend_rules() {
        let f = fixture();
        let err = f.service.resend("nobody@example.com").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let user = disabled_user(&f.store).await;
        f.service.resend(&user.email).await.unwrap();
        assert_eq!(f.notifier.sent().len(), 1);

        let token = f.notifier.last_to(&user.email).unwrap().token().unwrap();
        f.service.verify(&token).await.unwrap();

        let err = f.service.resend(&user.email).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
