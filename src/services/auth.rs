use std::sync::{Arc, LazyLock};

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

use crate::error::AppError;
use crate::models::User;
use crate::repositories::UserStore;
use crate::services::session::{SessionIssuer, SessionTokens};
use crate::services::verification::EmailVerificationService;

pub const MIN_PASSWORD_LEN: usize = 6;

/// ユーザー不在時にも検証コストを揃えるためのハッシュ
static DUMMY_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password("ledgerguard-dummy-password").unwrap_or_default());

/// パスワードをargon2idでハッシュ化
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            tracing::error!(error = ?e, "パスワードハッシュ生成エラー");
            AppError::Internal(anyhow::anyhow!("password hash error"))
        })?;
    Ok(hash.to_string())
}

/// パスワードを検証
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| {
        tracing::error!(error = ?e, "パスワードハッシュのパースエラー");
        AppError::Internal(anyhow::anyhow!("password hash parse error"))
    })?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// タイミング攻撃対策: 結果を捨ててダミーのパスワード検証を実行
fn burn_verification(password: &str) {
    let _ = verify_password(password, &DUMMY_HASH);
}

/// 新規登録の入力
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
}

/// 認証サービス
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    verification: EmailVerificationService,
    sessions: SessionIssuer,
}

impl AuthService {
    /// 新しい AuthService を作成
    pub fn new(
        users: Arc<dyn UserStore>,
        verification: EmailVerificationService,
        sessions: SessionIssuer,
    ) -> Self {
        Self {
            users,
            verification,
            sessions,
        }
    }

    /// ローカルアカウントを登録し、認証メールを送信
    ///
    /// 作成されたユーザーはメール認証が済むまで無効（enabled = false）。
    /// 認証メールの送信に失敗してもユーザーは作成済みのまま残る（再送で回復する）。
    pub async fn register(&self, input: NewUser) -> Result<User, AppError> {
        if self.users.exists_by_username(&input.username).await? {
            return Err(AppError::Conflict("Username already exists".to_string()));
        }
        if self.users.exists_by_email(&input.email).await? {
            return Err(AppError::Conflict("Email already exists".to_string()));
        }

        let password_hash = hash_password(&input.password)?;
        let user = User::new_local(input.username, input.email, input.full_name, password_hash);
        let user = self.users.save(&user).await?;
        tracing::info!(user_id = %user.id, username = %user.username, "ユーザー登録");

        self.verification.issue(&user).await?;
        Ok(user)
    }

    /// ユーザー名またはメールアドレスでログイン
    ///
    /// # Errors
    /// - ユーザー不在・パスワード不一致: `Unauthorized`（区別しない）
    /// - メール未認証: `AccountNotEnabled`
    pub async fn login(&self, identifier: &str, password: &str) -> Result<SessionTokens, AppError> {
        let user = match self.users.find_by_username(identifier).await? {
            Some(user) => Some(user),
            None => self.users.find_by_email(identifier).await?,
        };

        let Some(user) = user else {
            burn_verification(password);
            tracing::warn!("認証失敗: ユーザー不在");
            return Err(invalid_credentials());
        };

        if !user.enabled {
            tracing::warn!(user_id = %user.id, "認証失敗: メール未認証");
            return Err(AppError::AccountNotEnabled(
                "Email not verified. Please verify your email before logging in".to_string(),
            ));
        }

        // ソーシャルログインユーザー（パスワードなし）の場合は認証失敗
        let Some(password_hash) = user.password_hash.as_deref() else {
            burn_verification(password);
            tracing::warn!(user_id = %user.id, "認証失敗: ソーシャルログインユーザー");
            return Err(invalid_credentials());
        };

        if !verify_password(password, password_hash)? {
            tracing::warn!(user_id = %user.id, "認証失敗: パスワード不一致");
            return Err(invalid_credentials());
        }

        tracing::info!(user_id = %user.id, "認証成功");
        self.sessions.issue(&user.username)
    }

    /// セッションの主体（ユーザー名）からユーザーを取得
    pub async fn current_user(&self, username: &str) -> Result<User, AppError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub fn refresh(&self, refresh_token: &str) -> Result<SessionTokens, AppError> {
        self.sessions.refresh(refresh_token)
    }
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid credentials".to_string())
}
