use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// users.username の列長（VARCHAR(50)）
pub const USERNAME_MAX_CHARS: usize = 50;
/// users.full_name の列長（VARCHAR(100)）
pub const FULL_NAME_MAX_CHARS: usize = 100;

/// 先頭から最大 max 文字（文字境界で切る）
pub fn truncate_chars(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((end, _)) => &value[..end],
        None => value,
    }
}

/// ユーザーの認証方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "auth_provider", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Local,
    Federated,
}

/// ユーザー
///
/// username と email はそれぞれ一意。
/// password_hash が無いのはソーシャルログインのみのユーザー（federated）に限る。
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: Option<String>,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub auth_provider: AuthProvider,
    pub enabled: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    /// ローカル登録ユーザー（メール認証が済むまで enabled = false）
    pub fn new_local(
        username: impl Into<String>,
        email: impl Into<String>,
        full_name: impl Into<String>,
        password_hash: String,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            password_hash: Some(password_hash),
            full_name: full_name.into(),
            avatar_url: None,
            auth_provider: AuthProvider::Local,
            enabled: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// ソーシャルログインで作成するユーザー（パスワードなし、即時有効）
    pub fn new_federated(
        username: impl Into<String>,
        email: impl Into<String>,
        full_name: impl Into<String>,
        avatar_url: Option<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            password_hash: None,
            full_name: full_name.into(),
            avatar_url,
            auth_provider: AuthProvider::Federated,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }
}
