use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// パスワードリセットトークン
///
/// トークン自体はハッシュ化してDBに保存（token_hash）
/// 平文トークンはユーザーにメールで送信し、DBには保存しない
///
/// 使用後も削除せず used_at を記録する（監査用、再利用不可）
#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
    pub used_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl PasswordResetToken {
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }
}
