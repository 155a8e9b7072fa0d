use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// メール認証トークン
///
/// ユーザーごとに有効なトークンは1つだけ。
/// 認証成功時に削除される（使用済みフラグは持たない）。
/// 平文トークンはメールでのみ送信し、DBには SHA256 ハッシュを保存する。
#[derive(Debug, Clone, FromRow)]
pub struct VerificationToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl VerificationToken {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }
}
