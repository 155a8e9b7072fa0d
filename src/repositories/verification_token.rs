use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::VerificationToken;
use crate::repositories::{StoreError, VerificationTokenStore};

#[derive(Clone)]
pub struct VerificationTokenRepository {
    pool: PgPool,
}

impl VerificationTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VerificationTokenStore for VerificationTokenRepository {
    /// 既存トークンの削除と新規作成を1トランザクションで行う
    ///
    /// # Arguments
    /// * `user_id` - 対象ユーザーのID
    /// * `token_hash` - トークンのSHA256ハッシュ
    /// * `expires_at` - 有効期限
    async fn replace_for_user(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<VerificationToken, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM verification_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let token = sqlx::query_as::<_, VerificationToken>(
            r#"
            INSERT INTO verification_tokens (id, user_id, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, token_hash, expires_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(token)
    }

    /// トークンハッシュでトークンを検索
    ///
    /// # Note
    /// 有効期限の検証は呼び出し側で行う
    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<VerificationToken>, StoreError> {
        let token = sqlx::query_as::<_, VerificationToken>(
            r#"
            SELECT id, user_id, token_hash, expires_at, created_at
            FROM verification_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<VerificationToken>, StoreError> {
        let token = sqlx::query_as::<_, VerificationToken>(
            r#"
            SELECT id, user_id, token_hash, expires_at, created_at
            FROM verification_tokens
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM verification_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
