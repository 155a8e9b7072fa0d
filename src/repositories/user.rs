use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::User;
use crate::repositories::{StoreError, UserStore};

const USER_COLUMNS: &str = "id, username, email, password_hash, full_name, avatar_url, \
                            auth_provider, enabled, created_at, updated_at";

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one_by(&self, column: &str, value: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.find_one_by("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find_one_by("email", email).await
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    /// ユーザーを挿入または更新
    ///
    /// # Errors
    /// - UNIQUE制約違反時: `StoreError::Conflict`
    ///   (constraint = "users_username_key" / "users_email_key")
    ///
    /// # Note
    /// password_hash はログに出力しないこと
    async fn save(&self, user: &User) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (id, username, email, password_hash, full_name, avatar_url,
                               auth_provider, enabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (id) DO UPDATE
            SET username = EXCLUDED.username,
                email = EXCLUDED.email,
                password_hash = EXCLUDED.password_hash,
                full_name = EXCLUDED.full_name,
                avatar_url = EXCLUDED.avatar_url,
                auth_provider = EXCLUDED.auth_provider,
                enabled = EXCLUDED.enabled,
                updated_at = NOW()
            RETURNING {USER_COLUMNS}
            "#
        );
        let saved = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.full_name)
            .bind(&user.avatar_url)
            .bind(user.auth_provider)
            .bind(user.enabled)
            .bind(user.created_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(saved)
    }
}
