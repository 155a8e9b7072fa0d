//! 永続化層
//!
//! サービス層はここで定義するトレイト越しにストアへアクセスする。
//! PostgreSQL 実装（`*Repository`）と、テスト用のインメモリ実装（`MemoryStore`）がある。
//! 一意制約違反はどちらの実装でも `StoreError::Conflict` として通知される。

pub mod budget;
pub mod memory;
pub mod password_reset_token;
pub mod transaction;
pub mod user;
pub mod verification_token;

use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::models::{Budget, PasswordResetToken, Transaction, User, VerificationToken};

pub use budget::BudgetRepository;
pub use memory::MemoryStore;
pub use password_reset_token::PasswordResetTokenRepository;
pub use transaction::TransactionRepository;
pub use user::UserRepository;
pub use verification_token::VerificationTokenRepository;

/// ストア操作のエラー
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 一意制約違反（制約名を保持）
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("database error")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err
            && db_err.is_unique_violation()
        {
            let constraint = db_err.constraint().unwrap_or("unique").to_string();
            return Self::Conflict(constraint);
        }
        Self::Database(err)
    }
}

/// ユーザーストア（完全一致検索のみ）
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError>;

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError>;

    /// 挿入または更新（id で判定）
    ///
    /// # Errors
    /// - username / email の一意制約違反時: `StoreError::Conflict`
    async fn save(&self, user: &User) -> Result<User, StoreError>;
}

#[async_trait]
pub trait VerificationTokenStore: Send + Sync {
    /// ユーザーの既存トークンを削除して新しいトークンを作成
    async fn replace_for_user(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<VerificationToken, StoreError>;

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<VerificationToken>, StoreError>;

    async fn find_by_user_id(&self, user_id: Uuid)
    -> Result<Option<VerificationToken>, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PasswordResetTokenStore: Send + Sync {
    /// 未使用トークンを削除して新しいトークンを作成
    ///
    /// 同時リクエスト時は後勝ちで、未使用トークンは常に最大1つに収束する。
    async fn replace_unused_for_user(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<PasswordResetToken, StoreError>;

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, StoreError>;

    /// ユーザーの全トークン（使用済みを含む）
    async fn find_by_user_id(&self, user_id: Uuid)
    -> Result<Vec<PasswordResetToken>, StoreError>;

    /// 未使用のトークンを使用済みにする
    ///
    /// 既に使用済みなら false（同じトークンの同時使用はどちらか一方だけが true）。
    async fn mark_as_used(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait BudgetStore: Send + Sync {
    async fn create(&self, budget: &Budget) -> Result<Budget, StoreError>;

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Budget>, StoreError>;

    /// 期間に date を含む予算
    async fn find_active(&self, user_id: Uuid, date: Date) -> Result<Vec<Budget>, StoreError>;

    /// 同じカテゴリ（None はグローバル同士）で期間が重なる予算
    async fn find_overlapping(
        &self,
        user_id: Uuid,
        category: Option<&str>,
        start_date: Date,
        end_date: Date,
    ) -> Result<Vec<Budget>, StoreError>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn create(&self, transaction: &Transaction) -> Result<Transaction, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>, StoreError>;

    /// 日付の新しい順
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Transaction>, StoreError>;

    /// start_date から end_date まで（両端を含む）
    async fn find_by_user_and_date_range(
        &self,
        user_id: Uuid,
        start_date: Date,
        end_date: Date,
    ) -> Result<Vec<Transaction>, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}
