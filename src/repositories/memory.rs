//! インメモリストア
//!
//! PostgreSQL と同じ一意制約（制約名も同じ）を再現する。テストで使う。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::models::{Budget, PasswordResetToken, Transaction, User, VerificationToken};
use crate::repositories::{
    BudgetStore, PasswordResetTokenStore, StoreError, TransactionStore, UserStore,
    VerificationTokenStore,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    verification_tokens: Vec<VerificationToken>,
    reset_tokens: Vec<PasswordResetToken>,
    budgets: Vec<Budget>,
    transactions: Vec<Transaction>,
    user_writes: usize,
}

/// 全ストアトレイトを実装するインメモリストア
///
/// clone はテーブルを共有する。
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `UserStore::save` が成功した回数
    pub fn user_write_count(&self) -> usize {
        self.tables.lock().user_writes
    }

    pub fn user_count(&self) -> usize {
        self.tables.lock().users.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError> {
        let tables = self.tables.lock();
        Ok(tables.users.values().any(|u| u.username == username))
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
        let tables = self.tables.lock();
        Ok(tables.users.values().any(|u| u.email == email))
    }

    async fn save(&self, user: &User) -> Result<User, StoreError> {
        let mut tables = self.tables.lock();

        for other in tables.users.values().filter(|u| u.id != user.id) {
            if other.username == user.username {
                return Err(StoreError::Conflict("users_username_key".to_string()));
            }
            if other.email == user.email {
                return Err(StoreError::Conflict("users_email_key".to_string()));
            }
        }

        let mut saved = user.clone();
        saved.updated_at = OffsetDateTime::now_utc();
        if let Some(existing) = tables.users.get(&user.id) {
            saved.created_at = existing.created_at;
        }
        tables.users.insert(saved.id, saved.clone());
        tables.user_writes += 1;
        Ok(saved)
    }
}

#[async_trait]
impl VerificationTokenStore for MemoryStore {
    async fn replace_for_user(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<VerificationToken, StoreError> {
        let mut tables = self.tables.lock();
        tables.verification_tokens.retain(|t| t.user_id != user_id);

        if tables
            .verification_tokens
            .iter()
            .any(|t| t.token_hash == token_hash)
        {
            return Err(StoreError::Conflict(
                "verification_tokens_token_hash_key".to_string(),
            ));
        }

        let token = VerificationToken {
            id: Uuid::new_v4(),
            user_id,
            token_hash: token_hash.to_string(),
            expires_at,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.verification_tokens.push(token.clone());
        Ok(token)
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<VerificationToken>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .verification_tokens
            .iter()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<VerificationToken>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .verification_tokens
            .iter()
            .find(|t| t.user_id == user_id)
            .cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.tables.lock().verification_tokens.retain(|t| t.id != id);
        Ok(())
    }
}

#[async_trait]
impl PasswordResetTokenStore for MemoryStore {
    async fn replace_unused_for_user(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<PasswordResetToken, StoreError> {
        let mut tables = self.tables.lock();
        tables
            .reset_tokens
            .retain(|t| t.user_id != user_id || t.is_used());

        let token = PasswordResetToken {
            id: Uuid::new_v4(),
            user_id,
            token_hash: token_hash.to_string(),
            expires_at,
            used_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.reset_tokens.push(token.clone());
        Ok(token)
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .reset_tokens
            .iter()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PasswordResetToken>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .reset_tokens
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_as_used(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        match tables
            .reset_tokens
            .iter_mut()
            .find(|t| t.id == id && !t.is_used())
        {
            Some(token) => {
                token.used_at = Some(OffsetDateTime::now_utc());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl BudgetStore for MemoryStore {
    async fn create(&self, budget: &Budget) -> Result<Budget, StoreError> {
        self.tables.lock().budgets.push(budget.clone());
        Ok(budget.clone())
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Budget>, StoreError> {
        let tables = self.tables.lock();
        let mut budgets: Vec<Budget> = tables
            .budgets
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        budgets.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(budgets)
    }

    async fn find_active(&self, user_id: Uuid, date: Date) -> Result<Vec<Budget>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .budgets
            .iter()
            .filter(|b| b.user_id == user_id && b.covers(date))
            .cloned()
            .collect())
    }

    async fn find_overlapping(
        &self,
        user_id: Uuid,
        category: Option<&str>,
        start_date: Date,
        end_date: Date,
    ) -> Result<Vec<Budget>, StoreError> {
        let wanted = category.map(str::to_lowercase);
        let tables = self.tables.lock();
        Ok(tables
            .budgets
            .iter()
            .filter(|b| b.user_id == user_id)
            .filter(|b| {
                let own = if b.is_global() {
                    None
                } else {
                    b.category.as_deref().map(str::to_lowercase)
                };
                own == wanted
            })
            .filter(|b| b.start_date <= end_date && b.end_date >= start_date)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn create(&self, transaction: &Transaction) -> Result<Transaction, StoreError> {
        self.tables.lock().transactions.push(transaction.clone());
        Ok(transaction.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables.transactions.iter().find(|t| t.id == id).cloned())
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Transaction>, StoreError> {
        let tables = self.tables.lock();
        let mut transactions: Vec<Transaction> = tables
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(transactions)
    }

    async fn find_by_user_and_date_range(
        &self,
        user_id: Uuid,
        start_date: Date,
        end_date: Date,
    ) -> Result<Vec<Transaction>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id && t.date >= start_date && t.date <= end_date)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.tables.lock().transactions.retain(|t| t.id != id);
        Ok(())
    }
}
