use async_trait::async_trait;
use sqlx::PgPool;
use time::Date;
use uuid::Uuid;

use crate::models::Transaction;
use crate::repositories::{StoreError, TransactionStore};

#[derive(Clone)]
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for TransactionRepository {
    async fn create(&self, transaction: &Transaction) -> Result<Transaction, StoreError> {
        let created = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (id, user_id, amount, category, description, date,
                                      transaction_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, amount, category, description, date, transaction_type,
                      created_at
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.user_id)
        .bind(transaction.amount)
        .bind(&transaction.category)
        .bind(&transaction.description)
        .bind(transaction.date)
        .bind(transaction.transaction_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>, StoreError> {
        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, user_id, amount, category, description, date, transaction_type, created_at
            FROM transactions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(transaction)
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Transaction>, StoreError> {
        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, user_id, amount, category, description, date, transaction_type, created_at
            FROM transactions
            WHERE user_id = $1
            ORDER BY date DESC, created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(transactions)
    }

    async fn find_by_user_and_date_range(
        &self,
        user_id: Uuid,
        start_date: Date,
        end_date: Date,
    ) -> Result<Vec<Transaction>, StoreError> {
        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, user_id, amount, category, description, date, transaction_type, created_at
            FROM transactions
            WHERE user_id = $1 AND date BETWEEN $2 AND $3
            "#,
        )
        .bind(user_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_all(&self.pool)
        .await?;
        Ok(transactions)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM transactions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
