use async_trait::async_trait;
use sqlx::PgPool;
use time::Date;
use uuid::Uuid;

use crate::models::Budget;
use crate::repositories::{BudgetStore, StoreError};

#[derive(Clone)]
pub struct BudgetRepository {
    pool: PgPool,
}

impl BudgetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BudgetStore for BudgetRepository {
    async fn create(&self, budget: &Budget) -> Result<Budget, StoreError> {
        let created = sqlx::query_as::<_, Budget>(
            r#"
            INSERT INTO budgets (id, user_id, amount, category, period, start_date, end_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, amount, category, period, start_date, end_date, created_at
            "#,
        )
        .bind(budget.id)
        .bind(budget.user_id)
        .bind(budget.amount)
        .bind(&budget.category)
        .bind(&budget.period)
        .bind(budget.start_date)
        .bind(budget.end_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Budget>, StoreError> {
        let budgets = sqlx::query_as::<_, Budget>(
            r#"
            SELECT id, user_id, amount, category, period, start_date, end_date, created_at
            FROM budgets
            WHERE user_id = $1
            ORDER BY start_date DESC, created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(budgets)
    }

    async fn find_active(&self, user_id: Uuid, date: Date) -> Result<Vec<Budget>, StoreError> {
        let budgets = sqlx::query_as::<_, Budget>(
            r#"
            SELECT id, user_id, amount, category, period, start_date, end_date, created_at
            FROM budgets
            WHERE user_id = $1 AND $2 BETWEEN start_date AND end_date
            "#,
        )
        .bind(user_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(budgets)
    }

    async fn find_overlapping(
        &self,
        user_id: Uuid,
        category: Option<&str>,
        start_date: Date,
        end_date: Date,
    ) -> Result<Vec<Budget>, StoreError> {
        let budgets = sqlx::query_as::<_, Budget>(
            r#"
            SELECT id, user_id, amount, category, period, start_date, end_date, created_at
            FROM budgets
            WHERE user_id = $1
              AND LOWER(NULLIF(TRIM(category), '')) IS NOT DISTINCT FROM LOWER($2)
              AND start_date <= $4
              AND end_date >= $3
            "#,
        )
        .bind(user_id)
        .bind(category)
        .bind(start_date)
        .bind(end_date)
        .fetch_all(&self.pool)
        .await?;
        Ok(budgets)
    }
}
