use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// 収支の種別（予算の消費対象は EXPENSE のみ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Income,
    Expense,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub category: String,
    pub description: Option<String>,
    pub date: Date,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Transaction {
    pub fn new(
        user_id: Uuid,
        amount: Decimal,
        category: impl Into<String>,
        description: Option<String>,
        date: Date,
        transaction_type: TransactionType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            category: category.into(),
            description,
            date,
            transaction_type,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn is_expense(&self) -> bool {
        self.transaction_type == TransactionType::Expense
    }
}
