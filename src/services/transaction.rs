use std::sync::Arc;

use rust_decimal::Decimal;
use time::Date;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::money::check_amount;
use crate::models::{Transaction, TransactionType};
use crate::repositories::TransactionStore;
use crate::services::budget::BudgetService;

/// 収支登録の入力
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub amount: Decimal,
    pub category: String,
    pub description: Option<String>,
    pub date: Date,
    pub transaction_type: TransactionType,
}

#[derive(Clone)]
pub struct TransactionService {
    transactions: Arc<dyn TransactionStore>,
    budgets: BudgetService,
}

impl TransactionService {
    pub fn new(transactions: Arc<dyn TransactionStore>, budgets: BudgetService) -> Self {
        Self {
            transactions,
            budgets,
        }
    }

    /// 収支を登録（支出は予算チェックを通過した場合のみ）
    pub async fn create_transaction(
        &self,
        user_id: Uuid,
        input: NewTransaction,
    ) -> Result<Transaction, AppError> {
        let amount = check_amount(input.amount)
            .map_err(|reason| AppError::InvalidInput(reason.to_string()))?;
        let category = input.category.trim();
        if category.is_empty() {
            return Err(AppError::InvalidInput("Category is required".to_string()));
        }

        if input.transaction_type == TransactionType::Expense {
            self.budgets
                .check_availability(user_id, amount, category, input.date)
                .await?;
        }

        let transaction = Transaction::new(
            user_id,
            amount,
            category,
            input.description,
            input.date,
            input.transaction_type,
        );
        let transaction = self.transactions.create(&transaction).await?;
        tracing::info!(
            user_id = %user_id,
            transaction_id = %transaction.id,
            kind = ?transaction.transaction_type,
            "収支登録"
        );
        Ok(transaction)
    }

    /// 日付の新しい順
    pub async fn list_transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>, AppError> {
        Ok(self.transactions.find_by_user_id(user_id).await?)
    }

    /// 他ユーザーの収支は存在しないものとして扱う
    pub async fn get_transaction(&self, user_id: Uuid, id: Uuid) -> Result<Transaction, AppError> {
        self.transactions
            .find_by_id(id)
            .await?
            .filter(|t| t.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))
    }

    pub async fn delete_transaction(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
        let transaction = self.get_transaction(user_id, id).await?;
        self.transactions.delete(transaction.id).await?;
        tracing::info!(user_id = %user_id, transaction_id = %id, "収支削除");
        Ok(())
    }
}
