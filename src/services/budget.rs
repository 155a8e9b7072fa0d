//! 予算の作成と、支出登録前の予算チェック

use std::sync::Arc;

use rust_decimal::Decimal;
use time::Date;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::money::check_amount;
use crate::models::{Budget, Transaction};
use crate::repositories::{BudgetStore, TransactionStore};

/// 予算作成の入力
#[derive(Debug, Clone)]
pub struct NewBudget {
    pub amount: Decimal,
    pub category: Option<String>,
    pub period: Option<String>,
    pub start_date: Date,
    pub end_date: Date,
}

#[derive(Clone)]
pub struct BudgetService {
    budgets: Arc<dyn BudgetStore>,
    transactions: Arc<dyn TransactionStore>,
}

impl BudgetService {
    pub fn new(budgets: Arc<dyn BudgetStore>, transactions: Arc<dyn TransactionStore>) -> Self {
        Self {
            budgets,
            transactions,
        }
    }

    /// 予算を作成
    ///
    /// 同じカテゴリで期間が重なる予算があっても作成する（それぞれ独立に適用される）。
    pub async fn create_budget(&self, user_id: Uuid, input: NewBudget) -> Result<Budget, AppError> {
        let amount = check_amount(input.amount)
            .map_err(|reason| AppError::InvalidInput(format!("Budget {}", reason.to_lowercase())))?;
        if input.start_date > input.end_date {
            return Err(AppError::InvalidInput(
                "Start date must not be after end date".to_string(),
            ));
        }

        let category = input
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let overlapping = self
            .budgets
            .find_overlapping(
                user_id,
                category.as_deref(),
                input.start_date,
                input.end_date,
            )
            .await?;
        if !overlapping.is_empty() {
            tracing::info!(
                user_id = %user_id,
                category = category.as_deref().unwrap_or("Global"),
                overlapping = overlapping.len(),
                "期間が重なる予算が既に存在"
            );
        }

        let budget = Budget::new(
            user_id,
            amount,
            category,
            input.period,
            input.start_date,
            input.end_date,
        );
        let budget = self.budgets.create(&budget).await?;
        tracing::info!(user_id = %user_id, budget_id = %budget.id, "予算作成");
        Ok(budget)
    }

    pub async fn list_budgets(&self, user_id: Uuid) -> Result<Vec<Budget>, AppError> {
        Ok(self.budgets.find_by_user_id(user_id).await?)
    }

    /// 支出を登録してよいか判定
    ///
    /// 支出日を期間に含み、カテゴリが該当する予算すべてについて、
    /// 各予算自身の期間内の支出合計 + amount が上限を超えないことを確認する。
    ///
    /// 判定と登録は不可分ではない。同じユーザーの同時リクエストは
    /// 両方とも判定を通過し、合計で上限を超えうる。
    pub async fn check_availability(
        &self,
        user_id: Uuid,
        amount: Decimal,
        category: &str,
        date: Date,
    ) -> Result<(), AppError> {
        let applicable: Vec<Budget> = self
            .budgets
            .find_active(user_id, date)
            .await?
            .into_iter()
            .filter(|budget| budget.applies_to(category))
            .collect();

        for budget in &applicable {
            let ledger = self
                .transactions
                .find_by_user_and_date_range(user_id, budget.start_date, budget.end_date)
                .await?;
            let current = spent_against(budget, &ledger);

            if current + amount > budget.amount {
                tracing::info!(
                    user_id = %user_id,
                    budget_id = %budget.id,
                    limit = %budget.amount,
                    current = %current,
                    attempted = %amount,
                    "予算超過のため支出を拒否"
                );
                return Err(AppError::BudgetExceeded {
                    limit: budget.amount,
                    current,
                    attempted: amount,
                    scope: budget.scope_label(),
                });
            }
        }

        Ok(())
    }
}

/// 予算の期間内・対象カテゴリの支出合計
pub fn spent_against(budget: &Budget, ledger: &[Transaction]) -> Decimal {
    ledger
        .iter()
        .filter(|t| t.is_expense())
        .filter(|t| budget.covers(t.date))
        .filter(|t| budget.applies_to(&t.category))
        .map(|t| t.amount)
        .sum()
}
