use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// 予算（支出上限）
///
/// category が無い（または空）の予算はグローバル予算で、全カテゴリの支出に適用される。
/// 期間は start_date から end_date まで（両端を含む）。
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Budget {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub category: Option<String>,
    pub period: Option<String>,
    pub start_date: Date,
    pub end_date: Date,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Budget {
    pub fn new(
        user_id: Uuid,
        amount: Decimal,
        category: Option<String>,
        period: Option<String>,
        start_date: Date,
        end_date: Date,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            category,
            period,
            start_date,
            end_date,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn is_global(&self) -> bool {
        self.category
            .as_deref()
            .is_none_or(|category| category.trim().is_empty())
    }

    /// この予算が指定カテゴリの支出に適用されるか（大文字小文字を区別しない）
    pub fn applies_to(&self, category: &str) -> bool {
        if self.is_global() {
            return true;
        }
        self.category
            .as_deref()
            .is_some_and(|own| own.to_lowercase() == category.to_lowercase())
    }

    pub fn covers(&self, date: Date) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// エラーメッセージ用の予算種別
    pub fn scope_label(&self) -> String {
        match self.category.as_deref() {
            Some(category) if !category.trim().is_empty() => category.to_string(),
            _ => "Global".to_string(),
        }
    }
}
