//! 週次・月次の収支集計

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use time::{Date, Month};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Transaction, TransactionType};
use crate::repositories::TransactionStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodReport {
    pub start_date: Date,
    pub end_date: Date,
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub net_balance: Decimal,
    pub expense_by_category: BTreeMap<String, Decimal>,
    /// キーは ISO 8601 の日付文字列
    pub expense_by_day: BTreeMap<String, Decimal>,
}

impl PeriodReport {
    pub fn build(start_date: Date, end_date: Date, transactions: &[Transaction]) -> Self {
        let mut total_income = Decimal::ZERO;
        let mut total_expense = Decimal::ZERO;
        let mut expense_by_category = BTreeMap::new();
        let mut expense_by_day = BTreeMap::new();

        for t in transactions
            .iter()
            .filter(|t| start_date <= t.date && t.date <= end_date)
        {
            match t.transaction_type {
                TransactionType::Income => total_income += t.amount,
                TransactionType::Expense => {
                    total_expense += t.amount;
                    *expense_by_category
                        .entry(t.category.clone())
                        .or_insert(Decimal::ZERO) += t.amount;
                    *expense_by_day
                        .entry(t.date.to_string())
                        .or_insert(Decimal::ZERO) += t.amount;
                }
            }
        }

        Self {
            start_date,
            end_date,
            total_income,
            total_expense,
            net_balance: total_income - total_expense,
            expense_by_category,
            expense_by_day,
        }
    }
}

/// date を含む週（月曜〜日曜）
///
/// 週が表現可能な日付範囲をはみ出す場合は `InvalidInput`。
pub fn week_bounds(date: Date) -> Result<(Date, Date), AppError> {
    let out_of_range = || AppError::InvalidInput("Date is out of supported range".to_string());
    let offset = i64::from(date.weekday().number_days_from_monday());
    let start = date
        .checked_sub(time::Duration::days(offset))
        .ok_or_else(out_of_range)?;
    let end = start
        .checked_add(time::Duration::days(6))
        .ok_or_else(out_of_range)?;
    Ok((start, end))
}

/// 指定月の初日と末日
pub fn month_bounds(year: i32, month: u8) -> Result<(Date, Date), AppError> {
    let month = Month::try_from(month)
        .map_err(|_| AppError::InvalidInput("Month must be between 1 and 12".to_string()))?;
    let start = Date::from_calendar_date(year, month, 1)
        .map_err(|_| AppError::InvalidInput("Invalid year".to_string()))?;
    let end = Date::from_calendar_date(year, month, time::util::days_in_year_month(year, month))
        .map_err(|_| AppError::InvalidInput("Invalid year".to_string()))?;
    Ok((start, end))
}

#[derive(Clone)]
pub struct ReportService {
    transactions: Arc<dyn TransactionStore>,
}

impl ReportService {
    pub fn new(transactions: Arc<dyn TransactionStore>) -> Self {
        Self { transactions }
    }

    pub async fn weekly(&self, user_id: Uuid, date: Date) -> Result<PeriodReport, AppError> {
        let (start, end) = week_bounds(date)?;
        self.report(user_id, start, end).await
    }

    pub async fn monthly(&self, user_id: Uuid, year: i32, month: u8) -> Result<PeriodReport, AppError> {
        let (start, end) = month_bounds(year, month)?;
        self.report(user_id, start, end).await
    }

    async fn report(&self, user_id: Uuid, start: Date, end: Date) -> Result<PeriodReport, AppError> {
        let transactions = self
            .transactions
            .find_by_user_and_date_range(user_id, start, end)
            .await?;
        tracing::debug!(
            user_id = %user_id,
            start = %start,
            end = %end,
            count = transactions.len(),
            "収支レポート集計"
        );
        Ok(PeriodReport::build(start, end, &transactions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryStore;
    use time::macros::date;

    #[test]
    fn test_week_bounds_monday_to_sunday() {
        // 2024-01-17 は水曜日
        assert_eq!(
            week_bounds(date!(2024 - 01 - 17)).unwrap(),
            (date!(2024 - 01 - 15), date!(2024 - 01 - 21))
        );
        assert_eq!(
            week_bounds(date!(2024 - 01 - 15)).unwrap(),
            (date!(2024 - 01 - 15), date!(2024 - 01 - 21))
        );
        assert_eq!(
            week_bounds(date!(2024 - 01 - 21)).unwrap(),
            (date!(2024 - 01 - 15), date!(2024 - 01 - 21))
        );
    }

    #[test]
    fn test_week_bounds_at_edges_of_date_range() {
        // 9999-12-31 は金曜日で、週末が表現範囲外
        assert!(matches!(
            week_bounds(date!(9999 - 12 - 31)),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            week_bounds(Date::MAX),
            Err(AppError::InvalidInput(_))
        ));

        match week_bounds(Date::MIN) {
            Ok((start, _)) => assert_eq!(start, Date::MIN),
            Err(e) => assert!(matches!(e, AppError::InvalidInput(_))),
        }
        let after_min = Date::MIN.next_day().unwrap();
        match week_bounds(after_min) {
            Ok((start, end)) => assert!(start <= after_min && after_min <= end),
            Err(e) => assert!(matches!(e, AppError::InvalidInput(_))),
        }
    }

    #[tokio::test]
    async fn test_weekly_report_out_of_range_date() {
        let service = ReportService::new(Arc::new(MemoryStore::new()));
        let err = service
            .weekly(Uuid::new_v4(), date!(9999 - 12 - 31))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_month_bounds() {
        assert_eq!(
            month_bounds(2024, 2).unwrap(),
            (date!(2024 - 02 - 01), date!(2024 - 02 - 29))
        );
        assert_eq!(
            month_bounds(2023, 12).unwrap(),
            (date!(2023 - 12 - 01), date!(2023 - 12 - 31))
        );
        assert!(matches!(month_bounds(2024, 13), Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_monthly_report_totals() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let entries = [
            (1000, "Salary", date!(2024 - 01 - 25), TransactionType::Income),
            (40, "Food", date!(2024 - 01 - 03), TransactionType::Expense),
            (10, "Food", date!(2024 - 01 - 03), TransactionType::Expense),
            (200, "Rent", date!(2024 - 01 - 01), TransactionType::Expense),
            (999, "Food", date!(2024 - 02 - 01), TransactionType::Expense),
        ];
        for (amount, category, date, kind) in entries {
            let t = Transaction::new(user_id, Decimal::from(amount), category, None, date, kind);
            TransactionStore::create(&store, &t).await.unwrap();
        }

        let report = ReportService::new(Arc::new(store))
            .monthly(user_id, 2024, 1)
            .await
            .unwrap();

        assert_eq!(report.total_income, Decimal::from(1000));
        assert_eq!(report.total_expense, Decimal::from(250));
        assert_eq!(report.net_balance, Decimal::from(750));
        assert_eq!(report.expense_by_category["Food"], Decimal::from(50));
        assert_eq!(report.expense_by_category["Rent"], Decimal::from(200));
        assert_eq!(report.expense_by_day["2024-01-03"], Decimal::from(50));
        assert!(!report.expense_by_day.contains_key("2024-02-01"));
    }
}
