use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use time::{Date, OffsetDateTime};

use crate::error::AppError;
use crate::handlers::extractors::AuthUser;
use crate::services::PeriodReport;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WeeklyQuery {
    /// 省略時は今日（UTC）
    pub date: Option<Date>,
}

#[derive(Debug, Deserialize)]
pub struct MonthlyQuery {
    pub year: Option<i32>,
    pub month: Option<u8>,
}

/// 週次レポート（月曜〜日曜）
///
/// GET /api/reports/weekly?date=YYYY-MM-DD
pub async fn weekly_report(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Query(query): Query<WeeklyQuery>,
) -> Result<Json<PeriodReport>, AppError> {
    let user = state.auth.current_user(&username).await?;
    let date = query
        .date
        .unwrap_or_else(|| OffsetDateTime::now_utc().date());
    let report = state.reports.weekly(user.id, date).await?;
    Ok(Json(report))
}

/// 月次レポート
///
/// GET /api/reports/monthly?year=YYYY&month=M
pub async fn monthly_report(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Query(query): Query<MonthlyQuery>,
) -> Result<Json<PeriodReport>, AppError> {
    let user = state.auth.current_user(&username).await?;
    let today = OffsetDateTime::now_utc().date();
    let year = query.year.unwrap_or(today.year());
    let month = query.month.unwrap_or(u8::from(today.month()));
    let report = state.reports.monthly(user.id, year, month).await?;
    Ok(Json(report))
}
