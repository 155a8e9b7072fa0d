use axum::{Json, extract::State, http::StatusCode};
use garde::Validate;
use rust_decimal::Decimal;
use serde::Deserialize;
use time::Date;

use crate::error::AppError;
use crate::handlers::extractors::AuthUser;
use crate::handlers::validation::storable_amount;
use crate::models::Budget;
use crate::services::NewBudget;
use crate::state::AppState;

/// 予算作成リクエスト
///
/// category を省略すると全カテゴリ対象の予算になる。
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBudgetRequest {
    #[garde(custom(storable_amount))]
    pub amount: Decimal,
    #[garde(length(max = 50))]
    pub category: Option<String>,
    #[garde(length(max = 20))]
    pub period: Option<String>,
    #[garde(skip)]
    pub start_date: Date,
    #[garde(skip)]
    pub end_date: Date,
}

/// 予算一覧
///
/// GET /api/budgets
pub async fn list_budgets(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
) -> Result<Json<Vec<Budget>>, AppError> {
    let user = state.auth.current_user(&username).await?;
    let budgets = state.budgets.list_budgets(user.id).await?;
    Ok(Json(budgets))
}

/// 予算作成
///
/// POST /api/budgets
pub async fn create_budget(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Json(request): Json<CreateBudgetRequest>,
) -> Result<(StatusCode, Json<Budget>), AppError> {
    request.validate()?;

    let user = state.auth.current_user(&username).await?;
    let budget = state
        .budgets
        .create_budget(
            user.id,
            NewBudget {
                amount: request.amount,
                category: request.category,
                period: request.period,
                start_date: request.start_date,
                end_date: request.end_date,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(budget)))
}
