use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use garde::Validate;
use rust_decimal::Decimal;
use serde::Deserialize;
use time::Date;
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::extractors::AuthUser;
use crate::handlers::validation::{not_blank, storable_amount};
use crate::models::{Transaction, TransactionType};
use crate::services::NewTransaction;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTransactionRequest {
    #[garde(custom(storable_amount))]
    pub amount: Decimal,
    #[garde(custom(not_blank), length(max = 50))]
    pub category: String,
    #[garde(length(max = 255))]
    pub description: Option<String>,
    #[garde(skip)]
    pub date: Date,
    #[serde(rename = "type")]
    #[garde(skip)]
    pub transaction_type: TransactionType,
}

/// 収支一覧（新しい順）
///
/// GET /api/transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let user = state.auth.current_user(&username).await?;
    let transactions = state.transactions.list_transactions(user.id).await?;
    Ok(Json(transactions))
}

/// 収支登録
///
/// POST /api/transactions
///
/// 支出は登録前に予算チェックを通す。超過時は 400 BUDGET_EXCEEDED。
pub async fn create_transaction(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    request.validate()?;

    let user = state.auth.current_user(&username).await?;
    let transaction = state
        .transactions
        .create_transaction(
            user.id,
            NewTransaction {
                amount: request.amount,
                category: request.category,
                description: request.description,
                date: request.date,
                transaction_type: request.transaction_type,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

/// GET /api/transactions/{id}
pub async fn get_transaction(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    let user = state.auth.current_user(&username).await?;
    let transaction = state.transactions.get_transaction(user.id, id).await?;
    Ok(Json(transaction))
}

/// DELETE /api/transactions/{id}
pub async fn delete_transaction(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let user = state.auth.current_user(&username).await?;
    state.transactions.delete_transaction(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
