use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::engine::withdrawals::WithdrawalUpdate;
use crate::error::AppError;
use crate::models::withdrawal::{DriverBalance, NewWithdrawal, Withdrawal, WithdrawalStatusUpdate};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/withdrawals", post(request_withdrawal))
        .route("/withdrawals/:id", get(get_withdrawal))
        .route("/withdrawals/:id/status", patch(update_withdrawal_status))
        .route("/drivers/:id/withdrawals", get(list_withdrawals))
        .route("/drivers/:id/balance", get(driver_balance))
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub driver_id: Uuid,
    pub withdrawable: Decimal,
    #[serde(flatten)]
    pub balance: DriverBalance,
}

async fn request_withdrawal(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewWithdrawal>,
) -> Result<Json<Withdrawal>, AppError> {
    Ok(Json(state.withdrawals.request_withdrawal(payload)?))
}

async fn get_withdrawal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Withdrawal>, AppError> {
    Ok(Json(state.withdrawals.withdrawal(id)?))
}

async fn update_withdrawal_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<WithdrawalStatusUpdate>,
) -> Result<Json<WithdrawalUpdate>, AppError> {
    Ok(Json(state.withdrawals.update_status(id, payload)?))
}

async fn list_withdrawals(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<Uuid>,
) -> Json<Vec<Withdrawal>> {
    Json(state.withdrawals.history(driver_id))
}

async fn driver_balance(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<Uuid>,
) -> Json<BalanceResponse> {
    let balance = state.withdrawals.balance(driver_id);
    Json(BalanceResponse {
        driver_id,
        withdrawable: balance.withdrawable(),
        balance,
    })
}
