use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::earnings::{Earnings, EarningsStatus, EarningsSummary};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers/:id/earnings", get(list_earnings))
        .route("/drivers/:id/earnings/summary", get(earnings_summary))
        .route("/drivers/:id/earnings/adjustments", post(record_adjustment))
        .route("/earnings/:id/status", patch(update_earnings_status))
        .route("/bids/:id/earnings", get(earnings_for_bid))
}

#[derive(Deserialize)]
pub struct EarningsFilter {
    pub status: Option<EarningsStatus>,
}

#[derive(Deserialize)]
pub struct AdjustmentRequest {
    pub gross_amount: Decimal,
    #[serde(default)]
    pub app_fee: Decimal,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: EarningsStatus,
}

async fn list_earnings(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<Uuid>,
    Query(filter): Query<EarningsFilter>,
) -> Json<Vec<Earnings>> {
    Json(state.earnings.history(driver_id, filter.status))
}

async fn earnings_summary(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<Uuid>,
) -> Json<EarningsSummary> {
    Json(state.earnings.summary(driver_id, state.clock.now()))
}

async fn record_adjustment(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<Uuid>,
    Json(payload): Json<AdjustmentRequest>,
) -> Result<Json<Earnings>, AppError> {
    Ok(Json(state.earnings.record_adjustment(
        driver_id,
        payload.gross_amount,
        payload.app_fee,
    )?))
}

async fn update_earnings_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Earnings>, AppError> {
    Ok(Json(state.earnings.update_status(id, payload.status)?))
}

async fn earnings_for_bid(
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
) -> Result<Json<Earnings>, AppError> {
    Ok(Json(state.earnings.for_bid(bid_id)?))
}
