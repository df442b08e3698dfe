use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::engine::payments::PaymentUpdate;
use crate::error::AppError;
use crate::models::payment::{NewPayment, Payment, PaymentStatusUpdate};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payments", post(record_payment))
        .route("/payments/:id", get(get_payment))
        .route("/payments/:id/status", patch(update_payment_status))
        .route("/bids/:id/payments", get(payments_for_bid))
}

async fn record_payment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewPayment>,
) -> Result<Json<Payment>, AppError> {
    Ok(Json(state.payments.record_payment(payload)?))
}

async fn get_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>, AppError> {
    Ok(Json(state.payments.payment(id)?))
}

async fn update_payment_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PaymentStatusUpdate>,
) -> Result<Json<PaymentUpdate>, AppError> {
    Ok(Json(state.payments.update_status(id, payload)?))
}

async fn payments_for_bid(
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
) -> Result<Json<Vec<Payment>>, AppError> {
    Ok(Json(state.payments.payments_for_bid(bid_id)?))
}
