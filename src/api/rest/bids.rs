use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::bid::{Bid, NewBid};
use crate::models::earnings::Earnings;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bids", post(place_bid))
        .route("/bids/:id", get(get_bid))
        .route("/bids/:id/accept", post(accept_bid))
        .route("/bids/:id/reject", post(reject_bid))
        .route("/bids/:id/settle", post(settle_bid))
}

async fn place_bid(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewBid>,
) -> Result<Json<Bid>, AppError> {
    Ok(Json(state.bids.place_bid(payload)?))
}

async fn get_bid(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Bid>, AppError> {
    Ok(Json(state.bids.bid(id)?))
}

async fn accept_bid(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Bid>, AppError> {
    Ok(Json(state.bids.accept_bid(id)?))
}

async fn reject_bid(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Bid>, AppError> {
    Ok(Json(state.bids.reject_bid(id)?))
}

async fn settle_bid(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Earnings>, AppError> {
    Ok(Json(state.settlement.settle(id)?))
}
