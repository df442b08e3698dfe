use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::bid::Bid;
use crate::models::request::{NewParcelRequest, ParcelRequest};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requests", post(create_request))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/bids", get(list_request_bids))
        .route("/requests/:id/cancel", post(cancel_request))
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewParcelRequest>,
) -> Result<Json<ParcelRequest>, AppError> {
    Ok(Json(state.bids.create_request(payload)?))
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ParcelRequest>, AppError> {
    Ok(Json(state.bids.request(id)?))
}

async fn list_request_bids(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Bid>>, AppError> {
    Ok(Json(state.bids.bids_for_request(id)?))
}

async fn cancel_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ParcelRequest>, AppError> {
    Ok(Json(state.bids.cancel_request(id)?))
}
