use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::dispute::{Dispute, DisputeFilter, DisputeStatus, NewDispute};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/disputes", get(list_disputes).post(open_dispute))
        .route("/disputes/:id", get(get_dispute))
        .route("/disputes/:id/status", patch(update_dispute_status))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DisputeStatus,
}

async fn open_dispute(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewDispute>,
) -> Result<Json<Dispute>, AppError> {
    Ok(Json(state.disputes.open_dispute(payload)?))
}

async fn list_disputes(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<DisputeFilter>,
) -> Json<Vec<Dispute>> {
    Json(state.disputes.list(&filter))
}

async fn get_dispute(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Dispute>, AppError> {
    Ok(Json(state.disputes.dispute(id)?))
}

async fn update_dispute_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Dispute>, AppError> {
    Ok(Json(state.disputes.update_status(id, payload.status)?))
}
