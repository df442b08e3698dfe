use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::delivery::{Delivered, DeliveryDetails};
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::tracking::{DeliveryTracking, DriverLocationUpdate};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries/:bid_id", get(get_delivery))
        .route("/deliveries/:bid_id/pickup", post(mark_picked_up))
        .route("/deliveries/:bid_id/deliver", post(mark_delivered))
        .route(
            "/deliveries/:bid_id/locations",
            get(list_locations).post(record_location),
        )
}

#[derive(Deserialize)]
pub struct LocationReport {
    pub location: GeoPoint,
    /// Device time of the fix; defaults to arrival time.
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
) -> Result<Json<DeliveryDetails>, AppError> {
    Ok(Json(state.deliveries.details(bid_id)?))
}

async fn mark_picked_up(
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
) -> Result<Json<DeliveryTracking>, AppError> {
    let transition = state.deliveries.mark_picked_up(bid_id, state.clock.now())?;
    Ok(Json(transition.into_inner()))
}

async fn mark_delivered(
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
) -> Result<Json<Delivered>, AppError> {
    Ok(Json(state.deliveries.mark_delivered(bid_id, state.clock.now())?))
}

async fn list_locations(
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
) -> Result<Json<Vec<DriverLocationUpdate>>, AppError> {
    Ok(Json(state.deliveries.locations(bid_id)?))
}

async fn record_location(
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
    Json(payload): Json<LocationReport>,
) -> Result<Json<DriverLocationUpdate>, AppError> {
    let recorded_at = payload.recorded_at.unwrap_or_else(|| state.clock.now());
    Ok(Json(
        state
            .deliveries
            .record_location(bid_id, payload.location, recorded_at)?,
    ))
}
