use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::bid::{Bid, BidStatus};
use crate::models::route::{NewRoute, ReturnRoute};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/routes", post(open_route))
        .route("/routes/:id", get(get_route))
        .route("/routes/:id/bids", get(list_route_bids))
        .route("/routes/:id/close-bidding", post(close_bidding))
        .route("/routes/:id/cancel", post(cancel_route))
}

#[derive(Serialize)]
pub struct RouteView {
    #[serde(flatten)]
    pub route: ReturnRoute,
    pub bidding_deadline: DateTime<Utc>,
    pub accepting_bids: bool,
}

#[derive(Deserialize)]
pub struct BidFilter {
    pub status: Option<BidStatus>,
}

#[derive(Serialize)]
pub struct CloseBiddingResponse {
    pub route: ReturnRoute,
    pub accepted: Vec<Bid>,
}

fn view(state: &AppState, route: ReturnRoute) -> RouteView {
    let offset = state.routes.closing_offset();
    RouteView {
        bidding_deadline: route.bidding_deadline(offset),
        accepting_bids: route.accepts_bids_at(state.clock.now(), offset),
        route,
    }
}

async fn open_route(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewRoute>,
) -> Result<Json<RouteView>, AppError> {
    let route = state.routes.open_route(payload)?;
    Ok(Json(view(&state, route)))
}

async fn get_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RouteView>, AppError> {
    let route = state
        .store
        .route(id)
        .ok_or_else(|| AppError::NotFound(format!("route {id} not found")))?;

    Ok(Json(view(&state, route)))
}

async fn list_route_bids(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(filter): Query<BidFilter>,
) -> Result<Json<Vec<Bid>>, AppError> {
    Ok(Json(state.bids.bids_for_route(id, filter.status)?))
}

/// Closes the window now and runs auto-acceptance the same way the
/// scheduler does when the window closes on time.
async fn close_bidding(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CloseBiddingResponse>, AppError> {
    let transition = state.routes.force_close_bidding(id)?;
    let accepted = if transition.applied() {
        state.bids.auto_accept(id, &state.settings.acceptance)?
    } else {
        Vec::new()
    };

    Ok(Json(CloseBiddingResponse {
        route: transition.into_inner(),
        accepted,
    }))
}

async fn cancel_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReturnRoute>, AppError> {
    Ok(Json(state.routes.cancel_route(id)?))
}
