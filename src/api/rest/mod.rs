pub mod bids;
pub mod deliveries;
pub mod disputes;
pub mod earnings;
pub mod payments;
pub mod requests;
pub mod reviews;
pub mod routes;
pub mod withdrawals;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::store::TableCounts;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::router())
        .merge(requests::router())
        .merge(bids::router())
        .merge(deliveries::router())
        .merge(payments::router())
        .merge(earnings::router())
        .merge(withdrawals::router())
        .merge(disputes::router())
        .merge(reviews::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(flatten)]
    counts: TableCounts,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        counts: state.store.counts(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.telemetry.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
