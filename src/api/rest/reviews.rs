use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::review::{NewReview, RatingStats, Review};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reviews", post(submit_review))
        .route("/reviews/:id", get(get_review))
        .route("/drivers/:id/reviews", get(driver_reviews))
        .route("/drivers/:id/rating", get(driver_rating))
}

async fn submit_review(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewReview>,
) -> Result<Json<Review>, AppError> {
    Ok(Json(state.reviews.submit_review(payload)?))
}

async fn get_review(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Review>, AppError> {
    Ok(Json(state.reviews.review(id)?))
}

async fn driver_reviews(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<Uuid>,
) -> Json<Vec<Review>> {
    Json(state.reviews.reviews_for_driver(driver_id))
}

async fn driver_rating(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<Uuid>,
) -> Json<RatingStats> {
    Json(state.reviews.rating_stats(driver_id))
}
