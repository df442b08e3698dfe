use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status_enum;

status_enum! {
    /// Who is writing the review.
    ReviewRole {
        Driver => "DRIVER",
        Customer => "CUSTOMER",
    }
}

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    /// The delivered bid the review is about.
    pub bid_id: Uuid,
    pub route_id: Uuid,
    pub reviewer_id: Uuid,
    pub reviewee_id: Uuid,
    pub role: ReviewRole,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    pub bid_id: Uuid,
    pub reviewer_id: Uuid,
    pub role: ReviewRole,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RatingStats {
    pub driver_id: Uuid,
    /// Rounded to one decimal place, `0.0` without reviews.
    pub average_rating: f64,
    pub total_reviews: usize,
    /// Count per star, every star from 1 to 5 present.
    pub rating_distribution: BTreeMap<u8, usize>,
}
