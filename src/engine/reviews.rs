use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::event::{EntityKind, LifecycleEvent};
use crate::models::review::{MAX_RATING, MIN_RATING, NewReview, RatingStats, Review, ReviewRole};
use crate::models::tracking::DeliveryStatus;
use crate::observability::events::Telemetry;
use crate::store::Store;

/// Ratings the two sides of a delivered trip leave each other.
#[derive(Clone)]
pub struct ReviewBook {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    telemetry: Telemetry,
}

impl ReviewBook {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, telemetry: Telemetry) -> Self {
        Self {
            store,
            clock,
            telemetry,
        }
    }

    pub fn review(&self, review_id: Uuid) -> Result<Review, AppError> {
        self.store
            .review(review_id)
            .ok_or_else(|| AppError::NotFound(format!("review {review_id} not found")))
    }

    /// One review per reviewer per delivered trip. A customer reviews the
    /// route's driver and the driver reviews the request's customer.
    pub fn submit_review(&self, new_review: NewReview) -> Result<Review, AppError> {
        if !(MIN_RATING..=MAX_RATING).contains(&new_review.rating) {
            return Err(AppError::BadRequest(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }

        let bid_id = new_review.bid_id;
        let bid = self
            .store
            .bid(bid_id)
            .ok_or_else(|| AppError::NotFound(format!("bid {bid_id} not found")))?;
        let delivered = self
            .store
            .tracking_for_bid(bid_id)
            .is_some_and(|tracking| tracking.status == DeliveryStatus::Delivered);
        if !delivered {
            return Err(self.telemetry.failed(
                "submit_review",
                AppError::InvalidState(format!("trip for bid {bid_id} has not been delivered")),
            ));
        }

        let customer_id = self
            .store
            .request(bid.request_id)
            .map(|request| request.customer_id)
            .ok_or_else(|| {
                self.telemetry.failed(
                    "submit_review",
                    AppError::Inconsistent(format!("bid {bid_id} has no request")),
                )
            })?;
        let driver_id = self
            .store
            .route(bid.route_id)
            .map(|route| route.driver_id)
            .ok_or_else(|| {
                self.telemetry.failed(
                    "submit_review",
                    AppError::Inconsistent(format!("bid {bid_id} has no route")),
                )
            })?;

        let (expected_reviewer, reviewee_id) = match new_review.role {
            ReviewRole::Customer => (customer_id, driver_id),
            ReviewRole::Driver => (driver_id, customer_id),
        };
        if new_review.reviewer_id != expected_reviewer {
            return Err(AppError::BadRequest(format!(
                "{} is not the {} on bid {bid_id}",
                new_review.reviewer_id, new_review.role
            )));
        }

        let comment = new_review
            .comment
            .map(|comment| comment.trim().to_string())
            .filter(|comment| !comment.is_empty());

        let review = match self
            .store
            .review_by_trip
            .entry((bid_id, new_review.reviewer_id))
        {
            Entry::Occupied(existing) => {
                return Err(self.telemetry.failed(
                    "submit_review",
                    AppError::InvalidState(format!(
                        "{} already reviewed bid {bid_id} in review {}",
                        new_review.reviewer_id,
                        existing.get()
                    )),
                ));
            }
            Entry::Vacant(slot) => {
                let review = Review {
                    id: Uuid::new_v4(),
                    bid_id,
                    route_id: bid.route_id,
                    reviewer_id: new_review.reviewer_id,
                    reviewee_id,
                    role: new_review.role,
                    rating: new_review.rating,
                    comment,
                    created_at: self.clock.now(),
                };
                self.store.reviews.insert(review.id, review.clone());
                slot.insert(review.id);
                review
            }
        };

        self.telemetry.publish(LifecycleEvent::new(
            EntityKind::Review,
            review.id,
            review.role.as_str(),
            review.created_at,
        ));
        info!(
            review_id = %review.id,
            bid_id = %bid_id,
            role = %review.role,
            rating = review.rating,
            "review submitted"
        );
        Ok(review)
    }

    pub fn has_reviewed(&self, bid_id: Uuid, reviewer_id: Uuid) -> bool {
        self.store.review_by_trip.contains_key(&(bid_id, reviewer_id))
    }

    /// Customer reviews of a driver, newest first.
    pub fn reviews_for_driver(&self, driver_id: Uuid) -> Vec<Review> {
        let mut reviews: Vec<Review> = self
            .store
            .reviews
            .iter()
            .filter(|entry| entry.reviewee_id == driver_id && entry.role == ReviewRole::Customer)
            .map(|entry| entry.value().clone())
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        reviews
    }

    pub fn rating_stats(&self, driver_id: Uuid) -> RatingStats {
        let reviews = self.reviews_for_driver(driver_id);
        let mut rating_distribution: BTreeMap<u8, usize> =
            (MIN_RATING..=MAX_RATING).map(|star| (star, 0)).collect();
        for review in &reviews {
            *rating_distribution.entry(review.rating).or_default() += 1;
        }

        let average_rating = if reviews.is_empty() {
            0.0
        } else {
            let total: u32 = reviews.iter().map(|review| u32::from(review.rating)).sum();
            let mean = f64::from(total) / reviews.len() as f64;
            (mean * 10.0).round() / 10.0
        };

        RatingStats {
            driver_id,
            average_rating,
            total_reviews: reviews.len(),
            rating_distribution,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use crate::engine::fixtures::Harness;
    use crate::error::AppError;
    use crate::models::bid::Bid;
    use crate::models::review::{NewReview, ReviewRole};

    struct Trip {
        bid: Bid,
        customer_id: Uuid,
        driver_id: Uuid,
    }

    fn delivered_trip(h: &Harness) -> Trip {
        let bid = h.delivered_bid(Decimal::from(100));
        Trip {
            customer_id: h.state.store.request(bid.request_id).unwrap().customer_id,
            driver_id: h.state.store.route(bid.route_id).unwrap().driver_id,
            bid,
        }
    }

    fn review(bid_id: Uuid, reviewer_id: Uuid, role: ReviewRole, rating: u8) -> NewReview {
        NewReview {
            bid_id,
            reviewer_id,
            role,
            rating,
            comment: Some(" on time ".to_string()),
        }
    }

    #[test]
    fn each_side_reviews_a_trip_once() {
        let h = Harness::new();
        let trip = delivered_trip(&h);

        let by_customer = h
            .state
            .reviews
            .submit_review(review(trip.bid.id, trip.customer_id, ReviewRole::Customer, 5))
            .unwrap();
        assert_eq!(by_customer.reviewee_id, trip.driver_id);
        assert_eq!(by_customer.comment.as_deref(), Some("on time"));

        let by_driver = h
            .state
            .reviews
            .submit_review(review(trip.bid.id, trip.driver_id, ReviewRole::Driver, 4))
            .unwrap();
        assert_eq!(by_driver.reviewee_id, trip.customer_id);

        let twice = h
            .state
            .reviews
            .submit_review(review(trip.bid.id, trip.customer_id, ReviewRole::Customer, 1));
        assert!(matches!(twice, Err(AppError::InvalidState(_))));
        assert!(h.state.reviews.has_reviewed(trip.bid.id, trip.customer_id));
        assert_eq!(h.state.store.counts().reviews, 2);
    }

    #[test]
    fn undelivered_trips_cannot_be_reviewed() {
        let h = Harness::new();
        let bid = h.accepted_bid(Decimal::from(100));
        let customer = h.state.store.request(bid.request_id).unwrap().customer_id;

        let err = h
            .state
            .reviews
            .submit_review(review(bid.id, customer, ReviewRole::Customer, 5))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn reviewer_must_be_a_party_and_rating_in_range() {
        let h = Harness::new();
        let trip = delivered_trip(&h);

        let stranger = h.state.reviews.submit_review(review(
            trip.bid.id,
            Uuid::new_v4(),
            ReviewRole::Customer,
            5,
        ));
        assert!(matches!(stranger, Err(AppError::BadRequest(_))));

        let wrong_role = h.state.reviews.submit_review(review(
            trip.bid.id,
            trip.customer_id,
            ReviewRole::Driver,
            5,
        ));
        assert!(matches!(wrong_role, Err(AppError::BadRequest(_))));

        for rating in [0, 6] {
            let out_of_range = h.state.reviews.submit_review(review(
                trip.bid.id,
                trip.customer_id,
                ReviewRole::Customer,
                rating,
            ));
            assert!(matches!(out_of_range, Err(AppError::BadRequest(_))));
        }
        assert_eq!(h.state.store.counts().reviews, 0);
    }

    #[test]
    fn driver_stats_count_customer_reviews_only() {
        let h = Harness::new();
        let first = delivered_trip(&h);
        let driver = first.driver_id;

        let stats = h.state.reviews.rating_stats(driver);
        assert_eq!(stats.total_reviews, 0);
        assert_eq!(stats.average_rating, 0.0);
        assert_eq!(stats.rating_distribution.len(), 5);

        h.state
            .reviews
            .submit_review(review(first.bid.id, first.customer_id, ReviewRole::Customer, 5))
            .unwrap();
        h.state
            .reviews
            .submit_review(review(first.bid.id, driver, ReviewRole::Driver, 1))
            .unwrap();

        // Second and third trips on the same driver's route.
        let route = h.state.store.route(first.bid.route_id).unwrap();
        for rating in [4, 4] {
            let request = h.request();
            let bid = h.bid(request.id, route.id, Decimal::from(60));
            h.state.bids.accept_bid(bid.id).unwrap();
            h.state.deliveries.mark_picked_up(bid.id, h.now()).unwrap();
            h.state.deliveries.mark_delivered(bid.id, h.now()).unwrap();
            h.state
                .reviews
                .submit_review(review(bid.id, request.customer_id, ReviewRole::Customer, rating))
                .unwrap();
        }

        let stats = h.state.reviews.rating_stats(driver);
        assert_eq!(stats.total_reviews, 3);
        assert_eq!(stats.average_rating, 4.3);
        assert_eq!(stats.rating_distribution[&4], 2);
        assert_eq!(stats.rating_distribution[&5], 1);
        assert_eq!(stats.rating_distribution[&1], 0);
        assert_eq!(h.state.reviews.reviews_for_driver(driver).len(), 3);
    }
}
