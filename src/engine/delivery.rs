use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::routes::RouteWindowManager;
use super::settlement::SettlementTrigger;
use super::Transition;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::earnings::Earnings;
use crate::models::event::{EntityKind, LifecycleEvent};
use crate::models::tracking::{DeliveryStatus, DeliveryTracking, DriverLocationUpdate};
use crate::observability::events::Telemetry;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct Delivered {
    pub tracking: DeliveryTracking,
    /// Empty while the payment for the bid is not completed.
    pub earnings: Option<Earnings>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryDetails {
    pub tracking: DeliveryTracking,
    pub latest_location: Option<DriverLocationUpdate>,
    pub location_updates: usize,
    pub payment_completed: bool,
    pub delivery_minutes: Option<i64>,
    pub earnings: Option<Earnings>,
}

/// `created -> picked_up -> delivered` for accepted bids, plus the driver's
/// location trail while the parcel is on the way.
#[derive(Clone)]
pub struct DeliveryTracker {
    store: Arc<Store>,
    settlement: SettlementTrigger,
    routes: RouteWindowManager,
    telemetry: Telemetry,
}

impl DeliveryTracker {
    pub fn new(
        store: Arc<Store>,
        settlement: SettlementTrigger,
        routes: RouteWindowManager,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            store,
            settlement,
            routes,
            telemetry,
        }
    }

    pub fn tracking(&self, bid_id: Uuid) -> Result<DeliveryTracking, AppError> {
        self.store
            .tracking_for_bid(bid_id)
            .ok_or_else(|| tracking_not_found(bid_id))
    }

    /// `created -> picked_up`. Any later call returns the stored row.
    pub fn mark_picked_up(
        &self,
        bid_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Transition<DeliveryTracking>, AppError> {
        let tracking_id = self.tracking_id(bid_id, "mark_picked_up")?;

        let picked_up = {
            let mut tracking = self.store.trackings.get_mut(&tracking_id).ok_or_else(|| {
                self.telemetry.failed("mark_picked_up", dangling_index(bid_id))
            })?;

            if tracking.status != DeliveryStatus::Created {
                return Ok(Transition::Unchanged(tracking.clone()));
            }

            tracking.status = DeliveryStatus::PickedUp;
            tracking.actual_pickup_time.get_or_insert(now);
            tracking.updated_at = now;
            tracking.clone()
        };

        self.publish(&picked_up);
        info!(bid_id = %bid_id, "parcel picked up");
        Ok(Transition::Applied(picked_up))
    }

    /// `picked_up -> delivered`, then settles the bid if its payment is in
    /// and completes the route once every parcel on it is delivered.
    pub fn mark_delivered(&self, bid_id: Uuid, now: DateTime<Utc>) -> Result<Delivered, AppError> {
        let tracking_id = self.tracking_id(bid_id, "mark_delivered")?;
        let route_id = self
            .store
            .bid(bid_id)
            .and_then(|bid| self.store.route(bid.route_id))
            .map(|route| route.id)
            .ok_or_else(|| {
                self.telemetry.failed(
                    "mark_delivered",
                    AppError::Inconsistent(format!("tracked bid {bid_id} has no route")),
                )
            })?;
        // Past this check, settlement and route completion after the write
        // can only apply or defer.
        self.settlement.preflight(bid_id)?;

        let delivered = {
            let mut tracking = self.store.trackings.get_mut(&tracking_id).ok_or_else(|| {
                self.telemetry.failed("mark_delivered", dangling_index(bid_id))
            })?;

            match tracking.status {
                DeliveryStatus::Created => {
                    return Err(self.telemetry.failed(
                        "mark_delivered",
                        AppError::InvalidState(format!(
                            "parcel for bid {bid_id} has not been picked up"
                        )),
                    ));
                }
                DeliveryStatus::Delivered => {
                    let tracking = tracking.clone();
                    return Ok(Delivered {
                        tracking,
                        earnings: self.store.earnings_for_bid(bid_id),
                    });
                }
                DeliveryStatus::PickedUp => {}
            }

            tracking.status = DeliveryStatus::Delivered;
            tracking.actual_delivery_time.get_or_insert(now);
            tracking.updated_at = now;
            tracking.clone()
        };

        self.publish(&delivered);
        info!(bid_id = %bid_id, "parcel delivered");

        let earnings = self.settlement.settle_if_ready(bid_id)?;
        self.routes.complete_if_fulfilled(route_id)?;

        Ok(Delivered {
            tracking: delivered,
            earnings,
        })
    }

    /// Appends a location fix. The trail stays ordered by `recorded_at`;
    /// fixes with the same instant keep their arrival order.
    pub fn record_location(
        &self,
        bid_id: Uuid,
        location: GeoPoint,
        recorded_at: DateTime<Utc>,
    ) -> Result<DriverLocationUpdate, AppError> {
        if !location.is_valid() {
            return Err(AppError::BadRequest(format!(
                "invalid coordinates: {}, {}",
                location.lat, location.lng
            )));
        }

        let tracking_id = self.tracking_id(bid_id, "record_location")?;
        let update = {
            let tracking = self.store.trackings.get(&tracking_id).ok_or_else(|| {
                self.telemetry.failed("record_location", dangling_index(bid_id))
            })?;
            if tracking.status.is_terminal() {
                return Err(self.telemetry.failed(
                    "record_location",
                    AppError::InvalidState(format!("delivery for bid {bid_id} is complete")),
                ));
            }

            let mut trail = self.store.locations.entry(tracking_id).or_default();
            let update = DriverLocationUpdate {
                id: Uuid::new_v4(),
                tracking_id,
                location,
                recorded_at,
                sequence: trail.len() as u64,
            };
            let at = trail.partition_point(|existing| existing.recorded_at <= recorded_at);
            trail.insert(at, update.clone());
            update
        };

        debug!(
            bid_id = %bid_id,
            lat = update.location.lat,
            lng = update.location.lng,
            "driver location recorded"
        );
        Ok(update)
    }

    pub fn locations(&self, bid_id: Uuid) -> Result<Vec<DriverLocationUpdate>, AppError> {
        let tracking = self.tracking(bid_id)?;
        Ok(self.store.locations_for_tracking(tracking.id))
    }

    pub fn details(&self, bid_id: Uuid) -> Result<DeliveryDetails, AppError> {
        let tracking = self.tracking(bid_id)?;
        let trail = self.store.locations_for_tracking(tracking.id);
        let payment_completed = self.store.completed_payment_for_bid(bid_id).is_some();
        let delivery_minutes = match (tracking.actual_pickup_time, tracking.actual_delivery_time) {
            (Some(pickup), Some(delivery)) => Some((delivery - pickup).num_minutes()),
            _ => None,
        };

        Ok(DeliveryDetails {
            latest_location: trail.last().cloned(),
            location_updates: trail.len(),
            payment_completed,
            delivery_minutes,
            earnings: self.store.earnings_for_bid(bid_id),
            tracking,
        })
    }

    fn tracking_id(&self, bid_id: Uuid, operation: &'static str) -> Result<Uuid, AppError> {
        self.store
            .tracking_by_bid
            .get(&bid_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| self.telemetry.failed(operation, tracking_not_found(bid_id)))
    }

    fn publish(&self, tracking: &DeliveryTracking) {
        self.telemetry.publish(LifecycleEvent::new(
            EntityKind::Delivery,
            tracking.id,
            tracking.status.as_str(),
            tracking.updated_at,
        ));
    }
}

fn tracking_not_found(bid_id: Uuid) -> AppError {
    AppError::NotFound(format!("no delivery tracking for bid {bid_id}"))
}

fn dangling_index(bid_id: Uuid) -> AppError {
    AppError::Inconsistent(format!("tracking index for bid {bid_id} is dangling"))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rust_decimal::Decimal;

    use crate::engine::fixtures::Harness;
    use crate::error::AppError;
    use crate::geo::GeoPoint;
    use crate::models::route::RouteStatus;
    use crate::models::tracking::DeliveryStatus;

    fn point(lat: f64) -> GeoPoint {
        GeoPoint { lat, lng: 80.0 }
    }

    #[test]
    fn delivery_without_pickup_is_refused() {
        let h = Harness::new();
        let bid = h.accepted_bid(Decimal::from(100));

        let err = h.state.deliveries.mark_delivered(bid.id, h.now()).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let tracking = h.state.store.tracking_for_bid(bid.id).unwrap();
        assert_eq!(tracking.status, DeliveryStatus::Created);
        assert!(tracking.actual_pickup_time.is_none());
    }

    #[test]
    fn pickup_then_delivery_settles_exactly_once() {
        let h = Harness::new();
        let bid = h.accepted_bid(Decimal::from(100));
        let payment = h.pay(bid.id, Decimal::from(100));
        h.complete_payment(payment.id);
        assert_eq!(h.state.store.counts().earnings, 0);

        let picked_at = h.now() + Duration::minutes(10);
        let delivered_at = h.now() + Duration::minutes(55);
        h.state.deliveries.mark_picked_up(bid.id, picked_at).unwrap();
        let first = h.state.deliveries.mark_delivered(bid.id, delivered_at).unwrap();
        let second = h
            .state
            .deliveries
            .mark_delivered(bid.id, delivered_at + Duration::hours(1))
            .unwrap();

        assert_eq!(first.tracking.actual_delivery_time, Some(delivered_at));
        assert_eq!(second.tracking.actual_delivery_time, Some(delivered_at));
        let earnings = first.earnings.unwrap();
        assert_eq!(second.earnings.unwrap().id, earnings.id);
        assert_eq!(earnings.net_amount, Decimal::from(90));
        assert_eq!(h.state.store.counts().earnings, 1);

        let details = h.state.deliveries.details(bid.id).unwrap();
        assert_eq!(details.delivery_minutes, Some(45));
        assert!(details.payment_completed);
    }

    #[test]
    fn repeated_pickup_keeps_the_first_time() {
        let h = Harness::new();
        let bid = h.accepted_bid(Decimal::from(40));

        let first = h.state.deliveries.mark_picked_up(bid.id, h.now()).unwrap();
        assert!(first.applied());
        let again = h
            .state
            .deliveries
            .mark_picked_up(bid.id, h.now() + Duration::minutes(3))
            .unwrap();
        assert!(!again.applied());
        assert_eq!(again.into_inner().actual_pickup_time, Some(h.now()));
    }

    #[test]
    fn location_trail_is_ordered_and_closes_on_delivery() {
        let h = Harness::new();
        let bid = h.accepted_bid(Decimal::from(40));
        h.state.deliveries.mark_picked_up(bid.id, h.now()).unwrap();

        let t1 = h.now() + Duration::minutes(1);
        let t2 = h.now() + Duration::minutes(2);
        let late = h.state.deliveries.record_location(bid.id, point(7.0), t2).unwrap();
        let early = h.state.deliveries.record_location(bid.id, point(6.9), t1).unwrap();
        let tie = h.state.deliveries.record_location(bid.id, point(7.1), t2).unwrap();

        let ids: Vec<_> = h
            .state
            .deliveries
            .locations(bid.id)
            .unwrap()
            .into_iter()
            .map(|update| update.id)
            .collect();
        assert_eq!(ids, vec![early.id, late.id, tie.id]);
        assert_eq!(tie.sequence, 2);

        let bad = h.state.deliveries.record_location(bid.id, point(123.0), t2);
        assert!(matches!(bad, Err(AppError::BadRequest(_))));

        h.state.deliveries.mark_delivered(bid.id, t2).unwrap();
        let closed = h.state.deliveries.record_location(bid.id, point(7.2), t2);
        assert!(matches!(closed, Err(AppError::InvalidState(_))));

        let details = h.state.deliveries.details(bid.id).unwrap();
        assert_eq!(details.location_updates, 3);
        assert_eq!(details.latest_location.unwrap().id, tie.id);
    }

    #[test]
    fn last_delivery_completes_a_booked_route() {
        let h = Harness::new();
        let bid = h.accepted_bid(Decimal::from(100));
        let route = h.state.store.route(bid.route_id).unwrap();

        h.state.routes.force_close_bidding(route.id).unwrap();
        h.state
            .routes
            .finalize_if_departed(route.id, route.departure_time)
            .unwrap();
        h.clock.set(route.departure_time + Duration::minutes(30));

        let at = h.now();
        h.state.deliveries.mark_picked_up(bid.id, at).unwrap();
        h.state.deliveries.mark_delivered(bid.id, at).unwrap();

        assert_eq!(
            h.state.store.route(route.id).unwrap().status,
            RouteStatus::Completed
        );
    }

    #[test]
    fn broken_settlement_index_leaves_the_parcel_picked_up() {
        let h = Harness::new();
        let bid = h.accepted_bid(Decimal::from(100));
        h.state.deliveries.mark_picked_up(bid.id, h.now()).unwrap();
        h.state
            .store
            .earnings_by_bid
            .insert(bid.id, uuid::Uuid::new_v4());

        let err = h.state.deliveries.mark_delivered(bid.id, h.now()).unwrap_err();
        assert!(matches!(err, AppError::Inconsistent(_)));

        let tracking = h.state.store.tracking_for_bid(bid.id).unwrap();
        assert_eq!(tracking.status, DeliveryStatus::PickedUp);
        assert!(tracking.actual_delivery_time.is_none());
    }

    #[test]
    fn unknown_bid_has_no_tracking() {
        let h = Harness::new();
        let err = h.state.deliveries.details(uuid::Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
