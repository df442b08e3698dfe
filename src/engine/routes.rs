use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use super::Transition;
use crate::clock::Clock;
use crate::error::AppError;
use crate::models::bid::BidStatus;
use crate::models::event::{EntityKind, LifecycleEvent};
use crate::models::route::{NewRoute, ReturnRoute, RouteStatus};
use crate::models::tracking::DeliveryStatus;
use crate::observability::events::Telemetry;
use crate::store::Store;

/// Owns a route's bidding window and its time-driven status changes.
#[derive(Clone)]
pub struct RouteWindowManager {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    closing_offset: Duration,
    telemetry: Telemetry,
}

impl RouteWindowManager {
    pub fn new(
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
        closing_offset: Duration,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            store,
            clock,
            closing_offset,
            telemetry,
        }
    }

    pub fn closing_offset(&self) -> Duration {
        self.closing_offset
    }

    pub fn open_route(&self, new_route: NewRoute) -> Result<ReturnRoute, AppError> {
        let now = self.clock.now();
        validate_new_route(&new_route)?;

        let bidding_start = new_route.bidding_start.unwrap_or(now);
        let deadline = new_route.departure_time - self.closing_offset;
        if deadline <= now {
            return Err(AppError::BadRequest(format!(
                "departure {} is too soon: bidding would already be closed",
                new_route.departure_time
            )));
        }
        if bidding_start >= deadline {
            return Err(AppError::BadRequest(format!(
                "bidding_start {bidding_start} must be before the bidding deadline {deadline}"
            )));
        }

        let route = ReturnRoute {
            id: Uuid::new_v4(),
            driver_id: new_route.driver_id,
            origin: new_route.origin,
            destination: new_route.destination,
            departure_time: new_route.departure_time,
            bidding_start,
            detour_tolerance_km: new_route.detour_tolerance_km,
            suggested_price_min: new_route.suggested_price_min,
            suggested_price_max: new_route.suggested_price_max,
            status: RouteStatus::Open,
            created_at: now,
            updated_at: now,
        };

        self.store.routes.insert(route.id, route.clone());
        self.publish(&route);
        info!(
            route_id = %route.id,
            driver_id = %route.driver_id,
            departure = %route.departure_time,
            "route opened for bidding"
        );

        Ok(route)
    }

    /// OPEN -> INITIATED once `now` has reached both the bidding start and
    /// `departure - closing_offset`.
    pub fn close_bidding_if_due(
        &self,
        route_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Transition<ReturnRoute>, AppError> {
        let closed = {
            let mut route = self.store.routes.get_mut(&route_id).ok_or_else(|| {
                self.telemetry.failed("close_bidding", route_not_found(route_id))
            })?;

            let due = route.status == RouteStatus::Open
                && now >= route.bidding_start
                && now >= route.bidding_deadline(self.closing_offset);
            if !due {
                return Ok(Transition::Unchanged(route.clone()));
            }

            route.status = RouteStatus::Initiated;
            route.updated_at = now;
            route.clone()
        };

        self.publish(&closed);
        info!(route_id = %route_id, "bidding window closed");
        Ok(Transition::Applied(closed))
    }

    /// Administrative close that ignores the clock.
    pub fn force_close_bidding(&self, route_id: Uuid) -> Result<Transition<ReturnRoute>, AppError> {
        let now = self.clock.now();
        let closed = {
            let mut route = self.store.routes.get_mut(&route_id).ok_or_else(|| {
                self.telemetry.failed("force_close_bidding", route_not_found(route_id))
            })?;

            match route.status {
                RouteStatus::Open => {}
                RouteStatus::Initiated => return Ok(Transition::Unchanged(route.clone())),
                other => {
                    return Err(self.telemetry.failed(
                        "force_close_bidding",
                        AppError::InvalidState(format!("route {route_id} is {other}")),
                    ));
                }
            }

            route.status = RouteStatus::Initiated;
            route.updated_at = now;
            route.clone()
        };

        self.publish(&closed);
        info!(route_id = %route_id, "bidding window closed manually");
        Ok(Transition::Applied(closed))
    }

    /// INITIATED -> BOOKED (some bid accepted) or CANCELLED (none) at departure.
    /// Bids still pending at departure are rejected.
    pub fn finalize_if_departed(
        &self,
        route_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Transition<ReturnRoute>, AppError> {
        let (finalized, rejected) = {
            let mut route = self.store.routes.get_mut(&route_id).ok_or_else(|| {
                self.telemetry.failed("finalize_route", route_not_found(route_id))
            })?;

            if route.status != RouteStatus::Initiated || !route.has_departed(now) {
                return Ok(Transition::Unchanged(route.clone()));
            }

            let bids = self.store.bids_for_route(route_id, None);
            let booked = bids.iter().any(|bid| bid.status == BidStatus::Accepted);
            let pending = bids
                .iter()
                .filter(|bid| bid.status == BidStatus::Pending)
                .map(|bid| bid.id);
            let rejected = reject_pending(&self.store, pending, now);

            route.status = if booked {
                RouteStatus::Booked
            } else {
                RouteStatus::Cancelled
            };
            route.updated_at = now;
            (route.clone(), rejected)
        };

        self.publish_rejections(&rejected, now);
        self.publish(&finalized);
        info!(
            route_id = %route_id,
            status = %finalized.status,
            rejected_bids = rejected.len(),
            "route finalized at departure"
        );
        Ok(Transition::Applied(finalized))
    }

    /// Driver withdraws a route before departure. Refused once a bid on it
    /// has been accepted.
    pub fn cancel_route(&self, route_id: Uuid) -> Result<ReturnRoute, AppError> {
        let now = self.clock.now();
        let outcome = {
            let mut route = self.store.routes.get_mut(&route_id).ok_or_else(|| {
                self.telemetry.failed("cancel_route", route_not_found(route_id))
            })?;

            let bids = self.store.bids_for_route(route_id, None);
            let refusal = if !matches!(route.status, RouteStatus::Open | RouteStatus::Initiated) {
                Some(format!("route {route_id} is {}", route.status))
            } else if route.has_departed(now) {
                Some(format!("route {route_id} has already departed"))
            } else if bids.iter().any(|bid| bid.status == BidStatus::Accepted) {
                Some(format!("route {route_id} already carries an accepted bid"))
            } else {
                None
            };

            match refusal {
                Some(reason) => Err(reason),
                None => {
                    let pending = bids
                        .iter()
                        .filter(|bid| bid.status == BidStatus::Pending)
                        .map(|bid| bid.id);
                    let rejected = reject_pending(&self.store, pending, now);
                    route.status = RouteStatus::Cancelled;
                    route.updated_at = now;
                    Ok((route.clone(), rejected))
                }
            }
        };

        let (cancelled, rejected) = outcome.map_err(|reason| {
            self.telemetry
                .failed("cancel_route", AppError::InvalidState(reason))
        })?;

        self.publish_rejections(&rejected, now);
        self.publish(&cancelled);
        info!(route_id = %route_id, rejected_bids = rejected.len(), "route cancelled");
        Ok(cancelled)
    }

    /// BOOKED -> COMPLETED once every accepted bid on the route is delivered.
    pub fn complete_if_fulfilled(
        &self,
        route_id: Uuid,
    ) -> Result<Transition<ReturnRoute>, AppError> {
        let now = self.clock.now();
        let completed = {
            let mut route = self.store.routes.get_mut(&route_id).ok_or_else(|| {
                self.telemetry.failed("complete_route", route_not_found(route_id))
            })?;

            if route.status != RouteStatus::Booked {
                return Ok(Transition::Unchanged(route.clone()));
            }

            let accepted = self.store.bids_for_route(route_id, Some(BidStatus::Accepted));
            let fulfilled = !accepted.is_empty()
                && accepted.iter().all(|bid| {
                    self.store
                        .tracking_for_bid(bid.id)
                        .is_some_and(|tracking| tracking.status == DeliveryStatus::Delivered)
                });
            if !fulfilled {
                return Ok(Transition::Unchanged(route.clone()));
            }

            route.status = RouteStatus::Completed;
            route.updated_at = now;
            route.clone()
        };

        self.publish(&completed);
        info!(route_id = %route_id, "route completed");
        Ok(Transition::Applied(completed))
    }

    /// OPEN routes whose window should be closed, earliest departure first.
    pub fn routes_due_for_closing(&self, now: DateTime<Utc>, limit: usize) -> Vec<ReturnRoute> {
        self.due_routes(limit, |route| {
            route.status == RouteStatus::Open
                && now >= route.bidding_start
                && now >= route.bidding_deadline(self.closing_offset)
        })
    }

    /// INITIATED routes past departure, earliest departure first.
    pub fn routes_due_for_finalizing(&self, now: DateTime<Utc>, limit: usize) -> Vec<ReturnRoute> {
        self.due_routes(limit, |route| {
            route.status == RouteStatus::Initiated && route.has_departed(now)
        })
    }

    fn due_routes(&self, limit: usize, due: impl Fn(&ReturnRoute) -> bool) -> Vec<ReturnRoute> {
        let mut routes: Vec<ReturnRoute> = self
            .store
            .routes
            .iter()
            .filter(|entry| due(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        routes.sort_by(|a, b| {
            a.departure_time
                .cmp(&b.departure_time)
                .then(a.id.cmp(&b.id))
        });
        routes.truncate(limit);
        routes
    }

    fn publish(&self, route: &ReturnRoute) {
        self.telemetry.publish(LifecycleEvent::new(
            EntityKind::Route,
            route.id,
            route.status.as_str(),
            route.updated_at,
        ));
    }

    fn publish_rejections(&self, rejected: &[Uuid], at: DateTime<Utc>) {
        for bid_id in rejected {
            self.telemetry.publish(LifecycleEvent::new(
                EntityKind::Bid,
                *bid_id,
                BidStatus::Rejected.as_str(),
                at,
            ));
        }
    }
}

/// Flips each still-PENDING bid to REJECTED and returns the ids it changed.
/// Callers hold the lock of the request or route the bids hang off.
pub(crate) fn reject_pending(
    store: &Store,
    bid_ids: impl IntoIterator<Item = Uuid>,
    now: DateTime<Utc>,
) -> Vec<Uuid> {
    let mut rejected = Vec::new();
    for bid_id in bid_ids {
        if let Some(mut bid) = store.bids.get_mut(&bid_id) {
            if bid.status == BidStatus::Pending {
                bid.status = BidStatus::Rejected;
                bid.updated_at = now;
                rejected.push(bid_id);
            }
        }
    }
    rejected
}

fn route_not_found(route_id: Uuid) -> AppError {
    AppError::NotFound(format!("route {route_id} not found"))
}

fn validate_new_route(new_route: &NewRoute) -> Result<(), AppError> {
    if !new_route.origin.is_valid() || !new_route.destination.is_valid() {
        return Err(AppError::BadRequest(
            "origin and destination must be valid coordinates".to_string(),
        ));
    }
    if new_route.detour_tolerance_km < Decimal::ZERO {
        return Err(AppError::BadRequest(
            "detour_tolerance_km must not be negative".to_string(),
        ));
    }
    if new_route.suggested_price_min < Decimal::ZERO
        || new_route.suggested_price_min > new_route.suggested_price_max
    {
        return Err(AppError::BadRequest(
            "suggested price range must satisfy 0 <= min <= max".to_string(),
        ));
    }
    Ok(())
}
