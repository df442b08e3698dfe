use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use super::routes::reject_pending;
use super::selection::{AcceptancePolicy, Candidate};
use super::Transition;
use crate::clock::Clock;
use crate::error::AppError;
use crate::models::bid::{Bid, BidStatus, NewBid};
use crate::models::event::{EntityKind, LifecycleEvent};
use crate::models::request::{NewParcelRequest, ParcelRequest, RequestStatus};
use crate::models::route::RouteStatus;
use crate::models::tracking::{DeliveryStatus, DeliveryTracking};
use crate::observability::events::Telemetry;
use crate::store::Store;

/// Parcel requests and the bids drivers place on them.
///
/// Every write to a request's bids happens under that request's row lock, so
/// placement, acceptance and rejection on one request serialize while
/// different requests proceed in parallel.
#[derive(Clone)]
pub struct BidLedger {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    closing_offset: Duration,
    telemetry: Telemetry,
}

struct Accepted {
    bid: Bid,
    request: ParcelRequest,
    tracking: DeliveryTracking,
    rejected: Vec<Uuid>,
}

impl BidLedger {
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

    pub fn create_request(&self, new_request: NewParcelRequest) -> Result<ParcelRequest, AppError> {
        let now = self.clock.now();
        validate_new_request(&new_request, now)?;

        let request = ParcelRequest {
            id: Uuid::new_v4(),
            customer_id: new_request.customer_id,
            pickup: new_request.pickup,
            dropoff: new_request.dropoff,
            weight_kg: new_request.weight_kg,
            volume_m3: new_request.volume_m3,
            max_budget: new_request.max_budget,
            deadline: new_request.deadline,
            description: new_request.description,
            status: RequestStatus::Open,
            matched_bid_id: None,
            created_at: now,
            updated_at: now,
        };

        self.store.requests.insert(request.id, request.clone());
        self.publish_request(&request);
        info!(
            request_id = %request.id,
            customer_id = %request.customer_id,
            deadline = %request.deadline,
            "parcel request created"
        );

        Ok(request)
    }

    pub fn request(&self, request_id: Uuid) -> Result<ParcelRequest, AppError> {
        self.store
            .request(request_id)
            .ok_or_else(|| request_not_found(request_id))
    }

    pub fn bid(&self, bid_id: Uuid) -> Result<Bid, AppError> {
        self.store.bid(bid_id).ok_or_else(|| bid_not_found(bid_id))
    }

    pub fn bids_for_request(&self, request_id: Uuid) -> Result<Vec<Bid>, AppError> {
        self.request(request_id)?;
        Ok(self.store.bids_for_request(request_id))
    }

    pub fn bids_for_route(
        &self,
        route_id: Uuid,
        status: Option<BidStatus>,
    ) -> Result<Vec<Bid>, AppError> {
        if self.store.route(route_id).is_none() {
            return Err(AppError::NotFound(format!("route {route_id} not found")));
        }
        Ok(self.store.bids_for_route(route_id, status))
    }

    pub fn place_bid(&self, new_bid: NewBid) -> Result<Bid, AppError> {
        self.try_place_bid(new_bid)
            .map_err(|err| self.telemetry.failed("place_bid", err))
    }

    fn try_place_bid(&self, new_bid: NewBid) -> Result<Bid, AppError> {
        if !new_bid.segment.is_well_formed() {
            return Err(AppError::BadRequest(format!(
                "segment start {} is after end {}",
                new_bid.segment.start_index, new_bid.segment.end_index
            )));
        }
        if new_bid.offered_price <= Decimal::ZERO {
            return Err(AppError::BadRequest("offered_price must be positive".to_string()));
        }

        let now = self.clock.now();
        let bid = {
            let request = self
                .store
                .requests
                .get_mut(&new_bid.request_id)
                .ok_or_else(|| request_not_found(new_bid.request_id))?;
            let route = self.store.routes.get(&new_bid.route_id).ok_or_else(|| {
                AppError::NotFound(format!("route {} not found", new_bid.route_id))
            })?;

            if request.status != RequestStatus::Open {
                return Err(AppError::InvalidState(format!(
                    "request {} is {}",
                    request.id, request.status
                )));
            }
            if !route.accepts_bids_at(now, self.closing_offset) {
                return Err(AppError::InvalidState(format!(
                    "route {} is not taking bids (status {}, window {} to {})",
                    route.id,
                    route.status,
                    route.bidding_start,
                    route.bidding_deadline(self.closing_offset)
                )));
            }

            let duplicate = self
                .store
                .bids_for_request(request.id)
                .into_iter()
                .any(|bid| bid.route_id == route.id && bid.status == BidStatus::Pending);
            if duplicate {
                return Err(AppError::InvalidState(format!(
                    "route {} already has a pending bid on request {}",
                    route.id, request.id
                )));
            }

            let bid = Bid {
                id: Uuid::new_v4(),
                request_id: request.id,
                route_id: route.id,
                segment: new_bid.segment,
                offered_price: new_bid.offered_price,
                status: BidStatus::Pending,
                created_at: now,
                updated_at: now,
            };
            self.store.bids.insert(bid.id, bid.clone());
            bid
        };

        self.publish_bid(&bid);
        info!(
            bid_id = %bid.id,
            request_id = %bid.request_id,
            route_id = %bid.route_id,
            price = %bid.offered_price,
            "bid placed"
        );

        Ok(bid)
    }

    /// PENDING -> ACCEPTED. Rejects every other pending bid on the request,
    /// matches the request and opens the delivery tracking in one step.
    pub fn accept_bid(&self, bid_id: Uuid) -> Result<Bid, AppError> {
        let accepted = self
            .try_accept(bid_id)
            .map_err(|err| self.telemetry.failed("accept_bid", err))?;

        let now = accepted.bid.updated_at;
        self.publish_bid(&accepted.bid);
        self.publish_rejections(&accepted.rejected, now);
        self.publish_request(&accepted.request);
        self.telemetry.publish(LifecycleEvent::new(
            EntityKind::Delivery,
            accepted.tracking.id,
            accepted.tracking.status.as_str(),
            now,
        ));
        info!(
            bid_id = %bid_id,
            request_id = %accepted.request.id,
            rejected_bids = accepted.rejected.len(),
            "bid accepted"
        );

        Ok(accepted.bid)
    }

    fn try_accept(&self, bid_id: Uuid) -> Result<Accepted, AppError> {
        let snapshot = self.store.bid(bid_id).ok_or_else(|| bid_not_found(bid_id))?;
        let request_id = snapshot.request_id;

        let seen = self.store.request(request_id).ok_or_else(|| {
            AppError::Inconsistent(format!("bid {bid_id} references missing request {request_id}"))
        })?;
        if seen.status == RequestStatus::Matched {
            return Err(AppError::InvalidState(format!(
                "request {request_id} is already matched"
            )));
        }

        self.commit_accept(&snapshot)
    }

    /// Second half of an acceptance: takes the request row lock and re-checks
    /// everything against the rows as they are now. A request matched since
    /// `snapshot` was read is a lost race.
    fn commit_accept(&self, snapshot: &Bid) -> Result<Accepted, AppError> {
        let now = self.clock.now();
        let bid_id = snapshot.id;
        let request_id = snapshot.request_id;

        let mut request = self.store.requests.get_mut(&request_id).ok_or_else(|| {
            AppError::Inconsistent(format!("bid {bid_id} references missing request {request_id}"))
        })?;
        match request.status {
            RequestStatus::Open => {}
            RequestStatus::Matched => {
                return Err(AppError::Conflict(format!(
                    "request {request_id} was matched by a concurrent acceptance"
                )));
            }
            other => {
                return Err(AppError::InvalidState(format!("request {request_id} is {other}")));
            }
        }

        let route = self.store.routes.get(&snapshot.route_id).ok_or_else(|| {
            AppError::Inconsistent(format!(
                "bid {bid_id} references missing route {}",
                snapshot.route_id
            ))
        })?;
        if matches!(route.status, RouteStatus::Cancelled | RouteStatus::Completed) {
            return Err(AppError::InvalidState(format!(
                "route {} is {}",
                route.id, route.status
            )));
        }
        if route.has_departed(now) {
            return Err(AppError::InvalidState(format!(
                "route {} departed at {}",
                route.id, route.departure_time
            )));
        }

        let bids = self.store.bids_for_request(request_id);
        let current = bids
            .iter()
            .find(|bid| bid.id == bid_id)
            .ok_or_else(|| bid_not_found(bid_id))?;
        if current.status != BidStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "bid {bid_id} is {}",
                current.status
            )));
        }
        if let Some(other) = bids.iter().find(|bid| bid.status == BidStatus::Accepted) {
            return Err(AppError::Inconsistent(format!(
                "open request {request_id} already has accepted bid {}",
                other.id
            )));
        }
        if self.store.tracking_by_bid.contains_key(&bid_id) {
            return Err(AppError::Inconsistent(format!(
                "pending bid {bid_id} already has a delivery tracking"
            )));
        }

        // Checks are done; everything below is written together.
        let bid = {
            let mut row = self.store.bids.get_mut(&bid_id).ok_or_else(|| bid_not_found(bid_id))?;
            row.status = BidStatus::Accepted;
            row.updated_at = now;
            row.clone()
        };

        let siblings = bids
            .iter()
            .filter(|bid| bid.id != bid_id && bid.status == BidStatus::Pending)
            .map(|bid| bid.id);
        let rejected = reject_pending(&self.store, siblings, now);

        request.status = RequestStatus::Matched;
        request.matched_bid_id = Some(bid_id);
        request.updated_at = now;

        let tracking = DeliveryTracking {
            id: Uuid::new_v4(),
            bid_id,
            status: DeliveryStatus::Created,
            estimated_arrival: Some(request.deadline),
            actual_pickup_time: None,
            actual_delivery_time: None,
            created_at: now,
            updated_at: now,
        };
        self.store.trackings.insert(tracking.id, tracking.clone());
        self.store.tracking_by_bid.insert(bid_id, tracking.id);

        Ok(Accepted {
            bid,
            request: request.clone(),
            tracking,
            rejected,
        })
    }

    /// PENDING -> REJECTED, refused once the route has departed.
    pub fn reject_bid(&self, bid_id: Uuid) -> Result<Bid, AppError> {
        let now = self.clock.now();
        let snapshot = self.bid(bid_id)?;

        let outcome = {
            let _request = self.store.requests.get_mut(&snapshot.request_id);
            let departed = self
                .store
                .route(snapshot.route_id)
                .is_none_or(|route| route.has_departed(now));
            let mut bid = self
                .store
                .bids
                .get_mut(&bid_id)
                .ok_or_else(|| bid_not_found(bid_id))?;

            if bid.status != BidStatus::Pending {
                Err(AppError::InvalidState(format!("bid {bid_id} is {}", bid.status)))
            } else if departed {
                Err(AppError::InvalidState(format!(
                    "route {} has departed",
                    snapshot.route_id
                )))
            } else {
                bid.status = BidStatus::Rejected;
                bid.updated_at = now;
                Ok(bid.clone())
            }
        };

        let rejected = outcome.map_err(|err| self.telemetry.failed("reject_bid", err))?;
        self.publish_bid(&rejected);
        info!(bid_id = %bid_id, "bid rejected");
        Ok(rejected)
    }

    /// Customer withdraws an OPEN request; its pending bids are rejected.
    pub fn cancel_request(&self, request_id: Uuid) -> Result<ParcelRequest, AppError> {
        let now = self.clock.now();
        let outcome = {
            let mut request = self
                .store
                .requests
                .get_mut(&request_id)
                .ok_or_else(|| request_not_found(request_id))?;

            if request.status != RequestStatus::Open {
                Err(AppError::InvalidState(format!(
                    "request {request_id} is {}",
                    request.status
                )))
            } else {
                let rejected = self.reject_pending_for(request_id, now);
                request.status = RequestStatus::Cancelled;
                request.updated_at = now;
                Ok((request.clone(), rejected))
            }
        };

        let (cancelled, rejected) =
            outcome.map_err(|err| self.telemetry.failed("cancel_request", err))?;
        self.publish_rejections(&rejected, now);
        self.publish_request(&cancelled);
        info!(request_id = %request_id, rejected_bids = rejected.len(), "request cancelled");
        Ok(cancelled)
    }

    /// OPEN -> EXPIRED once the request's deadline has passed without a match.
    pub fn expire_request_if_due(
        &self,
        request_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Transition<ParcelRequest>, AppError> {
        let (expired, rejected) = {
            let mut request = self.store.requests.get_mut(&request_id).ok_or_else(|| {
                self.telemetry
                    .failed("expire_request", request_not_found(request_id))
            })?;

            if request.status != RequestStatus::Open || now < request.deadline {
                return Ok(Transition::Unchanged(request.clone()));
            }
            let bids = self.store.bids_for_request(request_id);
            if bids.iter().any(|bid| bid.status == BidStatus::Accepted) {
                return Err(self.telemetry.failed(
                    "expire_request",
                    AppError::Inconsistent(format!(
                        "open request {request_id} has an accepted bid"
                    )),
                ));
            }

            let pending = bids
                .iter()
                .filter(|bid| bid.status == BidStatus::Pending)
                .map(|bid| bid.id);
            let rejected = reject_pending(&self.store, pending, now);
            request.status = RequestStatus::Expired;
            request.updated_at = now;
            (request.clone(), rejected)
        };

        self.publish_rejections(&rejected, now);
        self.publish_request(&expired);
        info!(request_id = %request_id, rejected_bids = rejected.len(), "request expired");
        Ok(Transition::Applied(expired))
    }

    /// OPEN requests past their deadline, earliest deadline first.
    pub fn requests_due_for_expiry(&self, now: DateTime<Utc>, limit: usize) -> Vec<ParcelRequest> {
        let mut requests: Vec<ParcelRequest> = self
            .store
            .requests
            .iter()
            .filter(|entry| entry.status == RequestStatus::Open && now >= entry.deadline)
            .map(|entry| entry.value().clone())
            .collect();
        requests.sort_by(|a, b| a.deadline.cmp(&b.deadline).then(a.id.cmp(&b.id)));
        requests.truncate(limit);
        requests
    }

    /// Accepts the winners the policy picks among the route's pending bids.
    /// A winner that lost a race or went stale is skipped.
    pub fn auto_accept(
        &self,
        route_id: Uuid,
        policy: &AcceptancePolicy,
    ) -> Result<Vec<Bid>, AppError> {
        let route = self
            .store
            .route(route_id)
            .ok_or_else(|| AppError::NotFound(format!("route {route_id} not found")))?;

        let candidates: Vec<Candidate> = self
            .store
            .bids_for_route(route_id, Some(BidStatus::Pending))
            .into_iter()
            .filter_map(|bid| {
                let request = self.store.request(bid.request_id)?;
                (request.status == RequestStatus::Open).then_some(Candidate { bid, request })
            })
            .collect();

        let mut accepted = Vec::new();
        for bid_id in policy.select(&route, &candidates) {
            match self.accept_bid(bid_id) {
                Ok(bid) => accepted.push(bid),
                Err(err @ (AppError::Conflict(_) | AppError::InvalidState(_))) => {
                    warn!(
                        route_id = %route_id,
                        bid_id = %bid_id,
                        error = %err,
                        "auto-accept skipped bid"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Ok(accepted)
    }

    fn reject_pending_for(&self, request_id: Uuid, now: DateTime<Utc>) -> Vec<Uuid> {
        let pending = self
            .store
            .bids_for_request(request_id)
            .into_iter()
            .filter(|bid| bid.status == BidStatus::Pending)
            .map(|bid| bid.id);
        reject_pending(&self.store, pending, now)
    }

    fn publish_bid(&self, bid: &Bid) {
        self.telemetry.publish(LifecycleEvent::new(
            EntityKind::Bid,
            bid.id,
            bid.status.as_str(),
            bid.updated_at,
        ));
    }

    fn publish_request(&self, request: &ParcelRequest) {
        self.telemetry.publish(LifecycleEvent::new(
            EntityKind::Request,
            request.id,
            request.status.as_str(),
            request.updated_at,
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

fn request_not_found(request_id: Uuid) -> AppError {
    AppError::NotFound(format!("request {request_id} not found"))
}

fn bid_not_found(bid_id: Uuid) -> AppError {
    AppError::NotFound(format!("bid {bid_id} not found"))
}

fn validate_new_request(
    new_request: &NewParcelRequest,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if !new_request.pickup.is_valid() || !new_request.dropoff.is_valid() {
        return Err(AppError::BadRequest(
            "pickup and dropoff must be valid coordinates".to_string(),
        ));
    }
    if new_request.weight_kg <= 0.0 || new_request.volume_m3 <= 0.0 {
        return Err(AppError::BadRequest(
            "weight_kg and volume_m3 must be positive".to_string(),
        ));
    }
    if new_request.max_budget <= Decimal::ZERO {
        return Err(AppError::BadRequest("max_budget must be positive".to_string()));
    }
    if new_request.deadline <= now {
        return Err(AppError::BadRequest("deadline must be in the future".to_string()));
    }
    Ok(())
}
