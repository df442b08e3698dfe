use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::dispute::{Dispute, DisputeFilter, DisputeStatus, NewDispute};
use crate::models::event::{EntityKind, LifecycleEvent};
use crate::observability::events::Telemetry;
use crate::store::Store;

/// Complaints raised against a bid, a route, or both.
#[derive(Clone)]
pub struct DisputeDesk {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    telemetry: Telemetry,
}

impl DisputeDesk {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, telemetry: Telemetry) -> Self {
        Self {
            store,
            clock,
            telemetry,
        }
    }

    pub fn dispute(&self, dispute_id: Uuid) -> Result<Dispute, AppError> {
        self.store
            .dispute(dispute_id)
            .ok_or_else(|| dispute_not_found(dispute_id))
    }

    /// Opens a dispute. A bid-only dispute is also filed under the bid's route.
    pub fn open_dispute(&self, new_dispute: NewDispute) -> Result<Dispute, AppError> {
        let description = new_dispute.description.trim();
        if description.is_empty() {
            return Err(AppError::BadRequest("description must not be empty".to_string()));
        }

        let route_id = match (new_dispute.bid_id, new_dispute.route_id) {
            (None, None) => {
                return Err(AppError::BadRequest(
                    "a dispute must name a bid or a route".to_string(),
                ));
            }
            (Some(bid_id), named_route) => {
                let bid = self
                    .store
                    .bid(bid_id)
                    .ok_or_else(|| AppError::NotFound(format!("bid {bid_id} not found")))?;
                if named_route.is_some_and(|route_id| route_id != bid.route_id) {
                    return Err(AppError::BadRequest(format!(
                        "bid {bid_id} belongs to route {}",
                        bid.route_id
                    )));
                }
                bid.route_id
            }
            (None, Some(route_id)) => {
                if self.store.route(route_id).is_none() {
                    return Err(AppError::NotFound(format!("route {route_id} not found")));
                }
                route_id
            }
        };

        let now = self.clock.now();
        let dispute = Dispute {
            id: Uuid::new_v4(),
            user_id: new_dispute.user_id,
            bid_id: new_dispute.bid_id,
            route_id: Some(route_id),
            description: description.to_string(),
            status: DisputeStatus::Open,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };

        self.store.disputes.insert(dispute.id, dispute.clone());
        self.publish(&dispute);
        info!(
            dispute_id = %dispute.id,
            user_id = %dispute.user_id,
            route_id = %route_id,
            "dispute opened"
        );
        Ok(dispute)
    }

    /// OPEN -> RESOLVED | CLOSED, RESOLVED -> CLOSED. The first move out of
    /// OPEN stamps `resolved_at`.
    pub fn update_status(
        &self,
        dispute_id: Uuid,
        status: DisputeStatus,
    ) -> Result<Dispute, AppError> {
        let now = self.clock.now();
        let updated = {
            let mut dispute = self
                .store
                .disputes
                .get_mut(&dispute_id)
                .ok_or_else(|| dispute_not_found(dispute_id))?;

            if !dispute.status.can_transition_to(status) {
                return Err(self.telemetry.failed(
                    "update_dispute",
                    AppError::InvalidState(format!(
                        "dispute {dispute_id} cannot move from {} to {status}",
                        dispute.status
                    )),
                ));
            }

            dispute.status = status;
            dispute.resolved_at.get_or_insert(now);
            dispute.updated_at = now;
            dispute.clone()
        };

        self.publish(&updated);
        info!(dispute_id = %dispute_id, status = %updated.status, "dispute status updated");
        Ok(updated)
    }

    /// Disputes matching `filter`, newest first.
    pub fn list(&self, filter: &DisputeFilter) -> Vec<Dispute> {
        let mut disputes: Vec<Dispute> = self
            .store
            .disputes
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        disputes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        disputes
    }

    fn publish(&self, dispute: &Dispute) {
        self.telemetry.publish(LifecycleEvent::new(
            EntityKind::Dispute,
            dispute.id,
            dispute.status.as_str(),
            dispute.updated_at,
        ));
    }
}

fn dispute_not_found(dispute_id: Uuid) -> AppError {
    AppError::NotFound(format!("dispute {dispute_id} not found"))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use crate::engine::fixtures::Harness;
    use crate::error::AppError;
    use crate::models::dispute::{DisputeFilter, DisputeStatus, NewDispute};

    fn about(user_id: Uuid, bid_id: Option<Uuid>, route_id: Option<Uuid>) -> NewDispute {
        NewDispute {
            user_id,
            bid_id,
            route_id,
            description: "  parcel arrived damaged  ".to_string(),
        }
    }

    #[test]
    fn bid_disputes_are_filed_under_the_route() {
        let h = Harness::new();
        let bid = h.accepted_bid(Decimal::from(90));
        let customer = h.state.store.request(bid.request_id).unwrap().customer_id;

        let dispute = h
            .state
            .disputes
            .open_dispute(about(customer, Some(bid.id), None))
            .unwrap();

        assert_eq!(dispute.status, DisputeStatus::Open);
        assert_eq!(dispute.route_id, Some(bid.route_id));
        assert_eq!(dispute.description, "parcel arrived damaged");
        assert!(dispute.resolved_at.is_none());
    }

    #[test]
    fn disputes_need_a_known_subject() {
        let h = Harness::new();
        let bid = h.accepted_bid(Decimal::from(90));
        let user = Uuid::new_v4();

        let nothing = h.state.disputes.open_dispute(about(user, None, None));
        assert!(matches!(nothing, Err(AppError::BadRequest(_))));

        let unknown = h
            .state
            .disputes
            .open_dispute(about(user, None, Some(Uuid::new_v4())));
        assert!(matches!(unknown, Err(AppError::NotFound(_))));

        let mismatched = h
            .state
            .disputes
            .open_dispute(about(user, Some(bid.id), Some(Uuid::new_v4())));
        assert!(matches!(mismatched, Err(AppError::BadRequest(_))));

        let mut blank = about(user, Some(bid.id), None);
        blank.description = "   ".to_string();
        let blank = h.state.disputes.open_dispute(blank);
        assert!(matches!(blank, Err(AppError::BadRequest(_))));
        assert_eq!(h.state.store.counts().disputes, 0);
    }

    #[test]
    fn resolution_is_stamped_once() {
        let h = Harness::new();
        let route = h.route_departing(h.now() + Duration::hours(24));
        let dispute = h
            .state
            .disputes
            .open_dispute(about(route.driver_id, None, Some(route.id)))
            .unwrap();

        h.clock.advance(Duration::hours(1));
        let resolved = h
            .state
            .disputes
            .update_status(dispute.id, DisputeStatus::Resolved)
            .unwrap();
        assert_eq!(resolved.resolved_at, Some(h.now()));

        h.clock.advance(Duration::hours(1));
        let closed = h
            .state
            .disputes
            .update_status(dispute.id, DisputeStatus::Closed)
            .unwrap();
        assert_eq!(closed.resolved_at, resolved.resolved_at);

        let reopen = h.state.disputes.update_status(dispute.id, DisputeStatus::Open);
        assert!(matches!(reopen, Err(AppError::InvalidState(_))));
    }

    #[test]
    fn listing_filters_by_user_bid_route_and_status() {
        let h = Harness::new();
        let bid = h.accepted_bid(Decimal::from(90));
        let other_route = h.route_departing(h.now() + Duration::hours(30));
        let customer = Uuid::new_v4();
        let driver = Uuid::new_v4();

        let on_bid = h
            .state
            .disputes
            .open_dispute(about(customer, Some(bid.id), None))
            .unwrap();
        h.clock.advance(Duration::minutes(1));
        let on_route = h
            .state
            .disputes
            .open_dispute(about(driver, None, Some(other_route.id)))
            .unwrap();
        h.clock.advance(Duration::minutes(1));
        let second_on_bid = h
            .state
            .disputes
            .open_dispute(about(driver, Some(bid.id), None))
            .unwrap();
        h.state
            .disputes
            .update_status(on_bid.id, DisputeStatus::Closed)
            .unwrap();

        let ids = |filter: DisputeFilter| -> Vec<Uuid> {
            h.state
                .disputes
                .list(&filter)
                .into_iter()
                .map(|dispute| dispute.id)
                .collect()
        };

        assert_eq!(ids(DisputeFilter::default()).len(), 3);
        assert_eq!(
            ids(DisputeFilter {
                bid_id: Some(bid.id),
                ..DisputeFilter::default()
            }),
            vec![second_on_bid.id, on_bid.id]
        );
        assert_eq!(
            ids(DisputeFilter {
                route_id: Some(other_route.id),
                ..DisputeFilter::default()
            }),
            vec![on_route.id]
        );
        assert_eq!(
            ids(DisputeFilter {
                user_id: Some(driver),
                status: Some(DisputeStatus::Open),
                ..DisputeFilter::default()
            }),
            vec![second_on_bid.id, on_route.id]
        );
    }
}
