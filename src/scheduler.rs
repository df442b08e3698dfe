use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub closed: usize,
    pub auto_accepted: usize,
    pub finalized: usize,
    pub completed: usize,
    pub expired: usize,
}

/// Drives the time-based transitions: one pass per tick, forever.
pub async fn run_scheduler(state: Arc<AppState>, every: Duration, batch_limit: usize) {
    info!(interval_secs = every.as_secs(), batch_limit, "scheduler started");

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks = IntervalStream::new(interval);

    while ticks.next().await.is_some() {
        let report = run_pass(&state, batch_limit);
        if report != PassReport::default() {
            info!(
                closed = report.closed,
                auto_accepted = report.auto_accepted,
                finalized = report.finalized,
                completed = report.completed,
                expired = report.expired,
                "scheduler pass applied transitions"
            );
        }
    }

    warn!("scheduler stopped: ticker ended");
}

/// One pass over every due item. A failing item is logged and skipped.
pub fn run_pass(state: &AppState, batch_limit: usize) -> PassReport {
    let now = state.clock.now();
    let mut report = PassReport::default();
    let mut backlog = 0;

    timed(state, "close_bidding", || {
        let due = state.routes.routes_due_for_closing(now, batch_limit);
        backlog += due.len();

        for route in due {
            match state.routes.close_bidding_if_due(route.id, now) {
                Ok(transition) if transition.applied() => report.closed += 1,
                Ok(_) => continue,
                Err(err) => {
                    log_item_failure("close_bidding", route.id, &err);
                    continue;
                }
            }

            match state.bids.auto_accept(route.id, &state.settings.acceptance) {
                Ok(accepted) => report.auto_accepted += accepted.len(),
                Err(err) => log_item_failure("auto_accept", route.id, &err),
            }
        }
    });

    timed(state, "finalize_routes", || {
        let due = state.routes.routes_due_for_finalizing(now, batch_limit);
        backlog += due.len();

        for route in due {
            match state.routes.finalize_if_departed(route.id, now) {
                Ok(transition) if transition.applied() => report.finalized += 1,
                Ok(_) => continue,
                Err(err) => {
                    log_item_failure("finalize_route", route.id, &err);
                    continue;
                }
            }

            // Parcels may all have been delivered before departure.
            match state.routes.complete_if_fulfilled(route.id) {
                Ok(transition) if transition.applied() => report.completed += 1,
                Ok(_) => {}
                Err(err) => log_item_failure("complete_route", route.id, &err),
            }
        }
    });

    timed(state, "expire_requests", || {
        let due = state.bids.requests_due_for_expiry(now, batch_limit);
        backlog += due.len();

        for request in due {
            match state.bids.expire_request_if_due(request.id, now) {
                Ok(transition) if transition.applied() => report.expired += 1,
                Ok(_) => {}
                Err(err) => log_item_failure("expire_request", request.id, &err),
            }
        }
    });

    state
        .telemetry
        .metrics
        .scheduler_backlog
        .set(i64::try_from(backlog).unwrap_or(i64::MAX));
    debug!(backlog, "scheduler pass finished");

    report
}

fn timed(state: &AppState, job: &str, run: impl FnOnce()) {
    let start = Instant::now();
    run();
    state
        .telemetry
        .metrics
        .scheduler_pass_seconds
        .with_label_values(&[job])
        .observe(start.elapsed().as_secs_f64());
}

fn log_item_failure(job: &'static str, id: uuid::Uuid, err: &AppError) {
    match err {
        AppError::Inconsistent(_) | AppError::Internal(_) => {
            error!(job, id = %id, error = %err, "scheduler item failed");
        }
        _ => warn!(job, id = %id, error = %err, "scheduler item skipped"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rust_decimal::Decimal;

    use super::{run_pass, PassReport};
    use crate::engine::fixtures::Harness;
    use crate::models::bid::BidStatus;
    use crate::models::request::RequestStatus;
    use crate::models::route::RouteStatus;

    #[test]
    fn pass_closes_accepts_and_finalizes() {
        let h = Harness::new();
        let departure = h.now() + Duration::hours(10);
        let route = h.route_departing(departure);
        let request = h.request();
        let bid = h.bid(request.id, route.id, Decimal::from(70));

        assert_eq!(run_pass(&h.state, 10), PassReport::default());

        h.clock.set(departure - Duration::hours(1));
        let report = run_pass(&h.state, 10);
        assert_eq!(report.closed, 1);
        assert_eq!(report.auto_accepted, 1);
        assert_eq!(h.state.store.bid(bid.id).unwrap().status, BidStatus::Accepted);
        assert_eq!(
            h.state.store.request(request.id).unwrap().status,
            RequestStatus::Matched
        );

        h.clock.set(departure);
        let report = run_pass(&h.state, 10);
        assert_eq!(report.finalized, 1);
        assert_eq!(h.state.store.route(route.id).unwrap().status, RouteStatus::Booked);

        assert_eq!(run_pass(&h.state, 10), PassReport::default());
    }

    #[test]
    fn pass_expires_overdue_requests() {
        let h = Harness::new();
        let request = h
            .state
            .bids
            .create_request(h.new_request(h.now() + Duration::hours(1)))
            .unwrap();

        h.clock.advance(Duration::hours(2));
        let report = run_pass(&h.state, 10);

        assert_eq!(report.expired, 1);
        assert_eq!(
            h.state.store.request(request.id).unwrap().status,
            RequestStatus::Expired
        );
    }

    #[test]
    fn pass_respects_the_batch_limit() {
        let h = Harness::new();
        for hours in 4..7 {
            h.route_departing(h.now() + Duration::hours(hours));
        }

        h.clock.advance(Duration::hours(5));
        assert_eq!(run_pass(&h.state, 2).closed, 2);
        assert_eq!(run_pass(&h.state, 2).closed, 1);
    }
}
