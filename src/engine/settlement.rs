use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::bid::{Bid, BidStatus};
use crate::models::earnings::{Earnings, EarningsStatus};
use crate::models::event::{EntityKind, LifecycleEvent};
use crate::models::tracking::DeliveryStatus;
use crate::observability::events::Telemetry;
use crate::store::Store;

/// How the platform fee is taken out of a bid's gross amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePolicy {
    /// Percent of gross, e.g. `10` for 10 %.
    Percentage(Decimal),
    Flat(Decimal),
}

impl FeePolicy {
    pub fn from_parts(mode: &str, value: Decimal) -> Result<Self, AppError> {
        if value.is_sign_negative() {
            return Err(AppError::BadRequest(format!("fee must not be negative: {value}")));
        }

        match mode {
            "percentage" if value > Decimal::ONE_HUNDRED => Err(AppError::BadRequest(format!(
                "percentage fee must be at most 100: {value}"
            ))),
            "percentage" => Ok(FeePolicy::Percentage(value)),
            "flat" => Ok(FeePolicy::Flat(value)),
            other => Err(AppError::BadRequest(format!(
                "unknown fee mode: {other}, expected percentage/flat"
            ))),
        }
    }

    /// Fee for `gross`, rounded to cents and never more than `gross`.
    pub fn fee_for(&self, gross: Decimal) -> Decimal {
        let fee = match self {
            FeePolicy::Percentage(percent) => gross * *percent / Decimal::ONE_HUNDRED,
            FeePolicy::Flat(amount) => *amount,
        };

        fee.round_dp(2).min(gross).max(Decimal::ZERO)
    }
}

enum Readiness {
    Settled(Earnings),
    Ready { bid: Bid, driver_id: Uuid },
    NotReady(String),
}

/// Turns a delivered, paid bid into exactly one earnings row.
#[derive(Clone)]
pub struct SettlementTrigger {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    fee_policy: FeePolicy,
    telemetry: Telemetry,
}

impl SettlementTrigger {
    pub fn new(
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
        fee_policy: FeePolicy,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            store,
            clock,
            fee_policy,
            telemetry,
        }
    }

    /// Settles the bid, or returns its existing earnings row unchanged.
    pub fn settle(&self, bid_id: Uuid) -> Result<Earnings, AppError> {
        let outcome = match self.readiness(bid_id) {
            Ok(Readiness::Settled(existing)) => Ok(existing),
            Ok(Readiness::Ready { bid, driver_id }) => self.insert(&bid, driver_id),
            Ok(Readiness::NotReady(reason)) => Err(AppError::InvalidState(reason)),
            Err(err) => Err(err),
        };

        outcome.map_err(|err| self.telemetry.failed("settle", err))
    }

    /// Hook for delivery and payment transitions: settles when every
    /// precondition holds and defers quietly otherwise.
    pub fn settle_if_ready(&self, bid_id: Uuid) -> Result<Option<Earnings>, AppError> {
        let outcome = match self.readiness(bid_id) {
            Ok(Readiness::Settled(existing)) => Ok(Some(existing)),
            Ok(Readiness::Ready { bid, driver_id }) => self.insert(&bid, driver_id).map(Some),
            Ok(Readiness::NotReady(reason)) => {
                debug!(bid_id = %bid_id, reason = %reason, "settlement deferred");
                Ok(None)
            }
            Err(err) => Err(err),
        };

        outcome.map_err(|err| self.telemetry.failed("settle", err))
    }

    /// Runs every lookup settlement can fail on, without looking at the
    /// delivery or payment status. Rows are never removed, so once this passes
    /// a later `settle_if_ready` for the bid can only settle or defer.
    pub fn preflight(&self, bid_id: Uuid) -> Result<(), AppError> {
        self.try_preflight(bid_id)
            .map_err(|err| self.telemetry.failed("settle", err))
    }

    fn try_preflight(&self, bid_id: Uuid) -> Result<(), AppError> {
        self.settled(bid_id)?;
        let bid = self
            .store
            .bid(bid_id)
            .ok_or_else(|| AppError::NotFound(format!("bid {bid_id} not found")))?;
        self.driver_of(&bid)?;
        Ok(())
    }

    fn settled(&self, bid_id: Uuid) -> Result<Option<Earnings>, AppError> {
        let Some(earnings_id) = self.store.earnings_by_bid.get(&bid_id).map(|entry| *entry) else {
            return Ok(None);
        };
        self.store.earnings(earnings_id).map(Some).ok_or_else(|| {
            AppError::Inconsistent(format!("earnings index for bid {bid_id} is dangling"))
        })
    }

    fn driver_of(&self, bid: &Bid) -> Result<Uuid, AppError> {
        self.store
            .route(bid.route_id)
            .map(|route| route.driver_id)
            .ok_or_else(|| {
                AppError::Inconsistent(format!(
                    "bid {} references missing route {}",
                    bid.id, bid.route_id
                ))
            })
    }

    fn readiness(&self, bid_id: Uuid) -> Result<Readiness, AppError> {
        if let Some(existing) = self.settled(bid_id)? {
            return Ok(Readiness::Settled(existing));
        }

        let bid = self
            .store
            .bid(bid_id)
            .ok_or_else(|| AppError::NotFound(format!("bid {bid_id} not found")))?;

        if bid.status != BidStatus::Accepted {
            return Ok(Readiness::NotReady(format!(
                "bid {bid_id} is {}, only ACCEPTED bids settle",
                bid.status
            )));
        }

        let tracking = self.store.tracking_for_bid(bid_id).ok_or_else(|| {
            AppError::Inconsistent(format!("accepted bid {bid_id} has no delivery tracking"))
        })?;

        if tracking.status != DeliveryStatus::Delivered {
            return Ok(Readiness::NotReady(format!(
                "delivery for bid {bid_id} is {}, not delivered",
                tracking.status
            )));
        }

        let driver_id = self.driver_of(&bid)?;

        if self.store.completed_payment_for_bid(bid_id).is_some() {
            return Ok(Readiness::Ready { bid, driver_id });
        }

        match self.store.payments_for_bid(bid_id).last() {
            Some(payment) => Ok(Readiness::NotReady(format!(
                "no completed payment for bid {bid_id}, latest {} is {}",
                payment.id, payment.status
            ))),
            None => Ok(Readiness::NotReady(format!(
                "no payment recorded for bid {bid_id}"
            ))),
        }
    }

    fn insert(&self, bid: &Bid, driver_id: Uuid) -> Result<Earnings, AppError> {
        let now = self.clock.now();

        let existing_id = match self.store.earnings_by_bid.entry(bid.id) {
            Entry::Occupied(entry) => Some(*entry.get()),
            Entry::Vacant(slot) => {
                let gross = bid.offered_price;
                let app_fee = self.fee_policy.fee_for(gross);
                let earnings = Earnings {
                    id: Uuid::new_v4(),
                    driver_id,
                    bid_id: Some(bid.id),
                    gross_amount: gross,
                    app_fee,
                    net_amount: gross - app_fee,
                    status: EarningsStatus::Pending,
                    earned_at: now,
                    updated_at: now,
                };

                self.store.earnings.insert(earnings.id, earnings.clone());
                slot.insert(earnings.id);

                self.telemetry.publish(LifecycleEvent::new(
                    EntityKind::Earnings,
                    earnings.id,
                    earnings.status.as_str(),
                    now,
                ));
                info!(
                    bid_id = %bid.id,
                    driver_id = %driver_id,
                    gross = %earnings.gross_amount,
                    net = %earnings.net_amount,
                    "delivery settled"
                );
                return Ok(earnings);
            }
        };

        // Lost the race to a concurrent settlement of the same bid.
        existing_id
            .and_then(|id| self.store.earnings(id))
            .ok_or_else(|| {
                AppError::Inconsistent(format!("earnings index for bid {} is dangling", bid.id))
            })
    }
}
