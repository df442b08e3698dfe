//! In-memory row store.
//!
//! Every table is a [`DashMap`]; the entry guard of a row is its row lock.
//! Operations that touch several tables take their locks in one order:
//! request, route, bid, tracking, location, payment, driver payout ledger,
//! withdrawal, earnings. A guard on a table is never held while another row of
//! the same table is locked.

use dashmap::DashMap;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::bid::{Bid, BidStatus};
use crate::models::dispute::Dispute;
use crate::models::earnings::{Earnings, EarningsStatus};
use crate::models::payment::{Payment, PaymentStatus};
use crate::models::request::ParcelRequest;
use crate::models::review::Review;
use crate::models::route::ReturnRoute;
use crate::models::tracking::{DeliveryTracking, DriverLocationUpdate};
use crate::models::withdrawal::{DriverBalance, Withdrawal, WithdrawalStatus};

#[derive(Default)]
pub struct Store {
    pub(crate) requests: DashMap<Uuid, ParcelRequest>,
    pub(crate) routes: DashMap<Uuid, ReturnRoute>,
    pub(crate) bids: DashMap<Uuid, Bid>,
    pub(crate) trackings: DashMap<Uuid, DeliveryTracking>,
    /// Unique index: bid id -> tracking id.
    pub(crate) tracking_by_bid: DashMap<Uuid, Uuid>,
    pub(crate) locations: DashMap<Uuid, Vec<DriverLocationUpdate>>,
    pub(crate) payments: DashMap<Uuid, Payment>,
    pub(crate) earnings: DashMap<Uuid, Earnings>,
    /// Unique index: bid id -> earnings id.
    pub(crate) earnings_by_bid: DashMap<Uuid, Uuid>,
    pub(crate) withdrawals: DashMap<Uuid, Withdrawal>,
    /// Driver id -> withdrawal ids. The entry is the driver's payout lock.
    pub(crate) payout_ledgers: DashMap<Uuid, Vec<Uuid>>,
    pub(crate) disputes: DashMap<Uuid, Dispute>,
    pub(crate) reviews: DashMap<Uuid, Review>,
    /// Unique index: (bid id, reviewer id) -> review id.
    pub(crate) review_by_trip: DashMap<(Uuid, Uuid), Uuid>,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct TableCounts {
    pub requests: usize,
    pub routes: usize,
    pub bids: usize,
    pub deliveries: usize,
    pub payments: usize,
    pub earnings: usize,
    pub withdrawals: usize,
    pub disputes: usize,
    pub reviews: usize,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> TableCounts {
        TableCounts {
            requests: self.requests.len(),
            routes: self.routes.len(),
            bids: self.bids.len(),
            deliveries: self.trackings.len(),
            payments: self.payments.len(),
            earnings: self.earnings.len(),
            withdrawals: self.withdrawals.len(),
            disputes: self.disputes.len(),
            reviews: self.reviews.len(),
        }
    }

    pub fn request(&self, id: Uuid) -> Option<ParcelRequest> {
        self.requests.get(&id).map(|entry| entry.value().clone())
    }

    pub fn route(&self, id: Uuid) -> Option<ReturnRoute> {
        self.routes.get(&id).map(|entry| entry.value().clone())
    }

    pub fn bid(&self, id: Uuid) -> Option<Bid> {
        self.bids.get(&id).map(|entry| entry.value().clone())
    }

    pub fn payment(&self, id: Uuid) -> Option<Payment> {
        self.payments.get(&id).map(|entry| entry.value().clone())
    }

    pub fn earnings(&self, id: Uuid) -> Option<Earnings> {
        self.earnings.get(&id).map(|entry| entry.value().clone())
    }

    pub fn tracking_for_bid(&self, bid_id: Uuid) -> Option<DeliveryTracking> {
        let tracking_id = *self.tracking_by_bid.get(&bid_id)?;
        self.trackings
            .get(&tracking_id)
            .map(|entry| entry.value().clone())
    }

    pub fn earnings_for_bid(&self, bid_id: Uuid) -> Option<Earnings> {
        let earnings_id = *self.earnings_by_bid.get(&bid_id)?;
        self.earnings(earnings_id)
    }

    /// Bids on a request, oldest first.
    pub fn bids_for_request(&self, request_id: Uuid) -> Vec<Bid> {
        self.collect_bids(|bid| bid.request_id == request_id)
    }

    /// Bids on a route, oldest first, optionally narrowed to one status.
    pub fn bids_for_route(&self, route_id: Uuid, status: Option<BidStatus>) -> Vec<Bid> {
        self.collect_bids(|bid| {
            bid.route_id == route_id && status.map_or(true, |wanted| bid.status == wanted)
        })
    }

    /// Payments recorded for a bid, oldest first.
    pub fn payments_for_bid(&self, bid_id: Uuid) -> Vec<Payment> {
        let mut payments: Vec<Payment> = self
            .payments
            .iter()
            .filter(|entry| entry.bid_id == bid_id)
            .map(|entry| entry.value().clone())
            .collect();
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        payments
    }

    /// The bid's `completed` payment, if any. Refunded payments do not count.
    pub fn completed_payment_for_bid(&self, bid_id: Uuid) -> Option<Payment> {
        self.payments
            .iter()
            .find(|entry| entry.bid_id == bid_id && entry.status == PaymentStatus::Completed)
            .map(|entry| entry.value().clone())
    }

    pub fn withdrawal(&self, id: Uuid) -> Option<Withdrawal> {
        self.withdrawals.get(&id).map(|entry| entry.value().clone())
    }

    pub fn dispute(&self, id: Uuid) -> Option<Dispute> {
        self.disputes.get(&id).map(|entry| entry.value().clone())
    }

    pub fn review(&self, id: Uuid) -> Option<Review> {
        self.reviews.get(&id).map(|entry| entry.value().clone())
    }

    /// Current money position of a driver. Callers that act on it hold the
    /// driver's payout ledger entry.
    pub fn driver_balance(&self, driver_id: Uuid) -> DriverBalance {
        let mut available_earnings = Decimal::ZERO;
        let mut withdrawn_earnings = Decimal::ZERO;
        for entry in self.earnings.iter().filter(|entry| entry.driver_id == driver_id) {
            match entry.status {
                EarningsStatus::Available => available_earnings += entry.net_amount,
                EarningsStatus::Withdrawn => withdrawn_earnings += entry.net_amount,
                EarningsStatus::Pending => {}
            }
        }

        let mut reserved = Decimal::ZERO;
        let mut paid_out = Decimal::ZERO;
        for entry in self.withdrawals.iter().filter(|entry| entry.driver_id == driver_id) {
            match entry.status {
                WithdrawalStatus::Processing => reserved += entry.amount,
                WithdrawalStatus::Completed => paid_out += entry.amount,
                WithdrawalStatus::Failed => {}
            }
        }

        DriverBalance {
            available_earnings,
            reserved,
            paid_unmatched: (paid_out - withdrawn_earnings).max(Decimal::ZERO),
        }
    }

    /// Location trail of a tracking, in recorded order.
    pub fn locations_for_tracking(&self, tracking_id: Uuid) -> Vec<DriverLocationUpdate> {
        self.locations
            .get(&tracking_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    fn collect_bids(&self, keep: impl Fn(&Bid) -> bool) -> Vec<Bid> {
        let mut bids: Vec<Bid> = self
            .bids
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        bids.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        bids
    }
}
