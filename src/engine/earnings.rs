use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::bid::BidStatus;
use crate::models::earnings::{Earnings, EarningsStatus, EarningsSummary};
use crate::models::event::{EntityKind, LifecycleEvent};
use crate::observability::events::Telemetry;
use crate::store::Store;

/// Read side of driver earnings plus the payout status ladder.
#[derive(Clone)]
pub struct EarningsBook {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    telemetry: Telemetry,
}

impl EarningsBook {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, telemetry: Telemetry) -> Self {
        Self {
            store,
            clock,
            telemetry,
        }
    }

    pub fn for_bid(&self, bid_id: Uuid) -> Result<Earnings, AppError> {
        self.store
            .earnings_for_bid(bid_id)
            .ok_or_else(|| AppError::NotFound(format!("no earnings for bid {bid_id}")))
    }

    /// A driver's earnings, newest first.
    pub fn history(&self, driver_id: Uuid, status: Option<EarningsStatus>) -> Vec<Earnings> {
        let mut rows: Vec<Earnings> = self
            .store
            .earnings
            .iter()
            .filter(|entry| {
                entry.driver_id == driver_id && status.is_none_or(|wanted| entry.status == wanted)
            })
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by(|a, b| b.earned_at.cmp(&a.earned_at).then(b.id.cmp(&a.id)));
        rows
    }

    pub fn summary(&self, driver_id: Uuid, now: DateTime<Utc>) -> EarningsSummary {
        let rows = self.history(driver_id, None);
        let today_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .unwrap_or(now);
        let week_start = now - Duration::days(7);
        let month_start = now - Duration::days(30);

        let net_since = |start: DateTime<Utc>| -> Decimal {
            rows.iter()
                .filter(|row| row.earned_at >= start && row.earned_at <= now)
                .map(|row| row.net_amount)
                .sum()
        };

        let routes: HashSet<Uuid> = self
            .store
            .routes
            .iter()
            .filter(|entry| entry.driver_id == driver_id)
            .map(|entry| entry.id)
            .collect();
        let pending_bids_count = self
            .store
            .bids
            .iter()
            .filter(|entry| entry.status == BidStatus::Pending && routes.contains(&entry.route_id))
            .count();

        EarningsSummary {
            driver_id,
            today_earnings: net_since(today_start),
            weekly_earnings: net_since(week_start),
            available_balance: self.store.driver_balance(driver_id).withdrawable(),
            monthly_completed_deliveries: rows
                .iter()
                .filter(|row| row.earned_at >= month_start && row.earned_at <= now)
                .count(),
            pending_bids_count,
        }
    }

    /// PENDING -> AVAILABLE. WITHDRAWN is only reached by completing a
    /// withdrawal.
    pub fn update_status(
        &self,
        earnings_id: Uuid,
        status: EarningsStatus,
    ) -> Result<Earnings, AppError> {
        let now = self.clock.now();
        let updated = {
            let mut row = self.store.earnings.get_mut(&earnings_id).ok_or_else(|| {
                AppError::NotFound(format!("earnings {earnings_id} not found"))
            })?;

            if status == EarningsStatus::Withdrawn {
                return Err(self.telemetry.failed(
                    "update_earnings",
                    AppError::InvalidState(format!(
                        "earnings {earnings_id} are withdrawn through a withdrawal request"
                    )),
                ));
            }
            if row.status.next() != Some(status) {
                return Err(self.telemetry.failed(
                    "update_earnings",
                    AppError::InvalidState(format!(
                        "earnings {earnings_id} cannot move from {} to {status}",
                        row.status
                    )),
                ));
            }

            row.status = status;
            row.updated_at = now;
            row.clone()
        };

        self.publish(&updated);
        info!(earnings_id = %earnings_id, status = %updated.status, "earnings status updated");
        Ok(updated)
    }

    /// Manual credit for a driver that is not tied to a delivery.
    pub fn record_adjustment(
        &self,
        driver_id: Uuid,
        gross_amount: Decimal,
        app_fee: Decimal,
    ) -> Result<Earnings, AppError> {
        if gross_amount <= Decimal::ZERO {
            return Err(AppError::BadRequest("gross_amount must be positive".to_string()));
        }
        if app_fee < Decimal::ZERO || app_fee > gross_amount {
            return Err(AppError::BadRequest(
                "app_fee must be between zero and gross_amount".to_string(),
            ));
        }

        let now = self.clock.now();
        let earnings = Earnings {
            id: Uuid::new_v4(),
            driver_id,
            bid_id: None,
            gross_amount,
            app_fee,
            net_amount: gross_amount - app_fee,
            status: EarningsStatus::Pending,
            earned_at: now,
            updated_at: now,
        };

        self.store.earnings.insert(earnings.id, earnings.clone());
        self.publish(&earnings);
        info!(
            earnings_id = %earnings.id,
            driver_id = %driver_id,
            net = %earnings.net_amount,
            "earnings adjustment recorded"
        );
        Ok(earnings)
    }

    fn publish(&self, earnings: &Earnings) {
        self.telemetry.publish(LifecycleEvent::new(
            EntityKind::Earnings,
            earnings.id,
            earnings.status.as_str(),
            earnings.updated_at,
        ));
    }
}
