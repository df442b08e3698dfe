use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::earnings::{Earnings, EarningsStatus};
use crate::models::event::{EntityKind, LifecycleEvent};
use crate::models::withdrawal::{
    DriverBalance, NewWithdrawal, Withdrawal, WithdrawalStatus, WithdrawalStatusUpdate,
};
use crate::observability::events::Telemetry;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalUpdate {
    pub withdrawal: Withdrawal,
    /// Earnings rows this update moved to WITHDRAWN.
    pub withdrawn: Vec<Earnings>,
}

/// Driver payouts against AVAILABLE earnings.
///
/// Every write for a driver runs under that driver's payout ledger entry, so a
/// balance check and the reservation it allows cannot interleave with another
/// payout for the same driver.
#[derive(Clone)]
pub struct WithdrawalLedger {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    telemetry: Telemetry,
}

impl WithdrawalLedger {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, telemetry: Telemetry) -> Self {
        Self {
            store,
            clock,
            telemetry,
        }
    }

    pub fn withdrawal(&self, withdrawal_id: Uuid) -> Result<Withdrawal, AppError> {
        self.store
            .withdrawal(withdrawal_id)
            .ok_or_else(|| withdrawal_not_found(withdrawal_id))
    }

    pub fn balance(&self, driver_id: Uuid) -> DriverBalance {
        self.store.driver_balance(driver_id)
    }

    /// A driver's withdrawals, newest first.
    pub fn history(&self, driver_id: Uuid) -> Vec<Withdrawal> {
        let ids = self
            .store
            .payout_ledgers
            .get(&driver_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        let mut withdrawals: Vec<Withdrawal> = ids
            .into_iter()
            .filter_map(|id| self.store.withdrawal(id))
            .collect();
        withdrawals.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        withdrawals
    }

    /// Reserves `amount` out of the driver's withdrawable balance. The
    /// withdrawal starts PROCESSING.
    pub fn request_withdrawal(
        &self,
        new_withdrawal: NewWithdrawal,
    ) -> Result<Withdrawal, AppError> {
        if new_withdrawal.amount <= Decimal::ZERO {
            return Err(AppError::BadRequest("amount must be positive".to_string()));
        }
        if !new_withdrawal.bank_details.is_object() {
            return Err(AppError::BadRequest("bank_details must be an object".to_string()));
        }

        let now = self.clock.now();
        let driver_id = new_withdrawal.driver_id;
        let withdrawal = {
            let mut ledger = self.store.payout_ledgers.entry(driver_id).or_default();

            let withdrawable = self.store.driver_balance(driver_id).withdrawable();
            if new_withdrawal.amount > withdrawable {
                return Err(self.telemetry.failed(
                    "request_withdrawal",
                    AppError::InvalidState(format!(
                        "driver {driver_id} requested {} but can withdraw {withdrawable}",
                        new_withdrawal.amount
                    )),
                ));
            }

            let withdrawal = Withdrawal {
                id: Uuid::new_v4(),
                driver_id,
                amount: new_withdrawal.amount,
                bank_details: new_withdrawal.bank_details,
                status: WithdrawalStatus::Processing,
                transaction_id: None,
                processed_at: None,
                created_at: now,
            };
            self.store.withdrawals.insert(withdrawal.id, withdrawal.clone());
            ledger.push(withdrawal.id);
            withdrawal
        };

        self.publish(&withdrawal, now);
        info!(
            withdrawal_id = %withdrawal.id,
            driver_id = %driver_id,
            amount = %withdrawal.amount,
            "withdrawal requested"
        );
        Ok(withdrawal)
    }

    /// PROCESSING -> COMPLETED | FAILED. Completion moves the driver's oldest
    /// AVAILABLE rows to WITHDRAWN while the paid-out amount covers them whole.
    pub fn update_status(
        &self,
        withdrawal_id: Uuid,
        update: WithdrawalStatusUpdate,
    ) -> Result<WithdrawalUpdate, AppError> {
        let driver_id = self.withdrawal(withdrawal_id)?.driver_id;
        let now = self.clock.now();

        let (withdrawal, withdrawn) = {
            let _ledger = self.store.payout_ledgers.entry(driver_id).or_default();

            let withdrawal = {
                let mut row = self
                    .store
                    .withdrawals
                    .get_mut(&withdrawal_id)
                    .ok_or_else(|| withdrawal_not_found(withdrawal_id))?;

                if !row.status.can_transition_to(update.status) {
                    return Err(self.telemetry.failed(
                        "update_withdrawal",
                        AppError::InvalidState(format!(
                            "withdrawal {withdrawal_id} cannot move from {} to {}",
                            row.status, update.status
                        )),
                    ));
                }

                row.status = update.status;
                row.processed_at = Some(now);
                if update.transaction_id.is_some() {
                    row.transaction_id = update.transaction_id;
                }
                row.clone()
            };

            let withdrawn = if withdrawal.status == WithdrawalStatus::Completed {
                self.match_paid_out(driver_id, now)
            } else {
                Vec::new()
            };
            (withdrawal, withdrawn)
        };

        self.publish(&withdrawal, now);
        for row in &withdrawn {
            self.telemetry.publish(LifecycleEvent::new(
                EntityKind::Earnings,
                row.id,
                row.status.as_str(),
                now,
            ));
        }
        info!(
            withdrawal_id = %withdrawal_id,
            status = %withdrawal.status,
            withdrawn_rows = withdrawn.len(),
            "withdrawal status updated"
        );

        Ok(WithdrawalUpdate {
            withdrawal,
            withdrawn,
        })
    }

    /// Caller holds the driver's payout ledger entry.
    fn match_paid_out(&self, driver_id: Uuid, now: DateTime<Utc>) -> Vec<Earnings> {
        let mut unmatched = self.store.driver_balance(driver_id).paid_unmatched;

        let mut available: Vec<(DateTime<Utc>, Uuid)> = self
            .store
            .earnings
            .iter()
            .filter(|entry| {
                entry.driver_id == driver_id && entry.status == EarningsStatus::Available
            })
            .map(|entry| (entry.earned_at, entry.id))
            .collect();
        available.sort();

        let mut withdrawn = Vec::new();
        for (_, earnings_id) in available {
            let Some(mut row) = self.store.earnings.get_mut(&earnings_id) else {
                continue;
            };
            if row.status != EarningsStatus::Available {
                continue;
            }
            if row.net_amount > unmatched {
                break;
            }

            unmatched -= row.net_amount;
            row.status = EarningsStatus::Withdrawn;
            row.updated_at = now;
            withdrawn.push(row.clone());
        }
        withdrawn
    }

    fn publish(&self, withdrawal: &Withdrawal, at: DateTime<Utc>) {
        self.telemetry.publish(LifecycleEvent::new(
            EntityKind::Withdrawal,
            withdrawal.id,
            withdrawal.status.as_str(),
            at,
        ));
    }
}

fn withdrawal_not_found(withdrawal_id: Uuid) -> AppError {
    AppError::NotFound(format!("withdrawal {withdrawal_id} not found"))
}
