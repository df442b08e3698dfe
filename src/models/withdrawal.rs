use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status_enum;

status_enum! {
    /// Requests start as `PROCESSING` and end `COMPLETED` or `FAILED`.
    WithdrawalStatus {
        Processing => "PROCESSING",
        Completed => "COMPLETED",
        Failed => "FAILED",
    }
}

impl WithdrawalStatus {
    pub fn can_transition_to(&self, next: WithdrawalStatus) -> bool {
        matches!(
            (self, next),
            (WithdrawalStatus::Processing, WithdrawalStatus::Completed)
                | (WithdrawalStatus::Processing, WithdrawalStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub amount: Decimal,
    /// Payout destination as given by the driver, passed through untouched.
    pub bank_details: serde_json::Value,
    pub status: WithdrawalStatus,
    pub transaction_id: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWithdrawal {
    pub driver_id: Uuid,
    pub amount: Decimal,
    pub bank_details: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalStatusUpdate {
    pub status: WithdrawalStatus,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

/// A driver's money position across earnings and withdrawals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DriverBalance {
    /// Net of AVAILABLE earnings rows.
    pub available_earnings: Decimal,
    /// Amount held by withdrawals still PROCESSING.
    pub reserved: Decimal,
    /// Paid out by COMPLETED withdrawals but not yet matched to whole earnings rows.
    pub paid_unmatched: Decimal,
}

impl DriverBalance {
    pub fn withdrawable(&self) -> Decimal {
        (self.available_earnings - self.reserved - self.paid_unmatched).max(Decimal::ZERO)
    }
}
