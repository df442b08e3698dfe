use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status_enum;

status_enum! {
    EarningsStatus {
        Pending => "PENDING",
        Available => "AVAILABLE",
        Withdrawn => "WITHDRAWN",
    }
}

impl EarningsStatus {
    pub fn next(&self) -> Option<EarningsStatus> {
        match self {
            EarningsStatus::Pending => Some(EarningsStatus::Available),
            EarningsStatus::Available => Some(EarningsStatus::Withdrawn),
            EarningsStatus::Withdrawn => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Earnings {
    pub id: Uuid,
    pub driver_id: Uuid,
    /// Empty for adjustments that are not tied to a delivery.
    pub bid_id: Option<Uuid>,
    pub gross_amount: Decimal,
    pub app_fee: Decimal,
    pub net_amount: Decimal,
    pub status: EarningsStatus,
    pub earned_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningsSummary {
    pub driver_id: Uuid,
    pub today_earnings: Decimal,
    pub weekly_earnings: Decimal,
    pub available_balance: Decimal,
    pub monthly_completed_deliveries: usize,
    pub pending_bids_count: usize,
}
