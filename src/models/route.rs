use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status_enum;
use crate::geo::GeoPoint;

status_enum! {
    /// `INITIATED` means the bidding window has closed and the route waits for departure.
    RouteStatus {
        Open => "OPEN",
        Initiated => "INITIATED",
        Booked => "BOOKED",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnRoute {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub departure_time: DateTime<Utc>,
    pub bidding_start: DateTime<Utc>,
    pub detour_tolerance_km: Decimal,
    pub suggested_price_min: Decimal,
    pub suggested_price_max: Decimal,
    pub status: RouteStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReturnRoute {
    /// The instant at which the route stops taking bids.
    pub fn bidding_deadline(&self, closing_offset: Duration) -> DateTime<Utc> {
        self.departure_time - closing_offset
    }

    pub fn accepts_bids_at(&self, now: DateTime<Utc>, closing_offset: Duration) -> bool {
        matches!(self.status, RouteStatus::Open | RouteStatus::Initiated)
            && now >= self.bidding_start
            && now < self.bidding_deadline(closing_offset)
    }

    pub fn has_departed(&self, now: DateTime<Utc>) -> bool {
        now >= self.departure_time
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRoute {
    pub driver_id: Uuid,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub departure_time: DateTime<Utc>,
    #[serde(default)]
    pub bidding_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub detour_tolerance_km: Decimal,
    pub suggested_price_min: Decimal,
    pub suggested_price_max: Decimal,
}
