use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status_enum;
use crate::geo::GeoPoint;

status_enum! {
    /// Linear: `created -> picked_up -> delivered`.
    DeliveryStatus {
        Created => "created",
        PickedUp => "picked_up",
        Delivered => "delivered",
    }
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTracking {
    pub id: Uuid,
    pub bid_id: Uuid,
    pub status: DeliveryStatus,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub actual_pickup_time: Option<DateTime<Utc>>,
    pub actual_delivery_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverLocationUpdate {
    pub id: Uuid,
    pub tracking_id: Uuid,
    pub location: GeoPoint,
    pub recorded_at: DateTime<Utc>,
    /// Insertion order within the tracking; breaks ties on `recorded_at`.
    pub sequence: u64,
}
