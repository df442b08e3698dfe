use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status_enum;
use crate::geo::GeoPoint;

status_enum! {
    RequestStatus {
        Open => "OPEN",
        Matched => "MATCHED",
        Expired => "EXPIRED",
        Cancelled => "CANCELLED",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelRequest {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub weight_kg: f64,
    pub volume_m3: f64,
    pub max_budget: Decimal,
    pub deadline: DateTime<Utc>,
    pub description: Option<String>,
    pub status: RequestStatus,
    pub matched_bid_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewParcelRequest {
    pub customer_id: Uuid,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub weight_kg: f64,
    pub volume_m3: f64,
    pub max_budget: Decimal,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
}
