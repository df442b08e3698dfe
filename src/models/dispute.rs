use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status_enum;

status_enum! {
    DisputeStatus {
        Open => "OPEN",
        Resolved => "RESOLVED",
        Closed => "CLOSED",
    }
}

impl DisputeStatus {
    pub fn can_transition_to(&self, next: DisputeStatus) -> bool {
        matches!(
            (self, next),
            (DisputeStatus::Open, DisputeStatus::Resolved)
                | (DisputeStatus::Open, DisputeStatus::Closed)
                | (DisputeStatus::Resolved, DisputeStatus::Closed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub id: Uuid,
    pub user_id: Uuid,
    pub bid_id: Option<Uuid>,
    pub route_id: Option<Uuid>,
    pub description: String,
    pub status: DisputeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDispute {
    pub user_id: Uuid,
    #[serde(default)]
    pub bid_id: Option<Uuid>,
    #[serde(default)]
    pub route_id: Option<Uuid>,
    pub description: String,
}

/// Narrows a dispute listing; empty fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DisputeFilter {
    pub user_id: Option<Uuid>,
    pub bid_id: Option<Uuid>,
    pub route_id: Option<Uuid>,
    pub status: Option<DisputeStatus>,
}

impl DisputeFilter {
    pub fn matches(&self, dispute: &Dispute) -> bool {
        self.user_id.is_none_or(|id| dispute.user_id == id)
            && self.bid_id.is_none_or(|id| dispute.bid_id == Some(id))
            && self.route_id.is_none_or(|id| dispute.route_id == Some(id))
            && self.status.is_none_or(|status| dispute.status == status)
    }
}
