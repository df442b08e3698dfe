use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A committed state change, published after the transaction that caused it.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    pub entity: EntityKind,
    pub id: Uuid,
    pub status: &'static str,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Request,
    Route,
    Bid,
    Delivery,
    Payment,
    Earnings,
    Withdrawal,
    Dispute,
    Review,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Request => "request",
            EntityKind::Route => "route",
            EntityKind::Bid => "bid",
            EntityKind::Delivery => "delivery",
            EntityKind::Payment => "payment",
            EntityKind::Earnings => "earnings",
            EntityKind::Withdrawal => "withdrawal",
            EntityKind::Dispute => "dispute",
            EntityKind::Review => "review",
        }
    }
}

impl LifecycleEvent {
    pub fn new(entity: EntityKind, id: Uuid, status: &'static str, at: DateTime<Utc>) -> Self {
        Self {
            entity,
            id,
            status,
            at,
        }
    }
}
