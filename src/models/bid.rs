use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status_enum;

status_enum! {
    BidStatus {
        Pending => "PENDING",
        Accepted => "ACCEPTED",
        Rejected => "REJECTED",
    }
}

/// Inclusive range of route segment indices a bid occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub start_index: u32,
    pub end_index: u32,
}

impl Segment {
    pub fn is_well_formed(&self) -> bool {
        self.start_index <= self.end_index
    }

    pub fn overlaps(&self, other: &Segment) -> bool {
        !(self.end_index < other.start_index || other.end_index < self.start_index)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub id: Uuid,
    pub request_id: Uuid,
    pub route_id: Uuid,
    pub segment: Segment,
    pub offered_price: Decimal,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBid {
    pub request_id: Uuid,
    pub route_id: Uuid,
    pub segment: Segment,
    pub offered_price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::Segment;

    fn segment(start_index: u32, end_index: u32) -> Segment {
        Segment {
            start_index,
            end_index,
        }
    }

    #[test]
    fn touching_segments_overlap() {
        assert!(segment(0, 3).overlaps(&segment(3, 5)));
        assert!(segment(3, 5).overlaps(&segment(0, 3)));
    }

    #[test]
    fn disjoint_segments_do_not_overlap() {
        assert!(!segment(0, 2).overlaps(&segment(3, 5)));
        assert!(!segment(6, 9).overlaps(&segment(3, 5)));
    }

    #[test]
    fn reversed_segment_is_malformed() {
        assert!(segment(2, 2).is_well_formed());
        assert!(!segment(4, 1).is_well_formed());
    }
}
