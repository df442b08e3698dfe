use std::collections::HashSet;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::{detour_fraction, haversine_km};
use crate::models::bid::Bid;
use crate::models::request::ParcelRequest;
use crate::models::route::ReturnRoute;

const PRICE_WEIGHT: f64 = 0.5;
const VOLUME_WEIGHT: f64 = 0.2;
const DISTANCE_WEIGHT: f64 = 0.2;
const DETOUR_WEIGHT: f64 = 0.1;
const VEHICLE_CAPACITY_M3: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Nothing is accepted automatically when a window closes.
    Manual,
    LowestPrice,
    Weighted,
}

impl FromStr for SelectionStrategy {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "manual" => Ok(SelectionStrategy::Manual),
            "lowest_price" => Ok(SelectionStrategy::LowestPrice),
            "weighted" => Ok(SelectionStrategy::Weighted),
            other => Err(AppError::BadRequest(format!(
                "unknown acceptance policy: {other}, expected manual/lowest_price/weighted"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub price: f64,
    pub volume: f64,
    pub distance: f64,
    pub detour: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            price: PRICE_WEIGHT,
            volume: VOLUME_WEIGHT,
            distance: DISTANCE_WEIGHT,
            detour: DETOUR_WEIGHT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub price_score: f64,
    pub volume_score: f64,
    pub distance_score: f64,
    pub detour_score: f64,
}

/// A pending bid together with the request it is for.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub bid: Bid,
    pub request: ParcelRequest,
}

/// Picks which pending bids a route takes when its bidding window closes.
#[derive(Debug, Clone)]
pub struct AcceptancePolicy {
    pub strategy: SelectionStrategy,
    pub weights: ScoreWeights,
    pub vehicle_capacity_m3: f64,
}

impl Default for AcceptancePolicy {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::LowestPrice,
            weights: ScoreWeights::default(),
            vehicle_capacity_m3: VEHICLE_CAPACITY_M3,
        }
    }
}

impl AcceptancePolicy {
    /// Candidates in preference order. Empty for [`SelectionStrategy::Manual`].
    pub fn rank<'a>(&self, route: &ReturnRoute, candidates: &'a [Candidate]) -> Vec<&'a Candidate> {
        let mut ranked: Vec<&Candidate> = candidates.iter().collect();

        match self.strategy {
            SelectionStrategy::Manual => return Vec::new(),
            SelectionStrategy::LowestPrice => {
                ranked.sort_by(|a, b| {
                    a.bid
                        .offered_price
                        .cmp(&b.bid.offered_price)
                        .then(a.bid.created_at.cmp(&b.bid.created_at))
                        .then(a.bid.id.cmp(&b.bid.id))
                });
            }
            SelectionStrategy::Weighted => {
                let (min_price, max_price) = price_range(candidates);
                let mut scored: Vec<(f64, &Candidate)> = ranked
                    .into_iter()
                    .map(|candidate| {
                        let (score, _) = compute_score(
                            route,
                            candidate,
                            min_price,
                            max_price,
                            &self.weights,
                            self.vehicle_capacity_m3,
                        );
                        (score, candidate)
                    })
                    .collect();
                scored.sort_by(|a, b| {
                    b.0.total_cmp(&a.0)
                        .then(a.1.bid.created_at.cmp(&b.1.bid.created_at))
                        .then(a.1.bid.id.cmp(&b.1.bid.id))
                });
                ranked = scored.into_iter().map(|(_, candidate)| candidate).collect();
            }
        }

        ranked
    }

    /// Walks the ranking and keeps a candidate when its request has no winner
    /// yet and the parcels on overlapping segments still fit the vehicle.
    pub fn select(&self, route: &ReturnRoute, candidates: &[Candidate]) -> Vec<Uuid> {
        let mut chosen: Vec<&Candidate> = Vec::new();
        let mut matched_requests = HashSet::new();

        for candidate in self.rank(route, candidates) {
            if matched_requests.contains(&candidate.request.id) {
                continue;
            }

            let overlapping_volume: f64 = chosen
                .iter()
                .filter(|other| other.bid.segment.overlaps(&candidate.bid.segment))
                .map(|other| other.request.volume_m3)
                .sum();
            if overlapping_volume + candidate.request.volume_m3 > self.vehicle_capacity_m3 {
                continue;
            }

            matched_requests.insert(candidate.request.id);
            chosen.push(candidate);
        }

        chosen.into_iter().map(|candidate| candidate.bid.id).collect()
    }
}

pub fn compute_score(
    route: &ReturnRoute,
    candidate: &Candidate,
    min_price: Decimal,
    max_price: Decimal,
    weights: &ScoreWeights,
    vehicle_capacity_m3: f64,
) -> (f64, ScoreBreakdown) {
    let breakdown = ScoreBreakdown {
        price_score: price_score(candidate.bid.offered_price, min_price, max_price),
        volume_score: volume_score(candidate.request.volume_m3, vehicle_capacity_m3),
        distance_score: distance_score(route, &candidate.request),
        detour_score: detour_score(route, &candidate.request),
    };

    let score = weighted_score(&breakdown, weights);
    (score, breakdown)
}

pub fn weighted_score(breakdown: &ScoreBreakdown, weights: &ScoreWeights) -> f64 {
    (breakdown.price_score * weights.price)
        + (breakdown.volume_score * weights.volume)
        + (breakdown.distance_score * weights.distance)
        + (breakdown.detour_score * weights.detour)
}

fn price_range(candidates: &[Candidate]) -> (Decimal, Decimal) {
    let prices = candidates.iter().map(|candidate| candidate.bid.offered_price);
    let min = prices.clone().min().unwrap_or(Decimal::ZERO);
    let max = prices.max().unwrap_or(Decimal::ZERO);
    (min, max)
}

fn price_score(price: Decimal, min: Decimal, max: Decimal) -> f64 {
    let spread = (max - min).to_f64().unwrap_or(0.0);
    if spread <= 0.0 {
        return 0.5;
    }

    let offset = (price - min).to_f64().unwrap_or(0.0);
    (offset / spread).clamp(0.0, 1.0)
}

fn volume_score(volume_m3: f64, capacity_m3: f64) -> f64 {
    if capacity_m3 <= 0.0 {
        return 0.0;
    }

    (volume_m3 / capacity_m3).clamp(0.0, 1.0)
}

fn distance_score(route: &ReturnRoute, request: &ParcelRequest) -> f64 {
    let route_km = haversine_km(&route.origin, &route.destination);
    if route_km <= f64::EPSILON {
        return 0.0;
    }

    (haversine_km(&request.pickup, &request.dropoff) / route_km).clamp(0.0, 1.0)
}

fn detour_score(route: &ReturnRoute, request: &ParcelRequest) -> f64 {
    let detour = detour_fraction(
        &route.origin,
        &route.destination,
        &request.pickup,
        &request.dropoff,
    );
    1.0 - detour.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{AcceptancePolicy, Candidate, ScoreWeights, SelectionStrategy};
    use crate::geo::GeoPoint;
    use crate::models::bid::{Bid, BidStatus, Segment};
    use crate::models::request::{ParcelRequest, RequestStatus};
    use crate::models::route::{ReturnRoute, RouteStatus};

    fn route() -> ReturnRoute {
        let departure = Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap();
        ReturnRoute {
            id: Uuid::from_u128(1),
            driver_id: Uuid::from_u128(2),
            origin: GeoPoint { lat: 6.9271, lng: 79.8612 },
            destination: GeoPoint { lat: 7.2906, lng: 80.6337 },
            departure_time: departure,
            bidding_start: departure - Duration::days(1),
            detour_tolerance_km: Decimal::from(5),
            suggested_price_min: Decimal::from(50),
            suggested_price_max: Decimal::from(150),
            status: RouteStatus::Initiated,
            created_at: departure - Duration::days(2),
            updated_at: departure - Duration::days(2),
        }
    }

    fn candidate(
        seed: u128,
        price: i64,
        volume_m3: f64,
        segment: (u32, u32),
        age_mins: i64,
    ) -> Candidate {
        let placed = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        let created = placed - Duration::minutes(age_mins);
        let request = ParcelRequest {
            id: Uuid::from_u128(1_000 + seed),
            customer_id: Uuid::from_u128(2_000 + seed),
            pickup: GeoPoint { lat: 6.95, lng: 79.95 },
            dropoff: GeoPoint { lat: 7.2, lng: 80.5 },
            weight_kg: 5.0,
            volume_m3,
            max_budget: Decimal::from(500),
            deadline: created + Duration::days(3),
            description: None,
            status: RequestStatus::Open,
            matched_bid_id: None,
            created_at: created,
            updated_at: created,
        };
        let bid = Bid {
            id: Uuid::from_u128(seed),
            request_id: request.id,
            route_id: Uuid::from_u128(1),
            segment: Segment {
                start_index: segment.0,
                end_index: segment.1,
            },
            offered_price: Decimal::from(price),
            status: BidStatus::Pending,
            created_at: created,
            updated_at: created,
        };
        Candidate { bid, request }
    }

    fn policy(strategy: SelectionStrategy, capacity: f64) -> AcceptancePolicy {
        AcceptancePolicy {
            strategy,
            weights: ScoreWeights::default(),
            vehicle_capacity_m3: capacity,
        }
    }

    #[test]
    fn lowest_price_wins_and_ties_go_to_the_earliest_bid() {
        let candidates = vec![
            candidate(1, 100, 1.0, (0, 1), 10),
            candidate(2, 80, 1.0, (2, 3), 5),
            candidate(3, 80, 1.0, (4, 5), 30),
        ];

        let ranked = policy(SelectionStrategy::LowestPrice, 100.0).rank(&route(), &candidates);
        let ids: Vec<_> = ranked.iter().map(|c| c.bid.id).collect();

        assert_eq!(ids, vec![Uuid::from_u128(3), Uuid::from_u128(2), Uuid::from_u128(1)]);
    }

    #[test]
    fn weighted_policy_prefers_the_higher_offer_when_parcels_match() {
        let candidates = vec![
            candidate(1, 60, 2.0, (0, 1), 0),
            candidate(2, 140, 2.0, (2, 3), 0),
        ];

        let ranked = policy(SelectionStrategy::Weighted, 100.0).rank(&route(), &candidates);
        assert_eq!(ranked[0].bid.id, Uuid::from_u128(2));
    }

    #[test]
    fn overlapping_parcels_must_fit_the_vehicle() {
        let candidates = vec![
            candidate(1, 50, 6.0, (0, 4), 0),
            candidate(2, 60, 6.0, (3, 6), 0),
            candidate(3, 70, 6.0, (7, 9), 0),
        ];

        let selected = policy(SelectionStrategy::LowestPrice, 10.0).select(&route(), &candidates);
        assert_eq!(selected, vec![Uuid::from_u128(1), Uuid::from_u128(3)]);
    }

    #[test]
    fn one_winner_per_request() {
        let first = candidate(1, 50, 1.0, (0, 1), 0);
        let mut second = candidate(2, 40, 1.0, (2, 3), 0);
        second.request = first.request.clone();
        second.bid.request_id = first.request.id;

        let selected =
            policy(SelectionStrategy::LowestPrice, 100.0).select(&route(), &[first, second]);
        assert_eq!(selected, vec![Uuid::from_u128(2)]);
    }

    #[test]
    fn manual_policy_selects_nothing() {
        let candidates = vec![candidate(1, 50, 1.0, (0, 1), 0)];
        assert!(policy(SelectionStrategy::Manual, 100.0)
            .select(&route(), &candidates)
            .is_empty());
    }

    #[test]
    fn strategy_names_parse() {
        assert_eq!("weighted".parse::<SelectionStrategy>().unwrap(), SelectionStrategy::Weighted);
        assert!("cheapest".parse::<SelectionStrategy>().is_err());
    }
}
