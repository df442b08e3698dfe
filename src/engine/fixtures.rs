use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::clock::{Clock, ManualClock};
use crate::config::LifecycleSettings;
use crate::geo::GeoPoint;
use crate::models::bid::{Bid, NewBid, Segment};
use crate::models::payment::{NewPayment, Payment, PaymentStatus, PaymentStatusUpdate};
use crate::models::request::{NewParcelRequest, ParcelRequest};
use crate::models::route::{NewRoute, ReturnRoute};
use crate::state::AppState;

/// Wired state on a manual clock, with shortcuts to common lifecycle points.
pub(crate) struct Harness {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let state = AppState::new(LifecycleSettings::default(), clock.clone(), 64);
        Self { state, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn new_route(
        &self,
        departure_time: DateTime<Utc>,
        bidding_start: Option<DateTime<Utc>>,
    ) -> NewRoute {
        NewRoute {
            driver_id: Uuid::new_v4(),
            origin: GeoPoint { lat: 6.9271, lng: 79.8612 },
            destination: GeoPoint { lat: 7.2906, lng: 80.6337 },
            departure_time,
            bidding_start,
            detour_tolerance_km: Decimal::from(5),
            suggested_price_min: Decimal::from(50),
            suggested_price_max: Decimal::from(150),
        }
    }

    pub fn route_departing(&self, departure_time: DateTime<Utc>) -> ReturnRoute {
        self.state
            .routes
            .open_route(self.new_route(departure_time, None))
            .unwrap()
    }

    pub fn new_request(&self, deadline: DateTime<Utc>) -> NewParcelRequest {
        NewParcelRequest {
            customer_id: Uuid::new_v4(),
            pickup: GeoPoint { lat: 6.95, lng: 79.95 },
            dropoff: GeoPoint { lat: 7.2, lng: 80.5 },
            weight_kg: 4.0,
            volume_m3: 2.0,
            max_budget: Decimal::from(300),
            deadline,
            description: None,
        }
    }

    pub fn request(&self) -> ParcelRequest {
        self.state
            .bids
            .create_request(self.new_request(self.now() + Duration::days(3)))
            .unwrap()
    }

    pub fn bid(&self, request_id: Uuid, route_id: Uuid, offered_price: Decimal) -> Bid {
        self.state
            .bids
            .place_bid(NewBid {
                request_id,
                route_id,
                segment: Segment {
                    start_index: 0,
                    end_index: 1,
                },
                offered_price,
            })
            .unwrap()
    }

    /// Accepted bid on a fresh route departing in 24 hours.
    pub fn accepted_bid(&self, offered_price: Decimal) -> Bid {
        let route = self.route_departing(self.now() + Duration::hours(24));
        let request = self.request();
        let bid = self.bid(request.id, route.id, offered_price);
        self.state.bids.accept_bid(bid.id).unwrap()
    }

    /// Accepted, picked up and delivered, with no payment yet.
    pub fn delivered_bid(&self, offered_price: Decimal) -> Bid {
        let bid = self.accepted_bid(offered_price);
        self.state.deliveries.mark_picked_up(bid.id, self.now()).unwrap();
        self.state.deliveries.mark_delivered(bid.id, self.now()).unwrap();
        bid
    }

    /// Delivered with a completed payment written straight to the store, so
    /// the bid is ready to settle but not settled yet.
    pub fn delivered_and_paid_bid(&self, offered_price: Decimal) -> Bid {
        let bid = self.delivered_bid(offered_price);
        let now = self.now();
        let payment = Payment {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            bid_id: bid.id,
            amount: offered_price,
            currency: "LKR".to_string(),
            status: PaymentStatus::Completed,
            transaction_id: Some("txn-fixture".to_string()),
            gateway_response: None,
            created_at: now,
            updated_at: now,
        };
        self.state.store.payments.insert(payment.id, payment);
        bid
    }

    pub fn pay(&self, bid_id: Uuid, amount: Decimal) -> Payment {
        self.state
            .payments
            .record_payment(NewPayment {
                user_id: Uuid::new_v4(),
                bid_id,
                amount,
                currency: None,
            })
            .unwrap()
    }

    pub fn complete_payment(&self, payment_id: Uuid) -> Payment {
        self.state
            .payments
            .update_status(
                payment_id,
                PaymentStatusUpdate {
                    status: PaymentStatus::Completed,
                    transaction_id: None,
                    gateway_response: None,
                },
            )
            .unwrap()
            .payment
    }
}
