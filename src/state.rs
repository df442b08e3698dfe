use std::sync::Arc;

use crate::clock::Clock;
use crate::config::LifecycleSettings;
use crate::engine::bids::BidLedger;
use crate::engine::delivery::DeliveryTracker;
use crate::engine::disputes::DisputeDesk;
use crate::engine::earnings::EarningsBook;
use crate::engine::payments::PaymentLedger;
use crate::engine::reviews::ReviewBook;
use crate::engine::routes::RouteWindowManager;
use crate::engine::settlement::SettlementTrigger;
use crate::engine::withdrawals::WithdrawalLedger;
use crate::observability::events::Telemetry;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<Store>,
    pub clock: Arc<dyn Clock>,
    pub settings: LifecycleSettings,
    pub telemetry: Telemetry,
    pub routes: RouteWindowManager,
    pub bids: BidLedger,
    pub deliveries: DeliveryTracker,
    pub settlement: SettlementTrigger,
    pub payments: PaymentLedger,
    pub earnings: EarningsBook,
    pub withdrawals: WithdrawalLedger,
    pub disputes: DisputeDesk,
    pub reviews: ReviewBook,
}

impl AppState {
    pub fn new(
        settings: LifecycleSettings,
        clock: Arc<dyn Clock>,
        event_buffer_size: usize,
    ) -> Self {
        let store = Arc::new(Store::new());
        let telemetry = Telemetry::new(event_buffer_size);

        let routes = RouteWindowManager::new(
            store.clone(),
            clock.clone(),
            settings.bid_closing_offset,
            telemetry.clone(),
        );
        let bids = BidLedger::new(
            store.clone(),
            clock.clone(),
            settings.bid_closing_offset,
            telemetry.clone(),
        );
        let settlement = SettlementTrigger::new(
            store.clone(),
            clock.clone(),
            settings.fee_policy,
            telemetry.clone(),
        );
        let deliveries = DeliveryTracker::new(
            store.clone(),
            settlement.clone(),
            routes.clone(),
            telemetry.clone(),
        );
        let payments = PaymentLedger::new(
            store.clone(),
            clock.clone(),
            settlement.clone(),
            telemetry.clone(),
        );
        let earnings = EarningsBook::new(store.clone(), clock.clone(), telemetry.clone());
        let withdrawals = WithdrawalLedger::new(store.clone(), clock.clone(), telemetry.clone());
        let disputes = DisputeDesk::new(store.clone(), clock.clone(), telemetry.clone());
        let reviews = ReviewBook::new(store.clone(), clock.clone(), telemetry.clone());

        Self {
            store,
            clock,
            settings,
            telemetry,
            routes,
            bids,
            deliveries,
            settlement,
            payments,
            earnings,
            withdrawals,
            disputes,
            reviews,
        }
    }
}
