use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::settlement::SettlementTrigger;
use crate::clock::Clock;
use crate::error::AppError;
use crate::models::bid::BidStatus;
use crate::models::earnings::Earnings;
use crate::models::event::{EntityKind, LifecycleEvent};
use crate::models::payment::{
    DEFAULT_CURRENCY, NewPayment, Payment, PaymentStatus, PaymentStatusUpdate,
};
use crate::observability::events::Telemetry;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct PaymentUpdate {
    pub payment: Payment,
    /// Set when completing the payment settled the delivery.
    pub earnings: Option<Earnings>,
}

#[derive(Clone)]
pub struct PaymentLedger {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    settlement: SettlementTrigger,
    telemetry: Telemetry,
}

impl PaymentLedger {
    pub fn new(
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
        settlement: SettlementTrigger,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            store,
            clock,
            settlement,
            telemetry,
        }
    }

    pub fn payment(&self, payment_id: Uuid) -> Result<Payment, AppError> {
        self.store
            .payment(payment_id)
            .ok_or_else(|| AppError::NotFound(format!("payment {payment_id} not found")))
    }

    pub fn payments_for_bid(&self, bid_id: Uuid) -> Result<Vec<Payment>, AppError> {
        if self.store.bid(bid_id).is_none() {
            return Err(AppError::NotFound(format!("bid {bid_id} not found")));
        }
        Ok(self.store.payments_for_bid(bid_id))
    }

    /// Records a PENDING payment for an accepted bid. Refused while the bid
    /// already has a payment that is pending or completed.
    pub fn record_payment(&self, new_payment: NewPayment) -> Result<Payment, AppError> {
        if new_payment.amount <= Decimal::ZERO {
            return Err(AppError::BadRequest("amount must be positive".to_string()));
        }

        let now = self.clock.now();
        let payment = {
            // The bid row lock serializes payments recorded for one bid.
            let bid = self.store.bids.get_mut(&new_payment.bid_id).ok_or_else(|| {
                AppError::NotFound(format!("bid {} not found", new_payment.bid_id))
            })?;
            if bid.status != BidStatus::Accepted {
                return Err(self.telemetry.failed(
                    "record_payment",
                    AppError::InvalidState(format!(
                        "bid {} is {}, only ACCEPTED bids are paid",
                        bid.id, bid.status
                    )),
                ));
            }

            let open = self.store.payments_for_bid(bid.id).into_iter().find(|payment| {
                matches!(payment.status, PaymentStatus::Pending | PaymentStatus::Completed)
            });
            if let Some(open) = open {
                return Err(self.telemetry.failed(
                    "record_payment",
                    AppError::InvalidState(format!(
                        "bid {} already has payment {} in status {}",
                        bid.id, open.id, open.status
                    )),
                ));
            }

            let payment = Payment {
                id: Uuid::new_v4(),
                user_id: new_payment.user_id,
                bid_id: bid.id,
                amount: new_payment.amount,
                currency: new_payment
                    .currency
                    .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
                status: PaymentStatus::Pending,
                transaction_id: None,
                gateway_response: None,
                created_at: now,
                updated_at: now,
            };
            self.store.payments.insert(payment.id, payment.clone());
            payment
        };

        self.publish(&payment);
        info!(
            payment_id = %payment.id,
            bid_id = %payment.bid_id,
            amount = %payment.amount,
            "payment recorded"
        );

        Ok(payment)
    }

    /// Moves a payment forward. Completing it settles the delivery when the
    /// parcel has already been delivered.
    pub fn update_status(
        &self,
        payment_id: Uuid,
        update: PaymentStatusUpdate,
    ) -> Result<PaymentUpdate, AppError> {
        let now = self.clock.now();
        let payment = {
            let mut payment = self.store.payments.get_mut(&payment_id).ok_or_else(|| {
                AppError::NotFound(format!("payment {payment_id} not found"))
            })?;

            if !payment.status.can_transition_to(update.status) {
                return Err(self.telemetry.failed(
                    "update_payment",
                    AppError::InvalidState(format!(
                        "payment {payment_id} cannot move from {} to {}",
                        payment.status, update.status
                    )),
                ));
            }

            payment.status = update.status;
            if update.transaction_id.is_some() {
                payment.transaction_id = update.transaction_id;
            }
            if update.gateway_response.is_some() {
                payment.gateway_response = update.gateway_response;
            }
            payment.updated_at = now;
            payment.clone()
        };

        self.publish(&payment);
        info!(payment_id = %payment_id, status = %payment.status, "payment status updated");

        let earnings = if payment.status == PaymentStatus::Completed {
            self.settlement.settle_if_ready(payment.bid_id)?
        } else {
            None
        };

        Ok(PaymentUpdate { payment, earnings })
    }

    fn publish(&self, payment: &Payment) {
        self.telemetry.publish(LifecycleEvent::new(
            EntityKind::Payment,
            payment.id,
            payment.status.as_str(),
            payment.updated_at,
        ));
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;
    use uuid::Uuid;

    use crate::engine::fixtures::Harness;
    use crate::error::AppError;
    use crate::models::payment::{NewPayment, PaymentStatus, PaymentStatusUpdate};

    fn update(status: PaymentStatus) -> PaymentStatusUpdate {
        PaymentStatusUpdate {
            status,
            transaction_id: None,
            gateway_response: None,
        }
    }

    #[test]
    fn completing_a_payment_settles_a_delivered_bid() {
        let h = Harness::new();
        let bid = h.delivered_bid(Decimal::from(200));
        let payment = h.pay(bid.id, Decimal::from(200));
        assert_eq!(payment.currency, "LKR");
        assert_eq!(h.state.store.counts().earnings, 0);

        let outcome = h
            .state
            .payments
            .update_status(
                payment.id,
                PaymentStatusUpdate {
                    status: PaymentStatus::Completed,
                    transaction_id: Some("txn-42".to_string()),
                    gateway_response: Some(json!({"code": "00"})),
                },
            )
            .unwrap();

        assert_eq!(outcome.payment.transaction_id.as_deref(), Some("txn-42"));
        let earnings = outcome.earnings.unwrap();
        assert_eq!(earnings.gross_amount, Decimal::from(200));
        assert_eq!(earnings.net_amount, Decimal::from(180));
    }

    #[test]
    fn completing_before_delivery_defers_settlement() {
        let h = Harness::new();
        let bid = h.accepted_bid(Decimal::from(80));
        let payment = h.pay(bid.id, Decimal::from(80));

        let outcome = h
            .state
            .payments
            .update_status(payment.id, update(PaymentStatus::Completed))
            .unwrap();
        assert!(outcome.earnings.is_none());
        assert_eq!(outcome.payment.status, PaymentStatus::Completed);
    }

    #[test]
    fn illegal_transitions_are_refused() {
        let h = Harness::new();
        let bid = h.accepted_bid(Decimal::from(80));
        let payment = h.pay(bid.id, Decimal::from(80));

        h.state
            .payments
            .update_status(payment.id, update(PaymentStatus::Failed))
            .unwrap();
        let err = h
            .state
            .payments
            .update_status(payment.id, update(PaymentStatus::Completed))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(
            h.state.store.payment(payment.id).unwrap().status,
            PaymentStatus::Failed
        );
    }

    #[test]
    fn a_bid_takes_one_open_payment_at_a_time() {
        let h = Harness::new();
        let bid = h.accepted_bid(Decimal::from(80));
        let first = h.pay(bid.id, Decimal::from(80));

        let new_payment = || NewPayment {
            user_id: Uuid::new_v4(),
            bid_id: bid.id,
            amount: Decimal::from(80),
            currency: None,
        };
        let while_pending = h.state.payments.record_payment(new_payment());
        assert!(matches!(while_pending, Err(AppError::InvalidState(_))));

        h.state
            .payments
            .update_status(first.id, update(PaymentStatus::Failed))
            .unwrap();
        let retry = h.state.payments.record_payment(new_payment()).unwrap();
        h.complete_payment(retry.id);

        let after_completion = h.state.payments.record_payment(new_payment());
        assert!(matches!(after_completion, Err(AppError::InvalidState(_))));

        let ids: Vec<_> = h
            .state
            .payments
            .payments_for_bid(bid.id)
            .unwrap()
            .into_iter()
            .map(|payment| payment.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.id) && ids.contains(&retry.id));
    }

    #[test]
    fn only_accepted_bids_take_payments() {
        let h = Harness::new();
        let route = h.route_departing(h.now() + chrono::Duration::hours(24));
        let request = h.request();
        let bid = h.bid(request.id, route.id, Decimal::from(30));

        let err = h
            .state
            .payments
            .record_payment(NewPayment {
                user_id: request.customer_id,
                bid_id: bid.id,
                amount: Decimal::from(30),
                currency: None,
            })
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let missing = h.state.payments.record_payment(NewPayment {
            user_id: request.customer_id,
            bid_id: Uuid::new_v4(),
            amount: Decimal::from(30),
            currency: None,
        });
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }
}
