//! Payment capture and refunds.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, UserId};
use event_bus::{EventBus, EventBusExt, EventEnvelope, EventType, Topic};
use tokio::sync::Mutex;

use crate::gateway::{APPROVED_RESPONSE, REFUND_RESPONSE};
use crate::{
    ChargeRequest, GatewayOutcome, Payment, PaymentError, PaymentGateway, PaymentRepository,
    PaymentRequest, PaymentState, Result,
};

/// Per-order serialization of capture. The slot holds a gateway verdict
/// that has not been stored yet.
type CaptureSlot = Arc<Mutex<Option<GatewayOutcome>>>;

pub struct PaymentService {
    repository: Arc<dyn PaymentRepository>,
    gateway: Arc<dyn PaymentGateway>,
    bus: Arc<dyn EventBus>,
    captures: std::sync::Mutex<HashMap<OrderId, CaptureSlot>>,
    refunds: Mutex<()>,
}

impl PaymentService {
    pub fn new(
        repository: Arc<dyn PaymentRepository>,
        gateway: Arc<dyn PaymentGateway>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            repository,
            gateway,
            bus,
            captures: std::sync::Mutex::new(HashMap::new()),
            refunds: Mutex::new(()),
        }
    }

    /// Captures payment for an order.
    ///
    /// If the order already has a finished payment, that record is returned
    /// untouched and the gateway is not called. Otherwise a PROCESSING record
    /// is stored, the gateway decides SUCCESS or FAILED, and
    /// `PAYMENT_COMPLETED` or `PAYMENT_FAILED` is published on
    /// `payment-events`.
    ///
    /// A record left in PROCESSING because storing the verdict failed is
    /// finished by the next call. The verdict is kept until it is stored, so
    /// the gateway is charged once.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id, amount = %request.amount))]
    pub async fn process_payment(&self, request: PaymentRequest) -> Result<Payment> {
        if !request.amount.is_positive() {
            return Err(PaymentError::Validation(format!(
                "amount must be positive, got {}",
                request.amount
            )));
        }

        let slot = self.capture_slot(request.order_id)?;
        let mut pending = slot.lock().await;

        let (mut payment, inserted) = self
            .repository
            .insert_if_absent(Payment::processing(&request))
            .await?;
        if inserted {
            tracing::info!(payment_id = %payment.id, "payment record created");
        } else if payment.status != PaymentState::Processing {
            tracing::debug!(payment_id = %payment.id, status = %payment.status, "payment already exists for order");
            return Ok(payment);
        } else {
            tracing::warn!(payment_id = %payment.id, "resuming unfinished payment");
        }

        let outcome = match pending.take() {
            Some(outcome) => outcome,
            None => {
                self.gateway
                    .charge(&ChargeRequest {
                        order_id: payment.order_id,
                        amount: payment.amount,
                    })
                    .await
            }
        };

        payment.completed_at = Some(Utc::now());
        let event_type = match &outcome {
            GatewayOutcome::Approved { transaction_id } => {
                tracing::info!(%transaction_id, "payment captured");
                payment.status = PaymentState::Success;
                payment.transaction_id = Some(transaction_id.clone());
                payment.gateway_response = Some(APPROVED_RESPONSE.to_string());
                EventType::PaymentCompleted
            }
            GatewayOutcome::Declined { reason } => {
                tracing::warn!(%reason, "payment declined");
                payment.status = PaymentState::Failed;
                payment.gateway_response = Some(reason.clone());
                EventType::PaymentFailed
            }
        };
        if let Err(err) = self.repository.save(&payment).await {
            tracing::error!(error = %err, "could not store payment verdict");
            *pending = Some(outcome);
            return Err(err);
        }

        metrics::counter!("payments_processed_total", "outcome" => payment.status.as_str())
            .increment(1);
        self.publish(&payment, event_type);
        Ok(payment)
    }

    /// Refunds a captured payment and publishes `REFUND_COMPLETED`.
    ///
    /// Only a payment in SUCCESS can be refunded.
    #[tracing::instrument(skip(self))]
    pub async fn process_refund(&self, order_id: OrderId) -> Result<Payment> {
        let _guard = self.refunds.lock().await;
        let mut payment = self.get_by_order(order_id).await?;

        if !payment.status.can_refund() {
            return Err(PaymentError::InvalidState {
                order_id,
                state: payment.status,
                action: "refund",
            });
        }

        payment.status = PaymentState::Refunded;
        payment.gateway_response = Some(REFUND_RESPONSE.to_string());
        self.repository.save(&payment).await?;

        metrics::counter!("refunds_processed_total").increment(1);
        tracing::info!(payment_id = %payment.id, amount = %payment.amount, "payment refunded");
        self.publish(&payment, EventType::RefundCompleted);
        Ok(payment)
    }

    pub async fn get_by_order(&self, order_id: OrderId) -> Result<Payment> {
        self.repository
            .get_by_order(order_id)
            .await?
            .ok_or(PaymentError::NotFound(order_id))
    }

    pub async fn get_by_user(&self, user_id: UserId) -> Result<Vec<Payment>> {
        self.repository.by_user(user_id).await
    }

    fn capture_slot(&self, order_id: OrderId) -> Result<CaptureSlot> {
        let mut captures = self
            .captures
            .lock()
            .map_err(|_| PaymentError::Repository("capture table poisoned".to_string()))?;
        Ok(captures.entry(order_id).or_default().clone())
    }

    fn publish(&self, payment: &Payment, event_type: EventType) {
        let mut envelope = EventEnvelope::builder(event_type, payment.order_id)
            .user_id(payment.user_id)
            .restaurant_id(payment.restaurant_id)
            .amount(payment.amount)
            .payment_status(payment.status.order_payment_status());
        if payment.status == PaymentState::Failed {
            if let Some(response) = &payment.gateway_response {
                envelope = envelope.reason(response.as_str());
            }
        }
        self.bus
            .publish_envelope(Topic::PaymentEvents, envelope.build());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use common::{Money, PaymentStatus, RestaurantId};
    use event_bus::RecordingEventBus;

    use super::*;
    use crate::gateway::DECLINED_RESPONSE;
    use crate::{InMemoryPaymentRepository, PaymentMethod, ScriptedGateway};

    struct Fixture {
        service: Arc<PaymentService>,
        gateway: ScriptedGateway,
        repository: InMemoryPaymentRepository,
        bus: RecordingEventBus,
    }

    fn fixture(gateway: ScriptedGateway) -> Fixture {
        let bus = RecordingEventBus::new();
        let repository = InMemoryPaymentRepository::new();
        let service = Arc::new(PaymentService::new(
            Arc::new(repository.clone()),
            Arc::new(gateway.clone()),
            Arc::new(bus.clone()),
        ));
        Fixture {
            service,
            gateway,
            repository,
            bus,
        }
    }

    fn request(order_id: OrderId) -> PaymentRequest {
        PaymentRequest {
            order_id,
            user_id: UserId::new(21),
            restaurant_id: Some(RestaurantId::new(4)),
            amount: Money::from_units(75),
            method: PaymentMethod::CreditCard,
        }
    }

    #[tokio::test]
    async fn test_approved_payment_succeeds_and_publishes() {
        let f = fixture(ScriptedGateway::approving());
        let order_id = OrderId::new();

        let payment = f.service.process_payment(request(order_id)).await.unwrap();

        assert_eq!(payment.status, PaymentState::Success);
        assert!(payment.transaction_id.as_deref().unwrap().starts_with("TXN"));
        assert_eq!(payment.gateway_response.as_deref(), Some(APPROVED_RESPONSE));
        assert!(payment.completed_at.is_some());
        assert_eq!(f.service.get_by_order(order_id).await.unwrap(), payment);

        let events = f.bus.published_to(Topic::PaymentEvents);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::PaymentCompleted);
        assert_eq!(events[0].payment_status, Some(PaymentStatus::Completed));
        assert_eq!(events[0].amount, Some(Money::from_units(75)));
        assert_eq!(events[0].restaurant_id, Some(RestaurantId::new(4)));
    }

    #[tokio::test]
    async fn test_declined_payment_fails_without_transaction() {
        let f = fixture(ScriptedGateway::declining());
        let order_id = OrderId::new();

        let payment = f.service.process_payment(request(order_id)).await.unwrap();

        assert_eq!(payment.status, PaymentState::Failed);
        assert!(payment.transaction_id.is_none());
        assert_eq!(payment.gateway_response.as_deref(), Some(DECLINED_RESPONSE));

        let events = f.bus.published_to(Topic::PaymentEvents);
        assert_eq!(events[0].event_type, EventType::PaymentFailed);
        assert_eq!(events[0].reason.as_deref(), Some(DECLINED_RESPONSE));
    }

    #[tokio::test]
    async fn test_replayed_request_returns_existing_payment() {
        let f = fixture(ScriptedGateway::approving());
        let order_id = OrderId::new();

        let first = f.service.process_payment(request(order_id)).await.unwrap();
        let second = f.service.process_payment(request(order_id)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(f.gateway.charge_count(), 1);
        assert_eq!(f.repository.count().await, 1);
        assert_eq!(f.bus.published_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_charge_once() {
        let f = fixture(ScriptedGateway::approving());
        let order_id = OrderId::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = f.service.clone();
            handles.push(tokio::spawn(async move {
                service.process_payment(request(order_id)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(f.gateway.charge_count(), 1);
        assert_eq!(f.repository.count().await, 1);
        assert_eq!(f.bus.published_count(), 1);
    }

    /// Repository whose next `save` fails, as a dropped connection would.
    struct FlakyRepository {
        inner: InMemoryPaymentRepository,
        fail_next_save: AtomicBool,
    }

    #[async_trait::async_trait]
    impl PaymentRepository for FlakyRepository {
        async fn insert_if_absent(&self, payment: Payment) -> Result<(Payment, bool)> {
            self.inner.insert_if_absent(payment).await
        }

        async fn save(&self, payment: &Payment) -> Result<()> {
            if self.fail_next_save.swap(false, Ordering::SeqCst) {
                return Err(PaymentError::Repository("connection reset".to_string()));
            }
            self.inner.save(payment).await
        }

        async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
            self.inner.get_by_order(order_id).await
        }

        async fn by_user(&self, user_id: UserId) -> Result<Vec<Payment>> {
            self.inner.by_user(user_id).await
        }
    }

    #[tokio::test]
    async fn test_retry_after_failed_save_finishes_payment() {
        let gateway = ScriptedGateway::approving();
        let bus = RecordingEventBus::new();
        let inner = InMemoryPaymentRepository::new();
        let service = PaymentService::new(
            Arc::new(FlakyRepository {
                inner: inner.clone(),
                fail_next_save: AtomicBool::new(true),
            }),
            Arc::new(gateway.clone()),
            Arc::new(bus.clone()),
        );
        let order_id = OrderId::new();

        let first = service.process_payment(request(order_id)).await;
        assert!(matches!(first, Err(PaymentError::Repository(_))));
        assert_eq!(
            inner.get_by_order(order_id).await.unwrap().unwrap().status,
            PaymentState::Processing
        );
        assert_eq!(bus.published_count(), 0);

        let retried = service.process_payment(request(order_id)).await.unwrap();

        assert_eq!(retried.status, PaymentState::Success);
        assert!(retried.transaction_id.is_some());
        assert_eq!(gateway.charge_count(), 1);
        assert_eq!(inner.get_by_order(order_id).await.unwrap().unwrap(), retried);
        assert_eq!(
            bus.event_types(Topic::PaymentEvents),
            vec![EventType::PaymentCompleted]
        );

        service.process_payment(request(order_id)).await.unwrap();
        assert_eq!(gateway.charge_count(), 1);
        assert_eq!(bus.published_count(), 1);
    }

    #[tokio::test]
    async fn test_rejects_non_positive_amount() {
        let f = fixture(ScriptedGateway::approving());
        let mut bad = request(OrderId::new());
        bad.amount = Money::zero();

        let result = f.service.process_payment(bad).await;

        assert!(matches!(result, Err(PaymentError::Validation(_))));
        assert_eq!(f.gateway.charge_count(), 0);
    }

    #[tokio::test]
    async fn test_refund_successful_payment() {
        let f = fixture(ScriptedGateway::approving());
        let order_id = OrderId::new();
        let captured = f.service.process_payment(request(order_id)).await.unwrap();
        f.bus.clear();

        let refunded = f.service.process_refund(order_id).await.unwrap();

        assert_eq!(refunded.status, PaymentState::Refunded);
        assert_eq!(refunded.gateway_response.as_deref(), Some(REFUND_RESPONSE));
        assert_eq!(refunded.transaction_id, captured.transaction_id);
        assert_eq!(
            f.bus.event_types(Topic::PaymentEvents),
            vec![EventType::RefundCompleted]
        );
        assert_eq!(
            f.bus.published_to(Topic::PaymentEvents)[0].payment_status,
            Some(PaymentStatus::Refunded)
        );
    }

    #[tokio::test]
    async fn test_refund_requires_success() {
        let f = fixture(ScriptedGateway::declining());
        let order_id = OrderId::new();
        f.service.process_payment(request(order_id)).await.unwrap();

        let result = f.service.process_refund(order_id).await;

        assert!(matches!(
            result,
            Err(PaymentError::InvalidState {
                state: PaymentState::Failed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_second_refund_is_rejected() {
        let f = fixture(ScriptedGateway::approving());
        let order_id = OrderId::new();
        f.service.process_payment(request(order_id)).await.unwrap();
        f.service.process_refund(order_id).await.unwrap();

        let result = f.service.process_refund(order_id).await;

        assert!(matches!(
            result,
            Err(PaymentError::InvalidState {
                state: PaymentState::Refunded,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_refund_without_payment_is_not_found() {
        let f = fixture(ScriptedGateway::approving());

        let result = f.service.process_refund(OrderId::new()).await;

        assert!(matches!(result, Err(PaymentError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_by_user() {
        let f = fixture(ScriptedGateway::approving());
        f.service.process_payment(request(OrderId::new())).await.unwrap();
        f.service.process_payment(request(OrderId::new())).await.unwrap();

        assert_eq!(f.service.get_by_user(UserId::new(21)).await.unwrap().len(), 2);
    }
}
