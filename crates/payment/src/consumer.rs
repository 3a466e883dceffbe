//! Payment-side reactions: capture on `ORDER_CREATED`, refund on
//! `DELIVERY_FAILED`.

use std::sync::Arc;

use async_trait::async_trait;
use event_bus::{EventEnvelope, EventHandler, EventType, HandlerError};

use crate::{PaymentError, PaymentMethod, PaymentRequest, PaymentService, PaymentState};

pub struct PaymentEventConsumer {
    service: Arc<PaymentService>,
}

impl PaymentEventConsumer {
    pub fn new(service: Arc<PaymentService>) -> Self {
        Self { service }
    }

    async fn on_order_created(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        let user_id = envelope
            .user_id
            .ok_or_else(|| HandlerError::permanent("ORDER_CREATED without a user id"))?;
        let amount = envelope
            .amount
            .ok_or_else(|| HandlerError::permanent("ORDER_CREATED without an amount"))?;

        let payment = self
            .service
            .process_payment(PaymentRequest {
                order_id: envelope.order_id,
                user_id,
                restaurant_id: envelope.restaurant_id,
                amount,
                method: PaymentMethod::default(),
            })
            .await?;
        tracing::debug!(status = %payment.status, "payment handled");
        Ok(())
    }

    async fn on_delivery_failed(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        match self.service.process_refund(envelope.order_id).await {
            Ok(_) => Ok(()),
            Err(PaymentError::InvalidState {
                state: PaymentState::Refunded,
                ..
            }) => {
                tracing::debug!("payment already refunded");
                Ok(())
            }
            Err(err @ (PaymentError::InvalidState { .. } | PaymentError::NotFound(_))) => {
                tracing::warn!(error = %err, "nothing to refund for failed delivery");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl EventHandler for PaymentEventConsumer {
    fn name(&self) -> &str {
        "payment-service"
    }

    #[tracing::instrument(skip(self, envelope), fields(order_id = %envelope.order_id, event_type = %envelope.event_type))]
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        match &envelope.event_type {
            EventType::OrderCreated => self.on_order_created(envelope).await,
            EventType::DeliveryFailed => self.on_delivery_failed(envelope).await,
            EventType::Unknown(tag) => {
                tracing::warn!(tag = %tag, "ignoring unknown event type");
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
