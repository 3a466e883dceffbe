//! Delivery-side reactions: assign on payment, cancel with the order,
//! optionally reassign after a failure.

use std::sync::Arc;

use async_trait::async_trait;
use event_bus::{EventEnvelope, EventHandler, EventType, HandlerError};

use crate::{AssignmentRequest, DeliveryError, DeliveryService, DeliveryStatus};

pub struct DeliveryEventConsumer {
    service: Arc<DeliveryService>,
    reassign_on_failure: bool,
}

impl DeliveryEventConsumer {
    pub fn new(service: Arc<DeliveryService>) -> Self {
        let reassign_on_failure = service.config().reassign_on_failure;
        Self {
            service,
            reassign_on_failure,
        }
    }

    async fn on_payment_completed(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        let request = AssignmentRequest {
            order_id: envelope.order_id,
            user_id: envelope.user_id,
            restaurant_id: envelope.restaurant_id,
        };
        match self.service.assign(request).await {
            Ok(delivery) => {
                tracing::debug!(delivery_id = %delivery.id, "delivery assignment handled");
                Ok(())
            }
            Err(err @ DeliveryError::NoPartnerAvailable) => {
                tracing::error!(error = %err, "order is paid but has no delivery partner");
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn on_delivery_failed(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        if !self.reassign_on_failure {
            return Ok(());
        }
        let current = self.service.by_order(envelope.order_id).await?;
        if current.status != DeliveryStatus::Failed {
            tracing::debug!(status = %current.status, "delivery no longer failed, not reassigning");
            return Ok(());
        }
        match self.service.reassign(envelope.order_id).await {
            Ok(_) => Ok(()),
            Err(DeliveryError::InvalidState { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl EventHandler for DeliveryEventConsumer {
    fn name(&self) -> &str {
        "delivery-service"
    }

    #[tracing::instrument(skip(self, envelope), fields(order_id = %envelope.order_id, event_type = %envelope.event_type))]
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        match &envelope.event_type {
            EventType::PaymentCompleted => self.on_payment_completed(envelope).await,
            EventType::OrderCancelled => {
                self.service.cancel(envelope.order_id).await?;
                Ok(())
            }
            EventType::DeliveryFailed => self.on_delivery_failed(envelope).await,
            EventType::Unknown(tag) => {
                tracing::warn!(tag = %tag, "ignoring unknown event type");
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
