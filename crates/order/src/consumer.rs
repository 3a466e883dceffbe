//! Order-side reactions to payment and delivery outcomes.

use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderStatus, PaymentStatus};
use event_bus::{EventEnvelope, EventHandler, EventType, HandlerError};

use crate::OrderService;

/// Keeps orders in step with `payment-events` and `delivery-events`.
pub struct OrderEventConsumer {
    service: Arc<OrderService>,
}

impl OrderEventConsumer {
    pub fn new(service: Arc<OrderService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for OrderEventConsumer {
    fn name(&self) -> &str {
        "order-service"
    }

    #[tracing::instrument(skip(self, envelope), fields(order_id = %envelope.order_id, event_type = %envelope.event_type))]
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        let order_id = envelope.order_id;

        match &envelope.event_type {
            EventType::PaymentCompleted => {
                self.service
                    .update_payment_status(order_id, PaymentStatus::Completed)
                    .await?;
            }
            EventType::PaymentFailed => {
                self.service
                    .update_payment_status(order_id, PaymentStatus::Failed)
                    .await?;
            }
            EventType::RefundCompleted => {
                self.service
                    .update_payment_status(order_id, PaymentStatus::Refunded)
                    .await?;
            }
            EventType::DeliveryAssigned => {
                let partner_id = envelope.delivery_partner_id.ok_or_else(|| {
                    HandlerError::permanent("DELIVERY_ASSIGNED without a delivery partner")
                })?;
                self.service
                    .assign_delivery_partner(order_id, partner_id)
                    .await?;
            }
            EventType::DeliveryPickedUp => {
                self.service
                    .update_status(order_id, OrderStatus::PickedUp)
                    .await?;
            }
            EventType::DeliveryCompleted => {
                self.service
                    .update_status(order_id, OrderStatus::Delivered)
                    .await?;
            }
            EventType::Unknown(tag) => {
                tracing::warn!(tag = %tag, "ignoring unknown event type");
            }
            _ => {
                tracing::trace!("event not relevant to orders");
            }
        }
        Ok(())
    }
}
