use async_trait::async_trait;
use event_bus::{EventEnvelope, EventHandler, EventType, HandlerError, Topic};

use crate::NotificationDispatcher;

/// Notifies users about events on one topic.
///
/// `order-events` also carries copies of `PAYMENT_COMPLETED` and
/// `DELIVERY_ASSIGNED` that drive the saga. Those are skipped there so the
/// user hears about each outcome once, from the topic that owns it.
pub struct NotificationConsumer {
    dispatcher: NotificationDispatcher,
    topic: Topic,
}

impl NotificationConsumer {
    pub fn new(dispatcher: NotificationDispatcher, topic: Topic) -> Self {
        Self { dispatcher, topic }
    }

    fn is_mirror(&self, event_type: &EventType) -> bool {
        self.topic == Topic::OrderEvents
            && matches!(
                event_type,
                EventType::PaymentCompleted | EventType::DeliveryAssigned
            )
    }
}

#[async_trait]
impl EventHandler for NotificationConsumer {
    fn name(&self) -> &str {
        "notification-service"
    }

    #[tracing::instrument(skip(self, envelope), fields(topic = %self.topic, order_id = %envelope.order_id, event_type = %envelope.event_type))]
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        if self.is_mirror(&envelope.event_type) {
            tracing::trace!("skipping saga trigger copy");
            return Ok(());
        }
        let sent = self.dispatcher.dispatch(envelope).await;
        tracing::debug!(sent, "notification dispatched");
        Ok(())
    }
}
