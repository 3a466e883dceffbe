//! Test doubles for the [`EventBus`] contract.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::{EventBus, EventEnvelope, EventHandler, EventType, HandlerError, Result, Topic};

/// Bus that accepts and discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventBus;

impl NoopEventBus {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventBus for NoopEventBus {
    fn publish(&self, topic: Topic, key: &str, envelope: EventEnvelope) {
        tracing::trace!(%topic, key, event_type = %envelope.event_type, "noop publish");
    }

    async fn subscribe(
        &self,
        _topic: Topic,
        _group: &str,
        _handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        Ok(())
    }
}

/// A message captured by [`RecordingEventBus`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub topic: Topic,
    pub key: String,
    pub envelope: EventEnvelope,
}

#[derive(Default)]
struct RecordingState {
    published: Vec<PublishedEvent>,
    subscriptions: Vec<(Topic, String, Arc<dyn EventHandler>)>,
}

/// Bus that records publishes and subscriptions without dispatching.
///
/// Tests drive handlers explicitly through [`RecordingEventBus::deliver`].
#[derive(Clone, Default)]
pub struct RecordingEventBus {
    state: Arc<RwLock<RecordingState>>,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything published so far.
    pub fn published(&self) -> Vec<PublishedEvent> {
        self.state.read().unwrap().published.clone()
    }

    /// Returns the envelopes published to `topic`.
    pub fn published_to(&self, topic: Topic) -> Vec<EventEnvelope> {
        self.state
            .read()
            .unwrap()
            .published
            .iter()
            .filter(|p| p.topic == topic)
            .map(|p| p.envelope.clone())
            .collect()
    }

    /// Returns the event types published to `topic`, in order.
    pub fn event_types(&self, topic: Topic) -> Vec<EventType> {
        self.published_to(topic)
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    pub fn published_count(&self) -> usize {
        self.state.read().unwrap().published.len()
    }

    /// Returns the (topic, group) pairs registered so far.
    pub fn subscriptions(&self) -> Vec<(Topic, String)> {
        self.state
            .read()
            .unwrap()
            .subscriptions
            .iter()
            .map(|(topic, group, _)| (*topic, group.clone()))
            .collect()
    }

    /// Hands an envelope to every handler subscribed to `topic`.
    pub async fn deliver(
        &self,
        topic: Topic,
        envelope: &EventEnvelope,
    ) -> Vec<std::result::Result<(), HandlerError>> {
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .state
            .read()
            .unwrap()
            .subscriptions
            .iter()
            .filter(|(t, _, _)| *t == topic)
            .map(|(_, _, handler)| handler.clone())
            .collect();

        let mut results = Vec::with_capacity(handlers.len());
        for handler in handlers {
            results.push(handler.handle(envelope).await);
        }
        results
    }

    /// Forgets all captured publishes.
    pub fn clear(&self) {
        self.state.write().unwrap().published.clear();
    }
}

#[async_trait]
impl EventBus for RecordingEventBus {
    fn publish(&self, topic: Topic, key: &str, envelope: EventEnvelope) {
        self.state.write().unwrap().published.push(PublishedEvent {
            topic,
            key: key.to_string(),
            envelope,
        });
    }

    async fn subscribe(
        &self,
        topic: Topic,
        group: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        self.state
            .write()
            .unwrap()
            .subscriptions
            .push((topic, group.to_string(), handler));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventBusExt;
    use common::OrderId;

    struct Echo;

    #[async_trait]
    impl EventHandler for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn handle(&self, envelope: &EventEnvelope) -> std::result::Result<(), HandlerError> {
            match envelope.event_type {
                EventType::OrderCreated => Ok(()),
                _ => Err(HandlerError::permanent("unexpected")),
            }
        }
    }

    #[tokio::test]
    async fn noop_bus_accepts_everything() {
        let bus = NoopEventBus::new();
        bus.publish_envelope(
            Topic::OrderEvents,
            EventEnvelope::builder(EventType::OrderCreated, OrderId::new()).build(),
        );
        bus.subscribe(Topic::OrderEvents, "g", Arc::new(Echo))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn recording_bus_captures_publishes() {
        let bus = RecordingEventBus::new();
        let order_id = OrderId::new();

        bus.publish_envelope(
            Topic::OrderEvents,
            EventEnvelope::builder(EventType::OrderCreated, order_id).build(),
        );
        bus.publish_envelope(
            Topic::PaymentEvents,
            EventEnvelope::builder(EventType::PaymentCompleted, order_id).build(),
        );

        assert_eq!(bus.published_count(), 2);
        assert_eq!(bus.published()[0].key, order_id.to_string());
        assert_eq!(bus.event_types(Topic::OrderEvents), vec![EventType::OrderCreated]);

        bus.clear();
        assert_eq!(bus.published_count(), 0);
    }

    #[tokio::test]
    async fn recording_bus_delivers_to_subscribers() {
        let bus = RecordingEventBus::new();
        bus.subscribe(Topic::OrderEvents, "g", Arc::new(Echo))
            .await
            .unwrap();
        assert_eq!(bus.subscriptions(), vec![(Topic::OrderEvents, "g".to_string())]);

        let ok = EventEnvelope::builder(EventType::OrderCreated, OrderId::new()).build();
        let bad = EventEnvelope::builder(EventType::OrderCancelled, OrderId::new()).build();
        assert_eq!(bus.deliver(Topic::OrderEvents, &ok).await, vec![Ok(())]);
        assert!(bus.deliver(Topic::OrderEvents, &bad).await[0].is_err());
        assert!(bus.deliver(Topic::DeliveryEvents, &ok).await.is_empty());
    }
}
