use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{EventEnvelope, EventHandler, Offset, Result, RetryPolicy, Topic};

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BusConfig {
    /// Worker tasks per consumer group (one per partition).
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Dead letters kept for inspection. The oldest are dropped beyond this.
    pub dead_letter_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            retry: RetryPolicy::default(),
            dead_letter_capacity: 1000,
        }
    }
}

/// A message a consumer group gave up on.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub topic: Topic,
    pub group: String,
    pub handler: String,
    pub key: String,
    pub offset: Offset,
    pub envelope: EventEnvelope,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

/// Publish/subscribe contract used by every service.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes an envelope to `topic` under `key`.
    ///
    /// Never blocks on delivery and never fails the caller: by the time a
    /// service publishes, its own state change is already committed, so a
    /// publish failure is logged and counted instead of returned.
    fn publish(&self, topic: Topic, key: &str, envelope: EventEnvelope);

    /// Registers `handler` as the consumer for `group` on `topic`.
    ///
    /// A group that joins late first receives the topic backlog it has not
    /// committed yet, then live messages.
    async fn subscribe(&self, topic: Topic, group: &str, handler: Arc<dyn EventHandler>)
    -> Result<()>;
}

/// Extension trait providing convenience methods for event buses.
pub trait EventBusExt: EventBus {
    /// Publishes an envelope keyed by its order id.
    fn publish_envelope(&self, topic: Topic, envelope: EventEnvelope) {
        let key = envelope.key();
        self.publish(topic, &key, envelope);
    }
}

// Blanket implementation for all EventBus implementations
impl<T: EventBus + ?Sized> EventBusExt for T {}
