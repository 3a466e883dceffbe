//! Saga error types.

use event_bus::EventBusError;
use thiserror::Error;

/// Errors that can occur while wiring the choreography.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A consumer group could not be registered.
    #[error("Subscription of {group} to {topic} failed: {source}")]
    Subscription {
        topic: event_bus::Topic,
        group: &'static str,
        #[source]
        source: EventBusError,
    },
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
