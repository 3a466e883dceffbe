//! Consumer-side handler contract.

use async_trait::async_trait;
use thiserror::Error;

use crate::EventEnvelope;

/// Failure reported by a handler.
///
/// Only transient failures are retried by the bus; permanent ones go straight
/// to the dead-letter list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn transient(err: impl std::fmt::Display) -> Self {
        HandlerError::Transient(err.to_string())
    }

    pub fn permanent(err: impl std::fmt::Display) -> Self {
        HandlerError::Permanent(err.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Transient(_))
    }
}

/// A consumer registered with the bus for one (topic, group) pair.
///
/// Handlers see every message on their topic and are expected to ignore the
/// event types they do not care about. Delivery is at-least-once, so
/// handlers must be idempotent.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and dead-letter records.
    fn name(&self) -> &str;

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError>;
}
