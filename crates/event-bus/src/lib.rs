//! Keyed publish/subscribe over a durable, append-only event log.
//!
//! Producers publish envelopes to a [`Topic`] keyed by order id. Consumers
//! join named groups: every group sees every message on a topic it subscribed
//! to, and inside a group each message is handled once. Messages sharing a key
//! reach a group in publish order and are never handled concurrently.

pub mod bus;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod log;
pub mod memory;
pub mod postgres;
pub mod retry;
pub mod testing;

pub use bus::{BusConfig, DeadLetter, EventBus, EventBusExt};
pub use dispatch::LogEventBus;
pub use envelope::{EventEnvelope, EventEnvelopeBuilder, EventId, EventType, Topic};
pub use error::{EventBusError, Result};
pub use handler::{EventHandler, HandlerError};
pub use log::{EventLog, LogRecord, Offset, partition_for};
pub use memory::InMemoryEventLog;
pub use postgres::PostgresEventLog;
pub use retry::RetryPolicy;
pub use testing::{NoopEventBus, PublishedEvent, RecordingEventBus};
