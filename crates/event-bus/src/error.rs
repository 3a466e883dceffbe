use thiserror::Error;

use crate::{EventId, Topic};

/// Errors that can occur when interacting with the event bus or its log.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// An envelope with the same event id was already appended.
    #[error("Event {0} already appended to the log")]
    DuplicateEvent(EventId),

    /// The consumer group already has a handler on this topic.
    #[error("Group '{group}' is already subscribed to {topic}")]
    DuplicateSubscription { topic: Topic, group: String },

    /// A stored topic name did not match any known topic.
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// The dispatcher task has stopped and accepts no more commands.
    #[error("Event bus is closed")]
    Closed,

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event bus operations.
pub type Result<T> = std::result::Result<T, EventBusError>;
