use thiserror::Error;

use crate::ChannelKind;

/// Errors that can occur while sending a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("{channel} channel failed: {message}")]
    Channel {
        channel: ChannelKind,
        message: String,
    },

    #[error("Notification has no recipient")]
    NoRecipient,
}

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotificationError>;
