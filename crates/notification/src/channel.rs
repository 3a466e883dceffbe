//! Delivery channels for notifications.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;

use crate::{Notification, NotificationError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelKind {
    Email,
    Sms,
    Push,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
            ChannelKind::Push => "push",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A way of reaching a user.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Channel that "sends" by writing the message to the log.
#[derive(Debug, Clone, Copy)]
pub struct LogChannel {
    kind: ChannelKind,
}

impl LogChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self { kind }
    }

    /// Email, push and SMS, in that order.
    pub fn all() -> Vec<Arc<dyn NotificationChannel>> {
        [ChannelKind::Email, ChannelKind::Push, ChannelKind::Sms]
            .into_iter()
            .map(|kind| Arc::new(LogChannel::new(kind)) as Arc<dyn NotificationChannel>)
            .collect()
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let user_id = notification.user_id.ok_or(NotificationError::NoRecipient)?;
        match self.kind {
            ChannelKind::Email => tracing::info!(
                channel = %self.kind,
                %user_id,
                order_id = %notification.order_id,
                subject = notification.title,
                body = %notification.body,
                "notification sent"
            ),
            ChannelKind::Sms | ChannelKind::Push => tracing::info!(
                channel = %self.kind,
                %user_id,
                order_id = %notification.order_id,
                subject = notification.title,
                "notification sent"
            ),
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    sent: Vec<Notification>,
    fail: bool,
}

/// In-memory channel for testing.
#[derive(Debug, Clone)]
pub struct RecordingChannel {
    kind: ChannelKind,
    state: Arc<RwLock<RecordingState>>,
}

impl RecordingChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            state: Arc::default(),
        }
    }

    /// Makes every following send fail.
    pub fn set_fail(&self, fail: bool) {
        self.state.write().unwrap().fail = fail;
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.state.read().unwrap().sent.clone()
    }

    pub fn titles(&self) -> Vec<&'static str> {
        self.state.read().unwrap().sent.iter().map(|n| n.title).collect()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail {
            return Err(NotificationError::Channel {
                channel: self.kind,
                message: "provider unavailable".to_string(),
            });
        }
        state.sent.push(notification.clone());
        Ok(())
    }
}
