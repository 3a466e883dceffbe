use std::sync::Arc;

use event_bus::EventEnvelope;

use crate::{LogChannel, NotificationChannel, render};

/// Fans a rendered notification out to every channel.
///
/// A failing channel is logged and skipped; the others still send.
#[derive(Clone)]
pub struct NotificationDispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    /// Email, push and SMS channels that write to the log.
    pub fn with_log_channels() -> Self {
        Self::new(LogChannel::all())
    }

    /// Renders and sends the notification for `envelope`.
    ///
    /// Returns how many channels accepted it.
    #[tracing::instrument(skip(self, envelope), fields(order_id = %envelope.order_id, event_type = %envelope.event_type))]
    pub async fn dispatch(&self, envelope: &EventEnvelope) -> usize {
        let Some(notification) = render(envelope) else {
            tracing::debug!("no template for event");
            return 0;
        };

        let mut sent = 0;
        for channel in &self.channels {
            let kind = channel.kind();
            match channel.send(&notification).await {
                Ok(()) => {
                    metrics::counter!("notifications_sent_total", "channel" => kind.as_str())
                        .increment(1);
                    sent += 1;
                }
                Err(err) => {
                    tracing::warn!(channel = %kind, error = %err, "notification not sent");
                }
            }
        }
        sent
    }
}
