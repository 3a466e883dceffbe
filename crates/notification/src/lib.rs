//! Notification dispatcher.
//!
//! A terminal consumer of every saga topic. Each event is rendered into a
//! templated message and sent over every configured channel. Nothing is
//! written back to the saga and send failures never reach the bus.

pub mod channel;
pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod template;

pub use channel::{ChannelKind, LogChannel, NotificationChannel, RecordingChannel};
pub use consumer::NotificationConsumer;
pub use dispatcher::NotificationDispatcher;
pub use error::{NotificationError, Result};
pub use template::{Notification, render};
