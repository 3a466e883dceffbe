use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderStatus, PartnerId, PaymentStatus, RestaurantId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EventBusError;

/// Unique identifier for a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The topics carried by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "order-events")]
    OrderEvents,
    #[serde(rename = "payment-events")]
    PaymentEvents,
    #[serde(rename = "delivery-events")]
    DeliveryEvents,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::OrderEvents, Topic::PaymentEvents, Topic::DeliveryEvents];

    /// Returns the topic name as it appears in the log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::OrderEvents => "order-events",
            Topic::PaymentEvents => "payment-events",
            Topic::DeliveryEvents => "delivery-events",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Topic {
    type Err = EventBusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EventBusError::UnknownTopic(s.to_string()))
    }
}

/// Event type tag carried by every envelope.
///
/// Tags this build does not know are kept verbatim in [`EventType::Unknown`]
/// so that consumers can log and skip them explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    OrderCreated,
    OrderStatusUpdated,
    OrderCancelled,
    PaymentCompleted,
    PaymentFailed,
    RefundCompleted,
    DeliveryAssigned,
    DeliveryPickedUp,
    DeliveryInTransit,
    DeliveryCompleted,
    DeliveryFailed,
    DeliveryCancelled,
    Unknown(String),
}

impl EventType {
    /// Returns the wire name of the event type.
    pub fn as_str(&self) -> &str {
        match self {
            EventType::OrderCreated => "ORDER_CREATED",
            EventType::OrderStatusUpdated => "ORDER_STATUS_UPDATED",
            EventType::OrderCancelled => "ORDER_CANCELLED",
            EventType::PaymentCompleted => "PAYMENT_COMPLETED",
            EventType::PaymentFailed => "PAYMENT_FAILED",
            EventType::RefundCompleted => "REFUND_COMPLETED",
            EventType::DeliveryAssigned => "DELIVERY_ASSIGNED",
            EventType::DeliveryPickedUp => "DELIVERY_PICKED_UP",
            EventType::DeliveryInTransit => "DELIVERY_IN_TRANSIT",
            EventType::DeliveryCompleted => "DELIVERY_COMPLETED",
            EventType::DeliveryFailed => "DELIVERY_FAILED",
            EventType::DeliveryCancelled => "DELIVERY_CANCELLED",
            EventType::Unknown(raw) => raw,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, EventType::Unknown(_))
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "ORDER_CREATED" => EventType::OrderCreated,
            "ORDER_STATUS_UPDATED" => EventType::OrderStatusUpdated,
            "ORDER_CANCELLED" => EventType::OrderCancelled,
            "PAYMENT_COMPLETED" => EventType::PaymentCompleted,
            "PAYMENT_FAILED" => EventType::PaymentFailed,
            "REFUND_COMPLETED" => EventType::RefundCompleted,
            "DELIVERY_ASSIGNED" => EventType::DeliveryAssigned,
            "DELIVERY_PICKED_UP" => EventType::DeliveryPickedUp,
            "DELIVERY_IN_TRANSIT" => EventType::DeliveryInTransit,
            "DELIVERY_COMPLETED" => EventType::DeliveryCompleted,
            "DELIVERY_FAILED" => EventType::DeliveryFailed,
            "DELIVERY_CANCELLED" => EventType::DeliveryCancelled,
            other => EventType::Unknown(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        EventType::from(s.as_str())
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.as_str().to_string()
    }
}

/// The message published on the bus.
///
/// Envelopes are immutable once published. A service that reacts to an
/// envelope and publishes a follow-up builds a fresh one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identifier for this event.
    pub event_id: EventId,

    pub event_type: EventType,

    /// The order this event belongs to; also the partition key.
    pub order_id: OrderId,

    pub user_id: Option<UserId>,
    pub restaurant_id: Option<RestaurantId>,
    pub delivery_partner_id: Option<PartnerId>,

    /// Order final amount or captured/refunded payment amount.
    pub amount: Option<Money>,

    pub order_status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,

    /// Free-text detail, e.g. a gateway decline reason.
    pub reason: Option<String>,

    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    /// Creates a new envelope builder for the given type and order.
    pub fn builder(event_type: EventType, order_id: OrderId) -> EventEnvelopeBuilder {
        EventEnvelopeBuilder {
            event_id: None,
            event_type,
            order_id,
            user_id: None,
            restaurant_id: None,
            delivery_partner_id: None,
            amount: None,
            order_status: None,
            payment_status: None,
            reason: None,
            timestamp: None,
        }
    }

    /// The partition key for this envelope.
    pub fn key(&self) -> String {
        self.order_id.to_string()
    }
}

/// Builder for constructing event envelopes.
#[derive(Debug)]
pub struct EventEnvelopeBuilder {
    event_id: Option<EventId>,
    event_type: EventType,
    order_id: OrderId,
    user_id: Option<UserId>,
    restaurant_id: Option<RestaurantId>,
    delivery_partner_id: Option<PartnerId>,
    amount: Option<Money>,
    order_status: Option<OrderStatus>,
    payment_status: Option<PaymentStatus>,
    reason: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

impl EventEnvelopeBuilder {
    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    pub fn user_id(mut self, user_id: impl Into<Option<UserId>>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn restaurant_id(mut self, restaurant_id: impl Into<Option<RestaurantId>>) -> Self {
        self.restaurant_id = restaurant_id.into();
        self
    }

    pub fn delivery_partner_id(mut self, partner_id: impl Into<Option<PartnerId>>) -> Self {
        self.delivery_partner_id = partner_id.into();
        self
    }

    pub fn amount(mut self, amount: impl Into<Option<Money>>) -> Self {
        self.amount = amount.into();
        self
    }

    pub fn order_status(mut self, status: impl Into<Option<OrderStatus>>) -> Self {
        self.order_status = status.into();
        self
    }

    pub fn payment_status(mut self, status: impl Into<Option<PaymentStatus>>) -> Self {
        self.payment_status = status.into();
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Builds the event envelope.
    pub fn build(self) -> EventEnvelope {
        EventEnvelope {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self.event_type,
            order_id: self.order_id,
            user_id: self.user_id,
            restaurant_id: self.restaurant_id,
            delivery_partner_id: self.delivery_partner_id,
            amount: self.amount,
            order_status: self.order_status,
            payment_status: self.payment_status,
            reason: self.reason,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}
