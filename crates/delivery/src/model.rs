//! Delivery records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{DeliveryId, OrderId, ParseStatusError, PartnerId, RestaurantId, UserId};
use event_bus::EventType;
use serde::{Deserialize, Serialize};

/// Assignment settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryConfig {
    /// Offset from assignment to the estimated delivery time.
    pub estimated_delivery: Duration,
    /// Reassign automatically when a delivery fails.
    pub reassign_on_failure: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            estimated_delivery: Duration::from_secs(30 * 60),
            reassign_on_failure: false,
        }
    }
}

/// Status of a delivery.
///
/// ```text
/// Assigned ──► PickedUp ──► InTransit ──► Delivered
///    │            │             │
///    └────────────┴─────────────┴──► Failed | Cancelled
/// ```
///
/// Forward jumps along the main line are legal. Delivered, Failed and
/// Cancelled are terminal and release the partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Failed,
    Cancelled,
}

impl DeliveryStatus {
    fn rank(&self) -> Option<u8> {
        match self {
            DeliveryStatus::Assigned => Some(0),
            DeliveryStatus::PickedUp => Some(1),
            DeliveryStatus::InTransit => Some(2),
            DeliveryStatus::Delivered => Some(3),
            DeliveryStatus::Failed | DeliveryStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered | DeliveryStatus::Failed | DeliveryStatus::Cancelled
        )
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    /// Re-applying the current status returns false.
    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        if self.is_terminal() || *self == next {
            return false;
        }
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => to > from,
            (_, None) => true,
            (None, Some(_)) => false,
        }
    }

    /// The event published when a delivery enters this status.
    pub fn event_type(&self) -> EventType {
        match self {
            DeliveryStatus::Assigned => EventType::DeliveryAssigned,
            DeliveryStatus::PickedUp => EventType::DeliveryPickedUp,
            DeliveryStatus::InTransit => EventType::DeliveryInTransit,
            DeliveryStatus::Delivered => EventType::DeliveryCompleted,
            DeliveryStatus::Failed => EventType::DeliveryFailed,
            DeliveryStatus::Cancelled => EventType::DeliveryCancelled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Assigned => "ASSIGNED",
            DeliveryStatus::PickedUp => "PICKED_UP",
            DeliveryStatus::InTransit => "IN_TRANSIT",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Failed => "FAILED",
            DeliveryStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ASSIGNED" => Ok(DeliveryStatus::Assigned),
            "PICKED_UP" => Ok(DeliveryStatus::PickedUp),
            "IN_TRANSIT" => Ok(DeliveryStatus::InTransit),
            "DELIVERED" => Ok(DeliveryStatus::Delivered),
            "FAILED" => Ok(DeliveryStatus::Failed),
            "CANCELLED" => Ok(DeliveryStatus::Cancelled),
            _ => Err(ParseStatusError {
                kind: "delivery status",
                value: s.to_string(),
            }),
        }
    }
}

/// What the assigner knows about an order when it is paid for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRequest {
    pub order_id: OrderId,
    pub user_id: Option<UserId>,
    pub restaurant_id: Option<RestaurantId>,
}

impl AssignmentRequest {
    pub fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            user_id: None,
            restaurant_id: None,
        }
    }
}

/// The single delivery record of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: DeliveryId,
    pub order_id: OrderId,
    pub partner_id: PartnerId,
    pub user_id: Option<UserId>,
    pub restaurant_id: Option<RestaurantId>,
    pub pickup_address: Option<String>,
    pub delivery_address: Option<String>,
    pub status: DeliveryStatus,
    pub assigned_at: DateTime<Utc>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub estimated_delivery_time: DateTime<Utc>,
    pub notes: Option<String>,
}

impl Delivery {
    pub fn assigned(request: &AssignmentRequest, partner_id: PartnerId, eta: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: DeliveryId::new(),
            order_id: request.order_id,
            partner_id,
            user_id: request.user_id,
            restaurant_id: request.restaurant_id,
            pickup_address: None,
            delivery_address: None,
            status: DeliveryStatus::Assigned,
            assigned_at: now,
            picked_up_at: None,
            delivered_at: None,
            estimated_delivery_time: estimate(now, eta),
            notes: None,
        }
    }
}

pub(crate) fn estimate(from: DateTime<Utc>, eta: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(eta)
        .ok()
        .and_then(|offset| from.checked_add_signed(offset))
        .unwrap_or(from)
}
