//! Message templates, one per event type.

use common::{OrderId, UserId};
use event_bus::{EventEnvelope, EventType};
use serde::Serialize;

/// A rendered message, ready to be sent to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub user_id: Option<UserId>,
    pub order_id: OrderId,
    pub event_type: EventType,
    pub title: &'static str,
    pub body: String,
}

/// Renders the message for an event.
///
/// Returns `None` for event types that have no template.
pub fn render(envelope: &EventEnvelope) -> Option<Notification> {
    let order = envelope.order_id;
    let amount = envelope
        .amount
        .map(|amount| format!(" of {amount}"))
        .unwrap_or_default();

    let (title, body) = match &envelope.event_type {
        EventType::OrderCreated => (
            "Order Placed",
            format!(
                "Your order {order} has been placed successfully! Total amount{amount}. \
                 We'll notify you once payment is confirmed."
            ),
        ),
        EventType::OrderStatusUpdated => {
            let status = envelope
                .order_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "a new status".to_string());
            (
                "Order Updated",
                format!("Your order {order} status has been updated to: {status}"),
            )
        }
        EventType::OrderCancelled => (
            "Order Cancelled",
            format!(
                "Your order {order} has been cancelled. \
                 If you were charged, you'll receive a refund within 3-5 business days."
            ),
        ),
        EventType::PaymentCompleted => (
            "Payment Successful",
            format!(
                "Payment{amount} for order {order} has been processed successfully! \
                 Your order is being prepared."
            ),
        ),
        EventType::PaymentFailed => {
            let reason = envelope
                .reason
                .as_deref()
                .map(|r| format!(" ({r})"))
                .unwrap_or_default();
            (
                "Payment Failed",
                format!(
                    "Payment for order {order} failed{reason}. \
                     Please try again with a different payment method."
                ),
            )
        }
        EventType::RefundCompleted => (
            "Refund Processed",
            format!("A refund{amount} for order {order} has been processed."),
        ),
        EventType::DeliveryAssigned => (
            "Delivery Partner Assigned",
            format!(
                "Great news! A delivery partner has been assigned to your order {order}. \
                 It will be delivered soon!"
            ),
        ),
        EventType::DeliveryPickedUp => (
            "Order Picked Up",
            format!("Your order {order} has been picked up by the delivery partner."),
        ),
        EventType::DeliveryInTransit => (
            "Out For Delivery",
            format!("Your order {order} is on its way."),
        ),
        EventType::DeliveryCompleted => (
            "Order Delivered",
            format!(
                "Your order {order} has been delivered successfully! \
                 Enjoy your meal and please rate your experience."
            ),
        ),
        EventType::DeliveryFailed => (
            "Delivery Issue",
            format!(
                "We're sorry! Delivery of order {order} failed. \
                 You'll be refunded if you were charged."
            ),
        ),
        EventType::DeliveryCancelled => (
            "Delivery Cancelled",
            format!("The delivery of your order {order} has been cancelled."),
        ),
        EventType::Unknown(_) => return None,
    };

    Some(Notification {
        user_id: envelope.user_id,
        order_id: order,
        event_type: envelope.event_type.clone(),
        title,
        body,
    })
}
