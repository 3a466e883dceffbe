//! Consumer groups and the topics each one reads.

use event_bus::Topic;

pub const ORDER_GROUP: &str = "order-service-group";
pub const PAYMENT_GROUP: &str = "payment-service-group";
pub const DELIVERY_GROUP: &str = "delivery-service-group";
pub const NOTIFICATION_GROUP: &str = "notification-service-group";

/// A service's consumer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsumerGroup {
    Order,
    Payment,
    Delivery,
    Notification,
}

impl ConsumerGroup {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Order => ORDER_GROUP,
            Self::Payment => PAYMENT_GROUP,
            Self::Delivery => DELIVERY_GROUP,
            Self::Notification => NOTIFICATION_GROUP,
        }
    }
}

/// Every (topic, group) pair the choreography registers, in registration
/// order.
pub const SUBSCRIPTIONS: [(Topic, ConsumerGroup); 9] = [
    (Topic::PaymentEvents, ConsumerGroup::Order),
    (Topic::DeliveryEvents, ConsumerGroup::Order),
    (Topic::OrderEvents, ConsumerGroup::Payment),
    (Topic::DeliveryEvents, ConsumerGroup::Payment),
    (Topic::OrderEvents, ConsumerGroup::Delivery),
    (Topic::DeliveryEvents, ConsumerGroup::Delivery),
    (Topic::OrderEvents, ConsumerGroup::Notification),
    (Topic::PaymentEvents, ConsumerGroup::Notification),
    (Topic::DeliveryEvents, ConsumerGroup::Notification),
];
