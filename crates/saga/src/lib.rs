//! Choreography of the food-delivery saga.
//!
//! There is no coordinator. Each service reacts to the events of the others:
//!
//! 1. Order placed: `ORDER_CREATED` on `order-events`
//! 2. Payment captured or declined: `PAYMENT_*` on `payment-events`
//! 3. Order confirmed: `PAYMENT_COMPLETED` copied to `order-events`
//! 4. Partner assigned: `DELIVERY_ASSIGNED` on `delivery-events`
//! 5. Delivery progress: `DELIVERY_*` on `delivery-events`
//!
//! A failed delivery refunds the payment. Every event is also turned into a
//! user notification. This crate builds the services and registers the
//! (topic, group) pairs listed in [`SUBSCRIPTIONS`].

pub mod choreography;
pub mod error;
pub mod subscriptions;

pub use choreography::{Choreography, Collaborators, SagaConfig};
pub use error::{Result, SagaError};
pub use subscriptions::{
    ConsumerGroup, DELIVERY_GROUP, NOTIFICATION_GROUP, ORDER_GROUP, PAYMENT_GROUP, SUBSCRIPTIONS,
};
