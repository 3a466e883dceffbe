//! Shared vocabulary for the food-delivery services.
//!
//! Every service and the event envelope speak in these types, so they live
//! in a crate with no dependency on any service.

pub mod ids;
pub mod money;
pub mod status;

pub use ids::{DeliveryId, MenuItemId, OrderId, PartnerId, PaymentId, RestaurantId, UserId};
pub use money::Money;
pub use status::{OrderStatus, ParseStatusError, PaymentStatus};
