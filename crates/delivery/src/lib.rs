//! Delivery assigner.
//!
//! Allocates a delivery partner once an order's payment is captured, tracks
//! the delivery through pickup to drop-off, and reassigns or cancels it.
//!
//! Partners live in a fixed table ([`PartnerRegistry`]). Reserving one is a
//! single compare-and-swap of its status from AVAILABLE to BUSY, so two
//! concurrent assignments can never take the same partner.

pub mod consumer;
pub mod error;
pub mod model;
pub mod partner;
pub mod repository;
pub mod service;

pub use consumer::DeliveryEventConsumer;
pub use error::{DeliveryError, Result};
pub use model::{AssignmentRequest, Delivery, DeliveryConfig, DeliveryStatus};
pub use partner::{DeliveryPartner, PartnerProfile, PartnerRegistry, PartnerStatus, VehicleType};
pub use repository::{DeliveryRepository, InMemoryDeliveryRepository};
pub use service::DeliveryService;
