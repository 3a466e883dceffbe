use common::{DeliveryId, OrderId, PartnerId};
use event_bus::HandlerError;
use thiserror::Error;

use crate::DeliveryStatus;

/// Errors that can occur during delivery operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Delivery not found: {0}")]
    NotFound(DeliveryId),

    #[error("Delivery not found for order: {0}")]
    NotFoundForOrder(OrderId),

    /// Every partner is busy or offline.
    #[error("No available delivery partners found")]
    NoPartnerAvailable,

    #[error("Cannot {action} delivery {delivery_id} in status {status}")]
    InvalidState {
        delivery_id: DeliveryId,
        status: DeliveryStatus,
        action: String,
    },

    #[error("Delivery partner not found: {0}")]
    UnknownPartner(PartnerId),

    #[error("Delivery partner {0} is on a delivery")]
    PartnerBusy(PartnerId),

    #[error("Delivery repository error: {0}")]
    Repository(String),
}

/// Result type for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

impl From<DeliveryError> for HandlerError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::Repository(_) => HandlerError::transient(err),
            _ => HandlerError::permanent(err),
        }
    }
}
