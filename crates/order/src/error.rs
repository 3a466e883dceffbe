use common::{OrderId, OrderStatus, RestaurantId};
use event_bus::HandlerError;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// No order with this id exists.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The request was malformed.
    #[error("Invalid order: {0}")]
    Validation(String),

    /// The restaurant reported itself as not accepting orders.
    #[error("Restaurant {0} is not available for orders")]
    RestaurantUnavailable(RestaurantId),

    /// The order cannot move to the requested status.
    #[error("Invalid status transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// The order store failed.
    #[error("Order repository error: {0}")]
    Repository(String),
}

/// Result type for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;

impl From<OrderError> for HandlerError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Repository(_) => HandlerError::transient(err),
            _ => HandlerError::permanent(err),
        }
    }
}
