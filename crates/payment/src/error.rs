use common::OrderId;
use event_bus::HandlerError;
use thiserror::Error;

use crate::PaymentState;

/// Errors that can occur during payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment not found for order: {0}")]
    NotFound(OrderId),

    #[error("Invalid payment request: {0}")]
    Validation(String),

    /// The payment is not in a state that allows the operation.
    #[error("Cannot {action} payment for order {order_id} in state {state}")]
    InvalidState {
        order_id: OrderId,
        state: PaymentState,
        action: &'static str,
    },

    #[error("Payment repository error: {0}")]
    Repository(String),
}

/// Result type for payment operations.
pub type Result<T> = std::result::Result<T, PaymentError>;

impl From<PaymentError> for HandlerError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Repository(_) => HandlerError::transient(err),
            _ => HandlerError::permanent(err),
        }
    }
}
