//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use delivery::DeliveryError;
use order::OrderError;
use payment::PaymentError;

/// API-level error type that maps to plain-text HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request parameter.
    BadRequest(String),
    /// The target is not in a state that allows the request.
    Conflict(String),
    Order(OrderError),
    Payment(PaymentError),
    Delivery(DeliveryError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Order(err) => match err {
                OrderError::NotFound(_) => StatusCode::NOT_FOUND,
                OrderError::Validation(_) => StatusCode::BAD_REQUEST,
                OrderError::RestaurantUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
                OrderError::InvalidTransition { .. } => StatusCode::CONFLICT,
                OrderError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Payment(err) => match err {
                PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
                PaymentError::Validation(_) => StatusCode::BAD_REQUEST,
                PaymentError::InvalidState { .. } => StatusCode::CONFLICT,
                PaymentError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Delivery(err) => match err {
                DeliveryError::NotFound(_)
                | DeliveryError::NotFoundForOrder(_)
                | DeliveryError::UnknownPartner(_) => StatusCode::NOT_FOUND,
                DeliveryError::InvalidState { .. } | DeliveryError::PartnerBusy(_) => {
                    StatusCode::CONFLICT
                }
                DeliveryError::NoPartnerAvailable => StatusCode::SERVICE_UNAVAILABLE,
                DeliveryError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg) | ApiError::Conflict(msg) => write!(f, "{msg}"),
            ApiError::Order(err) => write!(f, "{err}"),
            ApiError::Payment(err) => write!(f, "{err}"),
            ApiError::Delivery(err) => write!(f, "{err}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!(error = %message, "request failed");
        } else {
            tracing::debug!(error = %message, %status, "request rejected");
        }
        (status, message).into_response()
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}

impl From<DeliveryError> for ApiError {
    fn from(err: DeliveryError) -> Self {
        ApiError::Delivery(err)
    }
}

impl From<common::ParseStatusError> for ApiError {
    fn from(err: common::ParseStatusError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}
