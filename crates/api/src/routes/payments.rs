//! Payment lookups and refunds.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{OrderId, UserId};
use payment::Payment;

use crate::AppState;
use crate::error::ApiError;

/// GET /payments/order/{order_id}
#[tracing::instrument(skip(state))]
pub async fn by_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Payment>, ApiError> {
    Ok(Json(state.saga.payments().get_by_order(order_id).await?))
}

/// GET /payments/user/{user_id}
#[tracing::instrument(skip(state))]
pub async fn by_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Vec<Payment>>, ApiError> {
    Ok(Json(state.saga.payments().get_by_user(user_id).await?))
}

/// POST /payments/{order_id}/refund — refunds a captured payment.
#[tracing::instrument(skip(state))]
pub async fn refund(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Payment>, ApiError> {
    Ok(Json(state.saga.payments().process_refund(order_id).await?))
}
