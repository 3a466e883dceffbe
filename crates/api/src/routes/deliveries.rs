//! Delivery tracking endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::{DeliveryId, OrderId, OrderStatus, PartnerId, PaymentStatus};
use delivery::{AssignmentRequest, Delivery, DeliveryStatus};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::orders::StatusQuery;

/// GET /deliveries/order/{order_id}
#[tracing::instrument(skip(state))]
pub async fn by_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Delivery>, ApiError> {
    Ok(Json(state.saga.deliveries().by_order(order_id).await?))
}

/// POST /deliveries/order/{order_id}/assign
///
/// Assigns a partner to a paid order left without one, for instance because
/// every partner was busy when its payment completed. An order that already
/// has a delivery gets it back unchanged.
#[tracing::instrument(skip(state))]
pub async fn assign(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Delivery>, ApiError> {
    let order = state.saga.orders().get_order(order_id).await?;
    if order.payment_status != PaymentStatus::Completed || order.status == OrderStatus::Cancelled {
        return Err(ApiError::Conflict(format!(
            "order {order_id} is {} with payment {}, not awaiting delivery",
            order.status, order.payment_status
        )));
    }

    let request = AssignmentRequest {
        order_id,
        user_id: Some(order.user_id),
        restaurant_id: Some(order.restaurant_id),
    };
    Ok(Json(state.saga.deliveries().assign(request).await?))
}

/// GET /deliveries/partner/{partner_id}
#[tracing::instrument(skip(state))]
pub async fn by_partner(
    State(state): State<Arc<AppState>>,
    Path(partner_id): Path<PartnerId>,
) -> Result<Json<Vec<Delivery>>, ApiError> {
    Ok(Json(state.saga.deliveries().by_partner(partner_id).await?))
}

/// PUT /deliveries/{id}/status?status=
///
/// Publishes the matching `DELIVERY_*` event, which moves the order along.
#[tracing::instrument(skip(state))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DeliveryId>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Delivery>, ApiError> {
    let status: DeliveryStatus = query.status.parse()?;
    Ok(Json(state.saga.deliveries().update_status(id, status).await?))
}

/// POST /deliveries/{order_id}/reassign
#[tracing::instrument(skip(state))]
pub async fn reassign(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Delivery>, ApiError> {
    Ok(Json(state.saga.deliveries().reassign(order_id).await?))
}
