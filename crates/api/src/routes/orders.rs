//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{OrderId, OrderStatus, PartnerId, PaymentStatus, UserId};
use order::{NewOrder, Order};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusQuery {
    pub payment_status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignDeliveryQuery {
    pub delivery_partner_id: PartnerId,
}

/// POST /orders — place an order and start the saga.
#[tracing::instrument(skip(state, request), fields(user_id = %request.user_id, restaurant_id = %request.restaurant_id))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.saga.orders().create_order(request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders
#[tracing::instrument(skip(state))]
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.saga.orders().list_orders().await?))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.saga.orders().get_order(id).await?))
}

/// GET /orders/user/{user_id} — newest first.
#[tracing::instrument(skip(state))]
pub async fn by_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.saga.orders().orders_by_user(user_id).await?))
}

/// PUT /orders/{id}/status?status=
#[tracing::instrument(skip(state))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<OrderId>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Order>, ApiError> {
    let status: OrderStatus = query.status.parse()?;
    Ok(Json(state.saga.orders().update_status(id, status).await?))
}

/// PUT /orders/{id}/payment-status?paymentStatus=
#[tracing::instrument(skip(state))]
pub async fn update_payment_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<OrderId>,
    Query(query): Query<PaymentStatusQuery>,
) -> Result<Json<Order>, ApiError> {
    let payment_status: PaymentStatus = query.payment_status.parse()?;
    let order = state
        .saga
        .orders()
        .update_payment_status(id, payment_status)
        .await?;
    Ok(Json(order))
}

/// PUT /orders/{id}/assign-delivery?deliveryPartnerId=
#[tracing::instrument(skip(state))]
pub async fn assign_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<OrderId>,
    Query(query): Query<AssignDeliveryQuery>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .saga
        .orders()
        .assign_delivery_partner(id, query.delivery_partner_id)
        .await?;
    Ok(Json(order))
}
