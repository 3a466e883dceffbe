//! Delivery partner availability.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::PartnerId;
use delivery::DeliveryPartner;

use crate::AppState;
use crate::error::ApiError;

/// GET /partners
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<DeliveryPartner>> {
    Json(state.saga.deliveries().list_partners())
}

/// PUT /partners/{id}/available — brings an offline partner back.
#[tracing::instrument(skip(state))]
pub async fn available(
    State(state): State<Arc<AppState>>,
    Path(id): Path<PartnerId>,
) -> Result<Json<DeliveryPartner>, ApiError> {
    Ok(Json(state.saga.deliveries().mark_partner_available(id)?))
}

/// PUT /partners/{id}/offline
#[tracing::instrument(skip(state))]
pub async fn offline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<PartnerId>,
) -> Result<Json<DeliveryPartner>, ApiError> {
    Ok(Json(state.saga.deliveries().mark_partner_offline(id)?))
}
