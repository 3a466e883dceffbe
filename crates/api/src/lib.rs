//! HTTP surface of the food-delivery saga.
//!
//! Exposes the order, payment, delivery and partner operations over REST,
//! with structured logging (tracing) and Prometheus metrics. The saga
//! itself runs on the event bus; handlers only start it and read its
//! results.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::Choreography;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub saga: Choreography,
}

impl AppState {
    pub fn new(saga: Choreography) -> Self {
        Self { saga }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            post(routes::orders::create).get(routes::orders::list),
        )
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/user/{user_id}", get(routes::orders::by_user))
        .route("/orders/{id}/status", put(routes::orders::update_status))
        .route(
            "/orders/{id}/payment-status",
            put(routes::orders::update_payment_status),
        )
        .route(
            "/orders/{id}/assign-delivery",
            put(routes::orders::assign_delivery),
        )
        .route(
            "/payments/order/{order_id}",
            get(routes::payments::by_order),
        )
        .route("/payments/user/{user_id}", get(routes::payments::by_user))
        .route(
            "/payments/{order_id}/refund",
            post(routes::payments::refund),
        )
        .route(
            "/deliveries/order/{order_id}",
            get(routes::deliveries::by_order),
        )
        .route(
            "/deliveries/order/{order_id}/assign",
            post(routes::deliveries::assign),
        )
        .route(
            "/deliveries/partner/{partner_id}",
            get(routes::deliveries::by_partner),
        )
        .route(
            "/deliveries/{id}/status",
            put(routes::deliveries::update_status),
        )
        .route(
            "/deliveries/{id}/reassign",
            post(routes::deliveries::reassign),
        )
        .route("/partners", get(routes::partners::list))
        .route(
            "/partners/{id}/available",
            put(routes::partners::available),
        )
        .route("/partners/{id}/offline", put(routes::partners::offline))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
