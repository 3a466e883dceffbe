//! Prometheus metrics endpoint and counter descriptions.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// GET /metrics — renders every counter in the Prometheus text format.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}

/// Registers help text for the counters the services emit.
pub fn describe() {
    let counters = [
        ("event_bus_published_total", "Envelopes appended to a topic"),
        ("event_bus_handled_total", "Envelopes handled by a consumer group"),
        ("event_bus_retries_total", "Handler attempts retried after a transient failure"),
        ("event_bus_dead_lettered_total", "Envelopes moved to the dead-letter list"),
        ("event_bus_publish_failures_total", "Envelopes the log refused to append"),
        ("circuit_breaker_calls_total", "Guarded calls by outcome"),
        ("circuit_breaker_transitions_total", "Breaker state changes"),
        ("orders_created_total", "Orders placed"),
        ("payments_processed_total", "Payment attempts by outcome"),
        ("refunds_processed_total", "Refunds completed"),
        ("deliveries_assigned_total", "Deliveries handed to a partner"),
        ("delivery_assignment_failures_total", "Paid orders with no free partner"),
        ("notifications_sent_total", "Notifications sent by channel"),
    ];
    for (name, help) in counters {
        metrics::describe_counter!(name, help);
    }
}
