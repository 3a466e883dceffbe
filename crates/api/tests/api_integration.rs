//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::RestaurantId;
use delivery::PartnerRegistry;
use event_bus::{BusConfig, InMemoryEventLog, LogEventBus, RetryPolicy};
use metrics_exporter_prometheus::PrometheusHandle;
use notification::{ChannelKind, RecordingChannel};
use order::{InMemoryRestaurantDirectory, Restaurant};
use payment::ScriptedGateway;
use saga::{Choreography, Collaborators, SagaConfig};
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    state: Arc<api::AppState>,
}

impl TestApp {
    async fn new(partners: i64, gateway: ScriptedGateway) -> Self {
        let bus = LogEventBus::start(
            InMemoryEventLog::new(),
            BusConfig {
                concurrency: 3,
                retry: RetryPolicy::immediate(3),
                ..BusConfig::default()
            },
        );
        let restaurants = InMemoryRestaurantDirectory::seeded(3);
        restaurants.upsert(Restaurant::new(RestaurantId::new(4), "Closed Kitchen", false));
        let saga = Choreography::start(
            bus,
            Collaborators {
                restaurants: Arc::new(restaurants),
                gateway: Arc::new(gateway),
                partners: Arc::new(PartnerRegistry::seeded(partners)),
                channels: vec![Arc::new(RecordingChannel::new(ChannelKind::Email))],
            },
            SagaConfig::default(),
        )
        .await
        .unwrap();

        let state = Arc::new(api::AppState::new(saga));
        let app = api::create_app(state.clone(), get_metrics_handle());
        Self { app, state }
    }

    async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.state.saga.settle())
            .await
            .expect("saga did not settle");
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => request
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&json).unwrap())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    async fn json(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, body) = self.send(method, uri, body).await;
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    async fn text(&self, method: &str, uri: &str) -> (StatusCode, String) {
        let (status, body) = self.send(method, uri, None).await;
        (status, String::from_utf8(body).unwrap())
    }

    async fn place_order(&self) -> Value {
        let (status, order) = self
            .json("POST", "/orders", Some(order_request(1)))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        order
    }
}

fn order_request(restaurant_id: i64) -> Value {
    json!({
        "user_id": 7,
        "restaurant_id": restaurant_id,
        "special_instructions": "Ring the bell",
        "items": [
            { "menu_item_id": 1, "item_name": "Masala Dosa", "quantity": 2, "unit_price": 1000 },
            { "menu_item_id": 2, "item_name": "Filter Coffee", "quantity": 1, "unit_price": 500 }
        ]
    })
}

#[tokio::test]
async fn test_health_check() {
    let t = TestApp::new(1, ScriptedGateway::approving()).await;

    let (status, json) = t.json("GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["restaurant_breaker"]["state"], "CLOSED");
    assert_eq!(json["dead_letters"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = TestApp::new(1, ScriptedGateway::approving()).await;

    let (status, _) = t.send("GET", "/metrics", None).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_create_order_prices_and_places() {
    let t = TestApp::new(1, ScriptedGateway::approving()).await;

    let order = t.place_order().await;

    assert_eq!(order["status"], "PLACED");
    assert_eq!(order["payment_status"], "PENDING");
    assert_eq!(order["total_amount"], 2500);
    assert_eq!(order["delivery_fee"], 5000);
    assert_eq!(order["final_amount"], 7500);
    assert_eq!(order["special_instructions"], "Ring the bell");
}

#[tokio::test]
async fn test_paid_order_becomes_ready_with_delivery() {
    let t = TestApp::new(1, ScriptedGateway::approving()).await;
    let order = t.place_order().await;
    let id = order["id"].as_str().unwrap();
    t.settle().await;

    let (status, order) = t.json("GET", &format!("/orders/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "READY");
    assert_eq!(order["payment_status"], "COMPLETED");
    assert_eq!(order["delivery_partner_id"], 1);

    let (status, payment) = t.json("GET", &format!("/payments/order/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["status"], "SUCCESS");
    assert_eq!(payment["amount"], 7500);

    let (status, delivery) = t
        .json("GET", &format!("/deliveries/order/{id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(delivery["status"], "ASSIGNED");
    assert_eq!(delivery["partner_id"], 1);
}

#[tokio::test]
async fn test_delivery_status_updates_drive_the_order() {
    let t = TestApp::new(1, ScriptedGateway::approving()).await;
    let order = t.place_order().await;
    let id = order["id"].as_str().unwrap().to_string();
    t.settle().await;

    let (_, delivery) = t
        .json("GET", &format!("/deliveries/order/{id}"), None)
        .await;
    let delivery_id = delivery["id"].as_str().unwrap().to_string();

    for step in ["PICKED_UP", "DELIVERED"] {
        let (status, delivery) = t
            .json(
                "PUT",
                &format!("/deliveries/{delivery_id}/status?status={step}"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(delivery["status"], step);
        t.settle().await;
    }

    let (_, order) = t.json("GET", &format!("/orders/{id}"), None).await;
    assert_eq!(order["status"], "DELIVERED");
    assert!(!order["delivery_time"].is_null());

    let (_, partners) = t.json("GET", "/partners", None).await;
    assert_eq!(partners[0]["status"], "AVAILABLE");
    assert_eq!(partners[0]["total_deliveries"], 1);
}

#[tokio::test]
async fn test_declined_payment_cancels_order() {
    let t = TestApp::new(1, ScriptedGateway::declining()).await;
    let order = t.place_order().await;
    let id = order["id"].as_str().unwrap();
    t.settle().await;

    let (_, order) = t.json("GET", &format!("/orders/{id}"), None).await;
    assert_eq!(order["status"], "CANCELLED");
    assert_eq!(order["payment_status"], "FAILED");

    let (status, body) = t.text("GET", &format!("/deliveries/order/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.starts_with("Delivery not found for order"));
}

#[tokio::test]
async fn test_refund_after_capture() {
    let t = TestApp::new(1, ScriptedGateway::approving()).await;
    let order = t.place_order().await;
    let id = order["id"].as_str().unwrap();
    t.settle().await;

    let (status, payment) = t
        .json("POST", &format!("/payments/{id}/refund"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["status"], "REFUNDED");

    let (status, body) = t.text("POST", &format!("/payments/{id}/refund")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("REFUNDED"), "{body}");
}

#[tokio::test]
async fn test_payments_and_orders_by_user() {
    let t = TestApp::new(2, ScriptedGateway::approving()).await;
    t.place_order().await;
    t.place_order().await;
    t.settle().await;

    let (_, orders) = t.json("GET", "/orders/user/7", None).await;
    assert_eq!(orders.as_array().unwrap().len(), 2);

    let (_, payments) = t.json("GET", "/payments/user/7", None).await;
    assert_eq!(payments.as_array().unwrap().len(), 2);

    let (_, others) = t.json("GET", "/orders/user/8", None).await;
    assert!(others.as_array().unwrap().is_empty());

    let (_, all) = t.json("GET", "/orders", None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_order_status_errors() {
    let t = TestApp::new(1, ScriptedGateway::approving()).await;
    let order = t.place_order().await;
    let id = order["id"].as_str().unwrap();
    t.settle().await;

    let (status, body) = t
        .text("PUT", &format!("/orders/{id}/status?status=SHIPPED"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "unknown order status: SHIPPED");

    let (status, order) = t
        .json("PUT", &format!("/orders/{id}/status?status=CANCELLED"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "CANCELLED");

    let (status, body) = t
        .text("PUT", &format!("/orders/{id}/status?status=PREPARING"))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.starts_with("Invalid status transition"), "{body}");
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let t = TestApp::new(1, ScriptedGateway::approving()).await;

    let (status, body) = t
        .text("GET", "/orders/7f3b8a2e-0d1c-4c6e-9b7a-2f5e8d9c1a4b")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.starts_with("Order not found"));

    let (status, _) = t.text("GET", "/orders/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_closed_restaurant_is_unprocessable() {
    let t = TestApp::new(1, ScriptedGateway::approving()).await;

    let (status, body) = t
        .send("POST", "/orders", Some(order_request(4)))
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        String::from_utf8(body).unwrap(),
        "Restaurant 4 is not available for orders"
    );
    let (_, all) = t.json("GET", "/orders", None).await;
    assert!(all.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_overflowing_order_amount_is_bad_request() {
    let t = TestApp::new(1, ScriptedGateway::approving()).await;
    let request = json!({
        "user_id": 7,
        "restaurant_id": 1,
        "items": [
            { "menu_item_id": 1, "item_name": "Banquet", "quantity": 3, "unit_price": i64::MAX / 2 }
        ]
    });

    let (status, body) = t.send("POST", "/orders", Some(request)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8(body).unwrap().contains("too large"));
    let (_, all) = t.json("GET", "/orders", None).await;
    assert!(all.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_manual_payment_status_and_assignment() {
    let t = TestApp::new(0, ScriptedGateway::approving()).await;
    let order = t.place_order().await;
    let id = order["id"].as_str().unwrap();
    t.settle().await;

    let (status, order) = t
        .json(
            "PUT",
            &format!("/orders/{id}/payment-status?paymentStatus=COMPLETED"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "CONFIRMED");

    let (status, order) = t
        .json(
            "PUT",
            &format!("/orders/{id}/assign-delivery?deliveryPartnerId=3"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "READY");
    assert_eq!(order["delivery_partner_id"], 3);

    let (status, _) = t
        .text(
            "PUT",
            &format!("/orders/{id}/payment-status?paymentStatus=SETTLED"),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reassign_moves_to_another_partner() {
    let t = TestApp::new(2, ScriptedGateway::approving()).await;
    let order = t.place_order().await;
    let id = order["id"].as_str().unwrap();
    t.settle().await;

    let (status, delivery) = t
        .json("POST", &format!("/deliveries/{id}/reassign"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(delivery["partner_id"], 2);
    assert_eq!(delivery["status"], "ASSIGNED");

    let (_, first) = t.json("GET", "/deliveries/partner/1", None).await;
    assert!(first.as_array().unwrap().is_empty());
    let (_, second) = t.json("GET", "/deliveries/partner/2", None).await;
    assert_eq!(second.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reassign_without_free_partner_is_unavailable() {
    let t = TestApp::new(1, ScriptedGateway::approving()).await;
    let order = t.place_order().await;
    let id = order["id"].as_str().unwrap();
    t.settle().await;

    let (status, body) = t.text("POST", &format!("/deliveries/{id}/reassign")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, "No available delivery partners found");
}

#[tokio::test]
async fn test_partner_availability_toggle() {
    let t = TestApp::new(2, ScriptedGateway::approving()).await;

    let (status, partner) = t.json("PUT", "/partners/2/offline", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(partner["status"], "OFFLINE");

    let (status, partner) = t.json("PUT", "/partners/2/available", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(partner["status"], "AVAILABLE");

    let (status, _) = t.text("PUT", "/partners/9/offline").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_busy_partner_cannot_go_offline() {
    let t = TestApp::new(1, ScriptedGateway::approving()).await;
    t.place_order().await;
    t.settle().await;

    let (status, body) = t.text("PUT", "/partners/1/offline").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, "Delivery partner 1 is on a delivery");

    let (_, partner) = t.json("PUT", "/partners/1/available", None).await;
    assert_eq!(partner["status"], "BUSY");
}

#[tokio::test]
async fn test_no_partner_dead_letter_shows_in_health() {
    let t = TestApp::new(0, ScriptedGateway::approving()).await;
    let order = t.place_order().await;
    let id = order["id"].as_str().unwrap();
    t.settle().await;

    let (_, order) = t.json("GET", &format!("/orders/{id}"), None).await;
    assert_eq!(order["status"], "CONFIRMED");

    let (_, health) = t.json("GET", "/health", None).await;
    assert_eq!(health["dead_letters"], 1);
}

#[tokio::test]
async fn test_operator_assigns_delivery_after_partners_free_up() {
    let t = TestApp::new(1, ScriptedGateway::approving()).await;
    let (status, _) = t.json("PUT", "/partners/1/offline", None).await;
    assert_eq!(status, StatusCode::OK);

    let order = t.place_order().await;
    let id = order["id"].as_str().unwrap();
    t.settle().await;
    let (_, order) = t.json("GET", &format!("/orders/{id}"), None).await;
    assert_eq!(order["status"], "CONFIRMED");

    let uri = format!("/deliveries/order/{id}/assign");
    let (status, _) = t.text("POST", &uri).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    t.json("PUT", "/partners/1/available", None).await;
    let (status, delivery) = t.json("POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(delivery["partner_id"], 1);
    assert_eq!(delivery["status"], "ASSIGNED");
    t.settle().await;

    let (_, order) = t.json("GET", &format!("/orders/{id}"), None).await;
    assert_eq!(order["status"], "READY");
    assert_eq!(order["delivery_partner_id"], 1);

    let (status, again) = t.json("POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["id"], delivery["id"]);
}

#[tokio::test]
async fn test_operator_assignment_requires_payment() {
    let t = TestApp::new(1, ScriptedGateway::declining()).await;
    let order = t.place_order().await;
    let id = order["id"].as_str().unwrap();
    t.settle().await;

    let (status, body) = t
        .text("POST", &format!("/deliveries/order/{id}/assign"))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("not awaiting delivery"), "{body}");
    let (status, _) = t
        .text("GET", &format!("/deliveries/order/{id}"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
