//! Order service: placement and status mutations.

use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, OrderStatus, PartnerId, PaymentStatus, UserId};
use event_bus::{EventBus, EventBusExt, EventEnvelope, EventEnvelopeBuilder, EventType, Topic};
use tokio::sync::Mutex;

use crate::{
    GuardedRestaurantClient, NewOrder, Order, OrderConfig, OrderError, OrderRepository, Result,
};

/// Owner of the order lifecycle.
///
/// Every mutation is a read-modify-write of one order followed by a publish.
/// Mutations are serialized so that consumers on different topics cannot
/// overwrite each other's changes, and events leave in the order the
/// changes were made.
pub struct OrderService {
    repository: Arc<dyn OrderRepository>,
    restaurants: GuardedRestaurantClient,
    bus: Arc<dyn EventBus>,
    config: OrderConfig,
    writes: Mutex<()>,
}

impl OrderService {
    pub fn new(
        repository: Arc<dyn OrderRepository>,
        restaurants: GuardedRestaurantClient,
        bus: Arc<dyn EventBus>,
        config: OrderConfig,
    ) -> Self {
        Self {
            repository,
            restaurants,
            bus,
            config,
            writes: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &OrderConfig {
        &self.config
    }

    pub fn restaurants(&self) -> &GuardedRestaurantClient {
        &self.restaurants
    }

    /// Validates, checks restaurant availability, persists the order as
    /// PLACED/PENDING and publishes `ORDER_CREATED`.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id, restaurant_id = %request.restaurant_id))]
    pub async fn create_order(&self, request: NewOrder) -> Result<Order> {
        request.validate(&self.config)?;

        let restaurant = self.restaurants.check(request.restaurant_id).await;
        if !restaurant.available {
            tracing::warn!(restaurant = %restaurant.name, "restaurant not accepting orders");
            return Err(OrderError::RestaurantUnavailable(request.restaurant_id));
        }

        let order = Order::place(request, &self.config);
        self.repository.insert(order.clone()).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, final_amount = %order.final_amount, "order placed");

        self.bus.publish_envelope(
            Topic::OrderEvents,
            event(&order, EventType::OrderCreated).build(),
        );
        Ok(order)
    }

    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.repository
            .get(id)
            .await?
            .ok_or(OrderError::NotFound(id))
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>> {
        self.repository.list().await
    }

    pub async fn orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        self.repository.by_user(user_id).await
    }

    /// Moves an order to `status` and publishes `ORDER_STATUS_UPDATED`.
    ///
    /// Setting the current status again changes and publishes nothing.
    /// Entering CANCELLED also publishes `ORDER_CANCELLED`.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order> {
        let _guard = self.writes.lock().await;
        let mut order = self.get_order(id).await?;

        if order.status == status {
            tracing::debug!(%status, "order already in requested status");
            return Ok(order);
        }
        if !order.status.can_transition_to(status) {
            return Err(OrderError::InvalidTransition {
                order_id: id,
                from: order.status,
                to: status,
            });
        }

        let from = order.status;
        let now = Utc::now();
        order.status = status;
        order.updated_at = now;
        if status == OrderStatus::Delivered {
            order.delivery_time = Some(now);
        }
        self.repository.save(&order).await?;

        tracing::info!(%from, to = %status, "order status updated");
        self.bus.publish_envelope(
            Topic::OrderEvents,
            event(&order, EventType::OrderStatusUpdated).build(),
        );
        if status == OrderStatus::Cancelled {
            self.publish_cancelled(&order, "cancelled on request");
        }
        Ok(order)
    }

    /// Records a payment outcome on the order.
    ///
    /// COMPLETED confirms the order and publishes `PAYMENT_COMPLETED` on
    /// `order-events`, which triggers delivery assignment. FAILED cancels the
    /// order. REFUNDED only updates the payment status.
    #[tracing::instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        id: OrderId,
        payment_status: PaymentStatus,
    ) -> Result<Order> {
        let _guard = self.writes.lock().await;
        let mut order = self.get_order(id).await?;

        if order.payment_status == payment_status {
            tracing::debug!(%payment_status, "payment status already recorded");
            return Ok(order);
        }

        let target = match payment_status {
            PaymentStatus::Completed => Some(OrderStatus::Confirmed),
            PaymentStatus::Failed => Some(OrderStatus::Cancelled),
            PaymentStatus::Pending | PaymentStatus::Refunded => None,
        };
        let from = order.status;
        if let Some(target) = target.filter(|t| order.status.can_transition_to(*t)) {
            order.status = target;
        }
        order.payment_status = payment_status;
        order.updated_at = Utc::now();
        self.repository.save(&order).await?;

        tracing::info!(%payment_status, %from, to = %order.status, "order payment status updated");

        match payment_status {
            PaymentStatus::Completed if order.status.is_terminal() => {
                tracing::warn!(status = %order.status, "payment completed for an order that is already closed");
            }
            PaymentStatus::Completed => {
                self.bus.publish_envelope(
                    Topic::OrderEvents,
                    event(&order, EventType::PaymentCompleted).build(),
                );
            }
            PaymentStatus::Failed if from != order.status => {
                self.publish_cancelled(&order, "payment failed");
            }
            _ => {}
        }
        Ok(order)
    }

    /// Records the partner carrying the order, moves it to READY and
    /// publishes `DELIVERY_ASSIGNED` on `order-events`.
    ///
    /// A reassignment after pickup only swaps the partner.
    #[tracing::instrument(skip(self))]
    pub async fn assign_delivery_partner(&self, id: OrderId, partner_id: PartnerId) -> Result<Order> {
        let _guard = self.writes.lock().await;
        let mut order = self.get_order(id).await?;

        if order.status.is_terminal() {
            return Err(OrderError::InvalidTransition {
                order_id: id,
                from: order.status,
                to: OrderStatus::Ready,
            });
        }
        if order.delivery_partner_id == Some(partner_id) {
            tracing::debug!(%partner_id, "partner already assigned");
            return Ok(order);
        }

        order.delivery_partner_id = Some(partner_id);
        if order.status.can_transition_to(OrderStatus::Ready) {
            order.status = OrderStatus::Ready;
        }
        order.updated_at = Utc::now();
        self.repository.save(&order).await?;

        tracing::info!(%partner_id, status = %order.status, "delivery partner assigned to order");
        self.bus.publish_envelope(
            Topic::OrderEvents,
            event(&order, EventType::DeliveryAssigned).build(),
        );
        Ok(order)
    }

    fn publish_cancelled(&self, order: &Order, reason: &str) {
        self.bus.publish_envelope(
            Topic::OrderEvents,
            event(order, EventType::OrderCancelled).reason(reason).build(),
        );
    }
}

/// Starts an envelope carrying the order's current state.
fn event(order: &Order, event_type: EventType) -> EventEnvelopeBuilder {
    EventEnvelope::builder(event_type, order.id)
        .user_id(order.user_id)
        .restaurant_id(order.restaurant_id)
        .delivery_partner_id(order.delivery_partner_id)
        .amount(order.final_amount)
        .order_status(order.status)
        .payment_status(order.payment_status)
}
