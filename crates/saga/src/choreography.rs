//! Builds the services and connects them through the bus.

use std::sync::Arc;

use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use delivery::{
    DeliveryConfig, DeliveryEventConsumer, DeliveryService, InMemoryDeliveryRepository,
    PartnerRegistry,
};
use event_bus::{DeadLetter, EventBus, EventHandler, LogEventBus, Topic};
use notification::{LogChannel, NotificationChannel, NotificationConsumer, NotificationDispatcher};
use order::{
    GuardedRestaurantClient, InMemoryOrderRepository, InMemoryRestaurantDirectory,
    OrderConfig, OrderEventConsumer, OrderService, RestaurantClient,
};
use payment::{
    GatewayConfig, InMemoryPaymentRepository, PaymentEventConsumer, PaymentGateway,
    PaymentService, SimulatedGateway,
};

use crate::subscriptions::{ConsumerGroup, SUBSCRIPTIONS};
use crate::{Result, SagaError};

/// Name of the breaker guarding restaurant lookups.
pub const RESTAURANT_BREAKER: &str = "restaurant-service";

/// Settings of the services taking part in the saga.
#[derive(Debug, Clone, PartialEq)]
pub struct SagaConfig {
    pub order: OrderConfig,
    pub delivery: DeliveryConfig,
    pub breaker: CircuitBreakerConfig,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            order: OrderConfig::default(),
            delivery: DeliveryConfig::default(),
            breaker: CircuitBreakerConfig::named(RESTAURANT_BREAKER),
        }
    }
}

/// Everything the services talk to outside the bus.
pub struct Collaborators {
    pub restaurants: Arc<dyn RestaurantClient>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub partners: Arc<PartnerRegistry>,
    pub channels: Vec<Arc<dyn NotificationChannel>>,
}

impl Collaborators {
    /// Demo restaurants and partners, the simulated gateway and log channels.
    pub fn simulated(restaurants: i64, partners: i64, gateway: GatewayConfig) -> Self {
        Self {
            restaurants: Arc::new(InMemoryRestaurantDirectory::seeded(restaurants)),
            gateway: Arc::new(SimulatedGateway::new(gateway)),
            partners: Arc::new(PartnerRegistry::seeded(partners)),
            channels: LogChannel::all(),
        }
    }
}

/// The running saga: one bus and the four services subscribed to it.
pub struct Choreography {
    bus: LogEventBus,
    orders: Arc<OrderService>,
    payments: Arc<PaymentService>,
    deliveries: Arc<DeliveryService>,
    breaker: Arc<CircuitBreaker>,
}

impl Choreography {
    /// Builds the services on top of `bus` and registers their consumer
    /// groups.
    #[tracing::instrument(skip_all)]
    pub async fn start(
        bus: LogEventBus,
        collaborators: Collaborators,
        config: SagaConfig,
    ) -> Result<Self> {
        let shared: Arc<dyn EventBus> = Arc::new(bus.clone());
        let breaker = Arc::new(CircuitBreaker::new(config.breaker));

        let orders = Arc::new(OrderService::new(
            Arc::new(InMemoryOrderRepository::new()),
            GuardedRestaurantClient::new(collaborators.restaurants, breaker.clone()),
            shared.clone(),
            config.order,
        ));
        let payments = Arc::new(PaymentService::new(
            Arc::new(InMemoryPaymentRepository::new()),
            collaborators.gateway,
            shared.clone(),
        ));
        let deliveries = Arc::new(DeliveryService::new(
            collaborators.partners,
            Arc::new(InMemoryDeliveryRepository::new()),
            shared,
            config.delivery,
        ));

        let choreography = Self {
            bus,
            orders,
            payments,
            deliveries,
            breaker,
        };
        choreography
            .subscribe_all(NotificationDispatcher::new(collaborators.channels))
            .await?;
        Ok(choreography)
    }

    async fn subscribe_all(&self, notifications: NotificationDispatcher) -> Result<()> {
        let order: Arc<dyn EventHandler> = Arc::new(OrderEventConsumer::new(self.orders.clone()));
        let payment: Arc<dyn EventHandler> =
            Arc::new(PaymentEventConsumer::new(self.payments.clone()));
        let delivery: Arc<dyn EventHandler> =
            Arc::new(DeliveryEventConsumer::new(self.deliveries.clone()));

        for (topic, group) in SUBSCRIPTIONS {
            let handler: Arc<dyn EventHandler> = match group {
                ConsumerGroup::Order => order.clone(),
                ConsumerGroup::Payment => payment.clone(),
                ConsumerGroup::Delivery => delivery.clone(),
                // Notifications are labelled by the topic they came from.
                ConsumerGroup::Notification => {
                    Arc::new(NotificationConsumer::new(notifications.clone(), topic))
                }
            };
            self.subscribe(topic, group.name(), handler).await?;
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: Topic,
        group: &'static str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        self.bus
            .subscribe(topic, group, handler)
            .await
            .map_err(|source| SagaError::Subscription {
                topic,
                group,
                source,
            })?;
        tracing::info!(%topic, group, "consumer group subscribed");
        Ok(())
    }

    pub fn bus(&self) -> &LogEventBus {
        &self.bus
    }

    pub fn orders(&self) -> &Arc<OrderService> {
        &self.orders
    }

    pub fn payments(&self) -> &Arc<PaymentService> {
        &self.payments
    }

    pub fn deliveries(&self) -> &Arc<DeliveryService> {
        &self.deliveries
    }

    pub fn restaurant_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Waits until every event published so far, and every event published
    /// in reaction to it, has been handled.
    pub async fn settle(&self) {
        self.bus.wait_idle().await;
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.bus.dead_letters().await
    }

    pub async fn dead_letter_count(&self) -> u64 {
        self.bus.dead_letter_count().await
    }
}
