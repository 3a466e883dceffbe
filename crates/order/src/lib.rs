//! Order lifecycle owner.
//!
//! Places orders after checking restaurant availability through a circuit
//! breaker, owns the order status state machine and publishes lifecycle
//! events on `order-events`. Payment and delivery outcomes flow back in
//! through [`OrderEventConsumer`].

pub mod consumer;
pub mod error;
pub mod model;
pub mod repository;
pub mod restaurant;
pub mod service;

pub use consumer::OrderEventConsumer;
pub use error::{OrderError, Result};
pub use model::{NewOrder, NewOrderItem, Order, OrderConfig, OrderItem};
pub use repository::{InMemoryOrderRepository, OrderRepository};
pub use restaurant::{
    FALLBACK_RESTAURANT_NAME, GuardedRestaurantClient, InMemoryRestaurantDirectory, Restaurant, RestaurantClient,
    RestaurantLookupError,
};
pub use service::OrderService;
