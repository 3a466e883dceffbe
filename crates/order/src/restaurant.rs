//! Restaurant-availability lookup, the one synchronous call made while
//! placing an order.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use circuit_breaker::{CallError, CircuitBreaker};
use common::RestaurantId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name reported for a restaurant when the lookup fell back.
pub const FALLBACK_RESTAURANT_NAME: &str = "Restaurant (Service Unavailable)";

/// What the order service needs to know about a restaurant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: RestaurantId,
    pub name: String,
    pub available: bool,
}

impl Restaurant {
    pub fn new(id: RestaurantId, name: impl Into<String>, available: bool) -> Self {
        Self {
            id,
            name: name.into(),
            available,
        }
    }
}

/// Failure of a restaurant lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestaurantLookupError {
    #[error("Restaurant {0} not found")]
    NotFound(RestaurantId),

    #[error("Restaurant service unreachable: {0}")]
    Unreachable(String),
}

/// Client for the restaurant service.
#[async_trait]
pub trait RestaurantClient: Send + Sync {
    async fn get_restaurant(&self, id: RestaurantId)
    -> Result<Restaurant, RestaurantLookupError>;
}

/// Restaurant client protected by a circuit breaker.
///
/// Never fails: a rejected or failed lookup falls back to a restaurant that
/// reports itself available, so order placement survives an outage of the
/// restaurant service.
pub struct GuardedRestaurantClient {
    inner: Arc<dyn RestaurantClient>,
    breaker: Arc<CircuitBreaker>,
}

impl GuardedRestaurantClient {
    pub fn new(inner: Arc<dyn RestaurantClient>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    #[tracing::instrument(skip(self))]
    pub async fn check(&self, id: RestaurantId) -> Restaurant {
        self.breaker
            .call(
                || self.inner.get_restaurant(id),
                |err| {
                    match &err {
                        CallError::Rejected(open) => {
                            tracing::warn!(restaurant_id = %id, reason = %open, "restaurant lookup short-circuited, using fallback");
                        }
                        CallError::Failed(cause) => {
                            tracing::warn!(restaurant_id = %id, reason = %cause, "restaurant lookup failed, using fallback");
                        }
                    }
                    Restaurant::new(id, FALLBACK_RESTAURANT_NAME, true)
                },
            )
            .await
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    restaurants: HashMap<RestaurantId, Restaurant>,
    unreachable: bool,
    calls: usize,
}

/// In-process restaurant directory.
///
/// Serves the binary's seeded restaurants and lets tests simulate an outage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRestaurantDirectory {
    state: Arc<RwLock<DirectoryState>>,
}

impl InMemoryRestaurantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `count` open restaurants with ids 1..=count.
    pub fn seeded(count: i64) -> Self {
        let directory = Self::new();
        for id in 1..=count {
            directory.upsert(Restaurant::new(
                RestaurantId::new(id),
                format!("Restaurant {id}"),
                true,
            ));
        }
        directory
    }

    pub fn upsert(&self, restaurant: Restaurant) {
        self.state
            .write()
            .unwrap()
            .restaurants
            .insert(restaurant.id, restaurant);
    }

    /// Makes every lookup fail until switched back.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.write().unwrap().unreachable = unreachable;
    }

    /// Number of lookups that reached the directory.
    pub fn call_count(&self) -> usize {
        self.state.read().unwrap().calls
    }
}

#[async_trait]
impl RestaurantClient for InMemoryRestaurantDirectory {
    async fn get_restaurant(
        &self,
        id: RestaurantId,
    ) -> Result<Restaurant, RestaurantLookupError> {
        let mut state = self.state.write().unwrap();
        state.calls += 1;

        if state.unreachable {
            return Err(RestaurantLookupError::Unreachable(
                "connection refused".to_string(),
            ));
        }

        state
            .restaurants
            .get(&id)
            .cloned()
            .ok_or(RestaurantLookupError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use circuit_breaker::{CircuitBreakerConfig, CircuitState};

    use super::*;

    fn guarded(directory: &InMemoryRestaurantDirectory) -> GuardedRestaurantClient {
        let config = CircuitBreakerConfig {
            wait_duration_in_open_state: Duration::from_secs(60),
            ..CircuitBreakerConfig::named("restaurant-service")
        };
        GuardedRestaurantClient::new(
            Arc::new(directory.clone()),
            Arc::new(CircuitBreaker::new(config)),
        )
    }

    #[tokio::test]
    async fn test_live_lookup_returns_directory_entry() {
        let directory = InMemoryRestaurantDirectory::seeded(2);
        directory.upsert(Restaurant::new(RestaurantId::new(2), "Closed Kitchen", false));
        let client = guarded(&directory);

        let open = client.check(RestaurantId::new(1)).await;
        assert_eq!(open.name, "Restaurant 1");
        assert!(open.available);

        let closed = client.check(RestaurantId::new(2)).await;
        assert!(!closed.available);
    }

    #[tokio::test]
    async fn test_failed_lookup_falls_back_to_available() {
        let directory = InMemoryRestaurantDirectory::seeded(1);
        directory.set_unreachable(true);
        let client = guarded(&directory);

        let restaurant = client.check(RestaurantId::new(1)).await;

        assert_eq!(restaurant.name, FALLBACK_RESTAURANT_NAME);
        assert!(restaurant.available);
        assert_eq!(directory.call_count(), 1);
    }

    #[tokio::test]
    async fn test_open_breaker_stops_calling_directory() {
        let directory = InMemoryRestaurantDirectory::seeded(1);
        directory.set_unreachable(true);
        let client = guarded(&directory);

        for _ in 0..10 {
            client.check(RestaurantId::new(1)).await;
        }
        assert_eq!(client.breaker().state().await, CircuitState::Open);
        assert_eq!(directory.call_count(), 10);

        directory.set_unreachable(false);
        let restaurant = client.check(RestaurantId::new(1)).await;

        assert_eq!(restaurant.name, FALLBACK_RESTAURANT_NAME);
        assert_eq!(directory.call_count(), 10);
    }
}
