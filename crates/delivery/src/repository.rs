//! Delivery persistence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{DeliveryId, OrderId, PartnerId};
use tokio::sync::RwLock;

use crate::{Delivery, DeliveryError, Result};

/// Storage for deliveries. At most one delivery exists per order.
#[async_trait]
pub trait DeliveryRepository: Send + Sync {
    /// Stores `delivery` unless its order already has one.
    ///
    /// Returns the stored record and whether it was inserted by this call.
    async fn insert_if_absent(&self, delivery: Delivery) -> Result<(Delivery, bool)>;

    /// Replaces a stored delivery.
    async fn save(&self, delivery: &Delivery) -> Result<()>;

    async fn get(&self, id: DeliveryId) -> Result<Option<Delivery>>;

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Delivery>>;

    /// Returns every delivery a partner has carried, newest assignment first.
    async fn by_partner(&self, partner_id: PartnerId) -> Result<Vec<Delivery>>;
}

#[derive(Debug, Default)]
struct DeliveryState {
    deliveries: HashMap<DeliveryId, Delivery>,
    by_order: HashMap<OrderId, DeliveryId>,
}

/// In-memory delivery repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeliveryRepository {
    state: Arc<RwLock<DeliveryState>>,
}

impl InMemoryDeliveryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.state.read().await.deliveries.len()
    }
}

#[async_trait]
impl DeliveryRepository for InMemoryDeliveryRepository {
    async fn insert_if_absent(&self, delivery: Delivery) -> Result<(Delivery, bool)> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .by_order
            .get(&delivery.order_id)
            .and_then(|id| state.deliveries.get(id))
        {
            return Ok((existing.clone(), false));
        }

        state.by_order.insert(delivery.order_id, delivery.id);
        state.deliveries.insert(delivery.id, delivery.clone());
        Ok((delivery, true))
    }

    async fn save(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.state.write().await;
        match state.deliveries.get_mut(&delivery.id) {
            Some(stored) if stored.order_id == delivery.order_id => {
                *stored = delivery.clone();
                Ok(())
            }
            Some(_) => Err(DeliveryError::Repository(format!(
                "delivery {} belongs to another order",
                delivery.id
            ))),
            None => Err(DeliveryError::NotFound(delivery.id)),
        }
    }

    async fn get(&self, id: DeliveryId) -> Result<Option<Delivery>> {
        Ok(self.state.read().await.deliveries.get(&id).cloned())
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Delivery>> {
        let state = self.state.read().await;
        Ok(state
            .by_order
            .get(&order_id)
            .and_then(|id| state.deliveries.get(id))
            .cloned())
    }

    async fn by_partner(&self, partner_id: PartnerId) -> Result<Vec<Delivery>> {
        let mut deliveries: Vec<Delivery> = self
            .state
            .read()
            .await
            .deliveries
            .values()
            .filter(|d| d.partner_id == partner_id)
            .cloned()
            .collect();
        deliveries.sort_by(|a, b| b.assigned_at.cmp(&a.assigned_at));
        Ok(deliveries)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{AssignmentRequest, DeliveryStatus};

    fn delivery(order_id: OrderId, partner: i64) -> Delivery {
        Delivery::assigned(
            &AssignmentRequest::new(order_id),
            PartnerId::new(partner),
            Duration::from_secs(1800),
        )
    }

    #[tokio::test]
    async fn test_one_delivery_per_order() {
        let repo = InMemoryDeliveryRepository::new();
        let order_id = OrderId::new();
        let first = delivery(order_id, 1);

        let (_, inserted) = repo.insert_if_absent(first.clone()).await.unwrap();
        assert!(inserted);
        let (stored, inserted) = repo.insert_if_absent(delivery(order_id, 2)).await.unwrap();
        assert!(!inserted);
        assert_eq!(stored, first);
        assert_eq!(repo.count().await, 1);
        assert_eq!(repo.get_by_order(order_id).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_save_and_lookup() {
        let repo = InMemoryDeliveryRepository::new();
        let mut d = delivery(OrderId::new(), 3);
        repo.insert_if_absent(d.clone()).await.unwrap();

        d.status = DeliveryStatus::PickedUp;
        repo.save(&d).await.unwrap();

        assert_eq!(
            repo.get(d.id).await.unwrap().unwrap().status,
            DeliveryStatus::PickedUp
        );
        assert!(matches!(
            repo.save(&delivery(OrderId::new(), 3)).await,
            Err(DeliveryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_by_partner() {
        let repo = InMemoryDeliveryRepository::new();
        repo.insert_if_absent(delivery(OrderId::new(), 1)).await.unwrap();
        repo.insert_if_absent(delivery(OrderId::new(), 1)).await.unwrap();
        repo.insert_if_absent(delivery(OrderId::new(), 2)).await.unwrap();

        assert_eq!(repo.by_partner(PartnerId::new(1)).await.unwrap().len(), 2);
        assert!(repo.by_partner(PartnerId::new(5)).await.unwrap().is_empty());
    }
}
