//! Payment persistence, keyed by order.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, UserId};
use tokio::sync::RwLock;

use crate::{Payment, PaymentError, Result};

/// Storage for payments. At most one payment exists per order.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Stores `payment` unless the order already has one.
    ///
    /// Returns the stored record and whether it was inserted by this call.
    async fn insert_if_absent(&self, payment: Payment) -> Result<(Payment, bool)>;

    /// Replaces the payment stored for `payment.order_id`.
    async fn save(&self, payment: &Payment) -> Result<()>;

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Payment>>;

    /// Returns a user's payments, newest first.
    async fn by_user(&self, user_id: UserId) -> Result<Vec<Payment>>;
}

/// In-memory payment repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentRepository {
    payments: Arc<RwLock<HashMap<OrderId, Payment>>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.payments.read().await.len()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn insert_if_absent(&self, payment: Payment) -> Result<(Payment, bool)> {
        match self.payments.write().await.entry(payment.order_id) {
            Entry::Occupied(existing) => Ok((existing.get().clone(), false)),
            Entry::Vacant(slot) => Ok((slot.insert(payment).clone(), true)),
        }
    }

    async fn save(&self, payment: &Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        match payments.get_mut(&payment.order_id) {
            Some(stored) if stored.id == payment.id => {
                *stored = payment.clone();
                Ok(())
            }
            Some(_) => Err(PaymentError::Repository(format!(
                "order {} already has a different payment",
                payment.order_id
            ))),
            None => Err(PaymentError::NotFound(payment.order_id)),
        }
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self.payments.read().await.get(&order_id).cloned())
    }

    async fn by_user(&self, user_id: UserId) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .payments
            .read()
            .await
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use common::Money;

    use super::*;
    use crate::{PaymentMethod, PaymentRequest, PaymentState};

    fn payment(order_id: OrderId, user: i64) -> Payment {
        Payment::processing(&PaymentRequest {
            order_id,
            user_id: UserId::new(user),
            restaurant_id: None,
            amount: Money::from_units(10),
            method: PaymentMethod::CreditCard,
        })
    }

    #[tokio::test]
    async fn test_insert_if_absent_keeps_first_record() {
        let repo = InMemoryPaymentRepository::new();
        let order_id = OrderId::new();
        let first = payment(order_id, 1);
        let second = payment(order_id, 1);

        let (stored, inserted) = repo.insert_if_absent(first.clone()).await.unwrap();
        assert!(inserted);
        assert_eq!(stored, first);

        let (stored, inserted) = repo.insert_if_absent(second).await.unwrap();
        assert!(!inserted);
        assert_eq!(stored.id, first.id);
        assert_eq!(repo.count().await, 1);
    }

    #[tokio::test]
    async fn test_save_updates_matching_record_only() {
        let repo = InMemoryPaymentRepository::new();
        let order_id = OrderId::new();
        let mut first = payment(order_id, 1);
        repo.insert_if_absent(first.clone()).await.unwrap();

        first.status = PaymentState::Success;
        repo.save(&first).await.unwrap();
        assert_eq!(
            repo.get_by_order(order_id).await.unwrap().unwrap().status,
            PaymentState::Success
        );

        let impostor = payment(order_id, 1);
        assert!(matches!(
            repo.save(&impostor).await,
            Err(PaymentError::Repository(_))
        ));
        assert!(matches!(
            repo.save(&payment(OrderId::new(), 1)).await,
            Err(PaymentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_by_user_filters() {
        let repo = InMemoryPaymentRepository::new();
        repo.insert_if_absent(payment(OrderId::new(), 1)).await.unwrap();
        repo.insert_if_absent(payment(OrderId::new(), 1)).await.unwrap();
        repo.insert_if_absent(payment(OrderId::new(), 2)).await.unwrap();

        assert_eq!(repo.by_user(UserId::new(1)).await.unwrap().len(), 2);
        assert!(repo.by_user(UserId::new(3)).await.unwrap().is_empty());
    }
}
