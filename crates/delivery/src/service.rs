//! Delivery assignment and tracking.

use std::sync::Arc;

use chrono::Utc;
use common::{DeliveryId, OrderId, PartnerId};
use event_bus::{EventBus, EventBusExt, EventEnvelope, Topic};
use tokio::sync::Mutex;

use crate::model::estimate;
use crate::{
    AssignmentRequest, Delivery, DeliveryConfig, DeliveryError, DeliveryPartner,
    DeliveryRepository, DeliveryStatus, PartnerRegistry, PartnerStatus, Result,
};

/// Owner of deliveries and partner allocation.
///
/// Assignment is lock-free: the partner is taken with a compare-and-swap and
/// the record is stored only if the order has none yet. Changes to an
/// existing delivery are serialized.
pub struct DeliveryService {
    partners: Arc<PartnerRegistry>,
    repository: Arc<dyn DeliveryRepository>,
    bus: Arc<dyn EventBus>,
    config: DeliveryConfig,
    writes: Mutex<()>,
}

impl DeliveryService {
    pub fn new(
        partners: Arc<PartnerRegistry>,
        repository: Arc<dyn DeliveryRepository>,
        bus: Arc<dyn EventBus>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            partners,
            repository,
            bus,
            config,
            writes: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub fn partners(&self) -> &Arc<PartnerRegistry> {
        &self.partners
    }

    /// Assigns the first available partner to a paid order and publishes
    /// `DELIVERY_ASSIGNED`.
    ///
    /// An order that already has a delivery gets it back unchanged.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn assign(&self, request: AssignmentRequest) -> Result<Delivery> {
        if let Some(existing) = self.repository.get_by_order(request.order_id).await? {
            tracing::debug!(delivery_id = %existing.id, "delivery already assigned");
            return Ok(existing);
        }

        let Some(partner_id) = self.partners.reserve_first_available(None) else {
            metrics::counter!("delivery_assignment_failures_total").increment(1);
            tracing::error!("no delivery partner available");
            return Err(DeliveryError::NoPartnerAvailable);
        };

        let candidate = Delivery::assigned(&request, partner_id, self.config.estimated_delivery);
        let (delivery, inserted) = match self.repository.insert_if_absent(candidate).await {
            Ok(stored) => stored,
            Err(err) => {
                self.release(partner_id);
                return Err(err);
            }
        };
        if !inserted {
            self.release(partner_id);
            tracing::debug!(delivery_id = %delivery.id, "lost assignment race, returning existing delivery");
            return Ok(delivery);
        }

        metrics::counter!("deliveries_assigned_total").increment(1);
        tracing::info!(delivery_id = %delivery.id, %partner_id, "delivery partner assigned");
        self.publish(&delivery, DeliveryStatus::Assigned);
        Ok(delivery)
    }

    /// Moves a delivery to `status` and publishes `DELIVERY_<STATUS>`.
    ///
    /// DELIVERED, FAILED and CANCELLED release the partner.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, id: DeliveryId, status: DeliveryStatus) -> Result<Delivery> {
        let _guard = self.writes.lock().await;
        let delivery = self
            .repository
            .get(id)
            .await?
            .ok_or(DeliveryError::NotFound(id))?;
        self.apply_status(delivery, status).await
    }

    /// Gives the delivery of an order to another partner.
    ///
    /// The new partner is reserved before the current one is released, so
    /// the current partner is never picked again. With nobody else free the
    /// delivery is left untouched.
    #[tracing::instrument(skip(self))]
    pub async fn reassign(&self, order_id: OrderId) -> Result<Delivery> {
        let _guard = self.writes.lock().await;
        let mut delivery = self.by_order(order_id).await?;

        if matches!(
            delivery.status,
            DeliveryStatus::Delivered | DeliveryStatus::Cancelled
        ) {
            return Err(DeliveryError::InvalidState {
                delivery_id: delivery.id,
                status: delivery.status,
                action: "reassign".to_string(),
            });
        }

        let previous = delivery.partner_id;
        let held_previous = !delivery.status.is_terminal();
        let Some(next) = self.partners.reserve_first_available(Some(previous)) else {
            metrics::counter!("delivery_assignment_failures_total").increment(1);
            tracing::error!(%previous, "no other delivery partner available");
            return Err(DeliveryError::NoPartnerAvailable);
        };

        let now = Utc::now();
        delivery.partner_id = next;
        delivery.status = DeliveryStatus::Assigned;
        delivery.assigned_at = now;
        delivery.picked_up_at = None;
        delivery.estimated_delivery_time = estimate(now, self.config.estimated_delivery);
        if let Err(err) = self.repository.save(&delivery).await {
            self.release(next);
            return Err(err);
        }
        if held_previous {
            self.release(previous);
        }

        metrics::counter!("deliveries_assigned_total").increment(1);
        tracing::info!(delivery_id = %delivery.id, %previous, %next, "delivery reassigned");
        self.publish(&delivery, DeliveryStatus::Assigned);
        Ok(delivery)
    }

    /// Cancels the delivery of an order.
    ///
    /// A missing or already finished delivery is not an error.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, order_id: OrderId) -> Result<Option<Delivery>> {
        let _guard = self.writes.lock().await;
        let Some(delivery) = self.repository.get_by_order(order_id).await? else {
            tracing::debug!("no delivery to cancel");
            return Ok(None);
        };
        if delivery.status.is_terminal() {
            tracing::debug!(status = %delivery.status, "delivery already finished");
            return Ok(Some(delivery));
        }
        self.apply_status(delivery, DeliveryStatus::Cancelled)
            .await
            .map(Some)
    }

    pub async fn get(&self, id: DeliveryId) -> Result<Delivery> {
        self.repository
            .get(id)
            .await?
            .ok_or(DeliveryError::NotFound(id))
    }

    pub async fn by_order(&self, order_id: OrderId) -> Result<Delivery> {
        self.repository
            .get_by_order(order_id)
            .await?
            .ok_or(DeliveryError::NotFoundForOrder(order_id))
    }

    pub async fn by_partner(&self, partner_id: PartnerId) -> Result<Vec<Delivery>> {
        self.partners.status(partner_id)?;
        self.repository.by_partner(partner_id).await
    }

    pub fn list_partners(&self) -> Vec<DeliveryPartner> {
        self.partners.list()
    }

    pub fn get_partner(&self, partner_id: PartnerId) -> Result<DeliveryPartner> {
        self.partners.get(partner_id)
    }

    /// Brings an OFFLINE partner back. A BUSY partner stays busy.
    #[tracing::instrument(skip(self))]
    pub fn mark_partner_available(&self, partner_id: PartnerId) -> Result<DeliveryPartner> {
        let status = self.partners.mark_available(partner_id)?;
        if status == PartnerStatus::Busy {
            tracing::debug!("partner is on a delivery and stays busy");
        }
        self.partners.get(partner_id)
    }

    #[tracing::instrument(skip(self))]
    pub fn mark_partner_offline(&self, partner_id: PartnerId) -> Result<DeliveryPartner> {
        self.partners.mark_offline(partner_id)?;
        self.partners.get(partner_id)
    }

    async fn apply_status(&self, mut delivery: Delivery, status: DeliveryStatus) -> Result<Delivery> {
        if delivery.status == status {
            tracing::debug!(%status, "delivery already in requested status");
            return Ok(delivery);
        }
        if !delivery.status.can_transition_to(status) {
            return Err(DeliveryError::InvalidState {
                delivery_id: delivery.id,
                status: delivery.status,
                action: format!("move to {status}"),
            });
        }

        let from = delivery.status;
        let now = Utc::now();
        delivery.status = status;
        match status {
            DeliveryStatus::PickedUp => delivery.picked_up_at = Some(now),
            DeliveryStatus::Delivered => delivery.delivered_at = Some(now),
            _ => {}
        }
        self.repository.save(&delivery).await?;

        if status.is_terminal() {
            self.release(delivery.partner_id);
        }
        if status == DeliveryStatus::Delivered {
            if let Err(err) = self.partners.record_delivery(delivery.partner_id) {
                tracing::warn!(error = %err, "could not count delivery for partner");
            }
        }

        tracing::info!(delivery_id = %delivery.id, %from, to = %status, "delivery status updated");
        self.publish(&delivery, status);
        Ok(delivery)
    }

    fn release(&self, partner_id: PartnerId) {
        match self.partners.release(partner_id) {
            Ok(true) => tracing::debug!(%partner_id, "partner released"),
            Ok(false) => tracing::warn!(%partner_id, "released partner was not busy"),
            Err(err) => tracing::warn!(error = %err, "could not release partner"),
        }
    }

    fn publish(&self, delivery: &Delivery, status: DeliveryStatus) {
        let envelope = EventEnvelope::builder(status.event_type(), delivery.order_id)
            .user_id(delivery.user_id)
            .restaurant_id(delivery.restaurant_id)
            .delivery_partner_id(delivery.partner_id)
            .build();
        self.bus.publish_envelope(Topic::DeliveryEvents, envelope);
    }
}
