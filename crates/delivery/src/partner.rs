//! Delivery partners and their allocation.

use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use common::PartnerId;
use serde::{Deserialize, Serialize};

use crate::{DeliveryError, Result};

/// Availability of a partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum PartnerStatus {
    Available = 0,
    Busy = 1,
    Offline = 2,
}

impl PartnerStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PartnerStatus::Available,
            1 => PartnerStatus::Busy,
            _ => PartnerStatus::Offline,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PartnerStatus::Available => "AVAILABLE",
            PartnerStatus::Busy => "BUSY",
            PartnerStatus::Offline => "OFFLINE",
        }
    }
}

impl std::fmt::Display for PartnerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    #[default]
    Bike,
    Scooter,
    Bicycle,
    Car,
}

/// Static partner details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerProfile {
    pub id: PartnerId,
    pub name: String,
    pub phone: String,
    pub vehicle_type: VehicleType,
    pub vehicle_number: Option<String>,
    pub rating: f64,
}

impl PartnerProfile {
    pub fn new(id: PartnerId, name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            phone: phone.into(),
            vehicle_type: VehicleType::default(),
            vehicle_number: None,
            rating: 0.0,
        }
    }
}

/// A partner as seen from outside the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryPartner {
    #[serde(flatten)]
    pub profile: PartnerProfile,
    pub status: PartnerStatus,
    pub total_deliveries: u32,
}

#[derive(Debug)]
struct Slot {
    profile: PartnerProfile,
    status: AtomicU8,
    deliveries: AtomicU32,
}

impl Slot {
    fn transition(&self, from: PartnerStatus, to: PartnerStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn status(&self) -> PartnerStatus {
        PartnerStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn snapshot(&self) -> DeliveryPartner {
        DeliveryPartner {
            profile: self.profile.clone(),
            status: self.status(),
            total_deliveries: self.deliveries.load(Ordering::Relaxed),
        }
    }
}

/// Fixed table of partners, ordered by id.
///
/// The set of partners is fixed at construction; only their status and
/// delivery count change. All status changes are compare-and-swap on the
/// partner's slot.
#[derive(Debug, Default)]
pub struct PartnerRegistry {
    slots: Vec<Slot>,
}

impl PartnerRegistry {
    /// Builds the table. Every partner starts AVAILABLE. Duplicate ids keep
    /// the first profile.
    pub fn new(profiles: impl IntoIterator<Item = PartnerProfile>) -> Self {
        let mut profiles: Vec<PartnerProfile> = profiles.into_iter().collect();
        profiles.sort_by_key(|p| p.id);
        profiles.dedup_by_key(|p| p.id);

        let slots = profiles
            .into_iter()
            .map(|profile| Slot {
                profile,
                status: AtomicU8::new(PartnerStatus::Available as u8),
                deliveries: AtomicU32::new(0),
            })
            .collect();
        Self { slots }
    }

    /// Demo partners with ids 1..=count.
    pub fn seeded(count: i64) -> Self {
        Self::new((1..=count).map(|id| {
            PartnerProfile::new(
                PartnerId::new(id),
                format!("Partner {id}"),
                format!("+91-90000{id:05}"),
            )
        }))
    }

    fn slot(&self, id: PartnerId) -> Result<&Slot> {
        self.slots
            .binary_search_by_key(&id, |s| s.profile.id)
            .map(|index| &self.slots[index])
            .map_err(|_| DeliveryError::UnknownPartner(id))
    }

    /// Reserves the lowest-id AVAILABLE partner, skipping `exclude`.
    ///
    /// A partner taken by a concurrent caller between the read and the swap
    /// is skipped and the scan moves on to the next one.
    pub fn reserve_first_available(&self, exclude: Option<PartnerId>) -> Option<PartnerId> {
        self.slots
            .iter()
            .filter(|slot| Some(slot.profile.id) != exclude)
            .find(|slot| slot.transition(PartnerStatus::Available, PartnerStatus::Busy))
            .map(|slot| slot.profile.id)
    }

    /// Returns a BUSY partner to AVAILABLE. Returns false if it was not busy.
    pub fn release(&self, id: PartnerId) -> Result<bool> {
        Ok(self
            .slot(id)?
            .transition(PartnerStatus::Busy, PartnerStatus::Available))
    }

    /// Moves an OFFLINE partner back to AVAILABLE.
    ///
    /// Never frees a BUSY partner: that only happens when its delivery ends.
    pub fn mark_available(&self, id: PartnerId) -> Result<PartnerStatus> {
        let slot = self.slot(id)?;
        slot.transition(PartnerStatus::Offline, PartnerStatus::Available);
        Ok(slot.status())
    }

    /// Takes an AVAILABLE partner offline.
    pub fn mark_offline(&self, id: PartnerId) -> Result<PartnerStatus> {
        let slot = self.slot(id)?;
        if slot.transition(PartnerStatus::Available, PartnerStatus::Offline) {
            return Ok(PartnerStatus::Offline);
        }
        match slot.status() {
            PartnerStatus::Busy => Err(DeliveryError::PartnerBusy(id)),
            status => Ok(status),
        }
    }

    pub fn record_delivery(&self, id: PartnerId) -> Result<u32> {
        Ok(self.slot(id)?.deliveries.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn status(&self, id: PartnerId) -> Result<PartnerStatus> {
        Ok(self.slot(id)?.status())
    }

    pub fn get(&self, id: PartnerId) -> Result<DeliveryPartner> {
        Ok(self.slot(id)?.snapshot())
    }

    pub fn list(&self) -> Vec<DeliveryPartner> {
        self.slots.iter().map(Slot::snapshot).collect()
    }

    pub fn count_with_status(&self, status: PartnerStatus) -> usize {
        self.slots.iter().filter(|s| s.status() == status).count()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_reserves_lowest_id_first() {
        let registry = PartnerRegistry::new([
            PartnerProfile::new(PartnerId::new(30), "C", "3"),
            PartnerProfile::new(PartnerId::new(10), "A", "1"),
            PartnerProfile::new(PartnerId::new(20), "B", "2"),
        ]);

        assert_eq!(registry.reserve_first_available(None), Some(PartnerId::new(10)));
        assert_eq!(registry.reserve_first_available(None), Some(PartnerId::new(20)));
        assert_eq!(registry.status(PartnerId::new(10)).unwrap(), PartnerStatus::Busy);
        assert_eq!(registry.count_with_status(PartnerStatus::Available), 1);
    }

    #[test]
    fn test_exclusion_and_exhaustion() {
        let registry = PartnerRegistry::seeded(2);

        assert_eq!(
            registry.reserve_first_available(Some(PartnerId::new(1))),
            Some(PartnerId::new(2))
        );
        assert_eq!(registry.reserve_first_available(Some(PartnerId::new(1))), None);
        assert_eq!(registry.reserve_first_available(None), Some(PartnerId::new(1)));
        assert_eq!(registry.reserve_first_available(None), None);
    }

    #[test]
    fn test_release_only_frees_busy_partner() {
        let registry = PartnerRegistry::seeded(1);
        let id = registry.reserve_first_available(None).unwrap();

        assert!(registry.release(id).unwrap());
        assert!(!registry.release(id).unwrap());
        assert_eq!(registry.status(id).unwrap(), PartnerStatus::Available);
    }

    #[test]
    fn test_offline_toggle() {
        let registry = PartnerRegistry::seeded(2);
        let one = PartnerId::new(1);

        assert_eq!(registry.mark_offline(one).unwrap(), PartnerStatus::Offline);
        assert_eq!(registry.reserve_first_available(None), Some(PartnerId::new(2)));
        assert_eq!(registry.mark_available(one).unwrap(), PartnerStatus::Available);
        assert_eq!(registry.reserve_first_available(None), Some(one));
    }

    #[test]
    fn test_mark_available_never_frees_busy_partner() {
        let registry = PartnerRegistry::seeded(1);
        let id = registry.reserve_first_available(None).unwrap();

        assert_eq!(registry.mark_available(id).unwrap(), PartnerStatus::Busy);
        assert!(matches!(
            registry.mark_offline(id),
            Err(DeliveryError::PartnerBusy(_))
        ));
    }

    #[test]
    fn test_unknown_partner() {
        let registry = PartnerRegistry::seeded(1);
        assert!(matches!(
            registry.release(PartnerId::new(9)),
            Err(DeliveryError::UnknownPartner(_))
        ));
        assert!(registry.get(PartnerId::new(9)).is_err());
    }

    #[test]
    fn test_delivery_count() {
        let registry = PartnerRegistry::seeded(1);
        registry.record_delivery(PartnerId::new(1)).unwrap();
        assert_eq!(registry.record_delivery(PartnerId::new(1)).unwrap(), 2);
        assert_eq!(registry.get(PartnerId::new(1)).unwrap().total_deliveries, 2);
    }

    #[test]
    fn test_concurrent_reservations_never_share_a_partner() {
        let registry = Arc::new(PartnerRegistry::seeded(16));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.reserve_first_available(None))
            })
            .collect();
        let reserved: Vec<PartnerId> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();

        let unique: HashSet<PartnerId> = reserved.iter().copied().collect();
        assert_eq!(reserved.len(), 16);
        assert_eq!(unique.len(), 16);
        assert_eq!(registry.count_with_status(PartnerStatus::Available), 0);
    }

    #[test]
    fn test_snapshot_serializes_flat() {
        let registry = PartnerRegistry::seeded(1);
        let json = serde_json::to_value(registry.get(PartnerId::new(1)).unwrap()).unwrap();

        assert_eq!(json["id"], 1);
        assert_eq!(json["status"], "AVAILABLE");
        assert_eq!(json["vehicle_type"], "BIKE");
    }
}
