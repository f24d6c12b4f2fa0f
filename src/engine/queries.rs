use std::collections::BTreeMap;

use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::*;

use super::{EngineError, ReservationManager};

impl ReservationManager {
    pub fn occupancy(&self, resource_id: ResourceId) -> Result<u32, EngineError> {
        self.validate_resource(resource_id)?;
        Ok(self.occupancy.get(resource_id))
    }

    /// Snapshot of one room's reservations, ordered by start.
    pub fn reservations_for(&self, resource_id: ResourceId) -> Result<Vec<Reservation>, EngineError> {
        self.validate_resource(resource_id)?;
        Ok(self.store.list_for_resource(resource_id))
    }

    /// Snapshot of every room that has reservations.
    pub fn all_reservations(&self) -> BTreeMap<ResourceId, Vec<Reservation>> {
        self.store.all()
    }

    pub fn find(&self, id: &Ulid) -> Option<Reservation> {
        self.store.find_by_id(id)
    }

    pub fn is_release_armed(&self, id: &Ulid) -> bool {
        self.releases.is_armed(id)
    }

    pub fn pending_releases(&self) -> usize {
        self.releases.pending_count()
    }

    pub fn subscribe(&self, resource_id: ResourceId) -> broadcast::Receiver<ReservationEvent> {
        self.notify.subscribe(resource_id)
    }
}
