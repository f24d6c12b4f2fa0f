use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ulid::Ulid;

use crate::model::*;

use super::EngineError;

pub type SharedRoom = Arc<Mutex<RoomState>>;

/// Lock a room. A panic while holding the guard cannot leave the room list
/// half-updated, so poisoning is ignored.
pub(crate) fn lock_room(room: &SharedRoom) -> MutexGuard<'_, RoomState> {
    room.lock().unwrap_or_else(|e| e.into_inner())
}

/// Active reservations: one sorted list per room plus an id index.
///
/// Mutations take the caller's room guard and do no locking of their own;
/// check-then-insert and read-then-remove stay atomic only as long as the
/// caller holds that guard across the whole sequence.
pub struct ReservationStore {
    rooms: DashMap<ResourceId, SharedRoom>,
    by_id: DashMap<Ulid, Reservation>,
}

impl Default for ReservationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReservationStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            by_id: DashMap::new(),
        }
    }

    // ── Rooms ────────────────────────────────────────────────

    /// The room's lock, created on first use. Exactly one per room id.
    pub fn room(&self, id: ResourceId) -> SharedRoom {
        self.rooms
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(RoomState::new(id))))
            .value()
            .clone()
    }

    fn existing_room(&self, id: ResourceId) -> Option<SharedRoom> {
        self.rooms.get(&id).map(|e| e.value().clone())
    }

    // ── Mutations (caller holds the room guard) ──────────────

    pub fn insert(&self, room: &mut RoomState, reservation: Reservation) -> Result<(), EngineError> {
        debug_assert_eq!(room.id, reservation.resource_id);
        match self.by_id.entry(reservation.id) {
            Entry::Occupied(_) => Err(EngineError::AlreadyExists(reservation.id)),
            Entry::Vacant(slot) => {
                slot.insert(reservation.clone());
                room.insert_reservation(reservation);
                Ok(())
            }
        }
    }

    pub fn remove(&self, room: &mut RoomState, id: Ulid) -> Option<Reservation> {
        let removed = room.remove_reservation(id)?;
        self.by_id.remove(&id);
        Some(removed)
    }

    // ── Reads ────────────────────────────────────────────────

    pub fn find_by_id(&self, id: &Ulid) -> Option<Reservation> {
        self.by_id.get(id).map(|e| e.value().clone())
    }

    /// Copy of the room's list; later mutations are not visible through it.
    pub fn list_for_resource(&self, id: ResourceId) -> Vec<Reservation> {
        match self.existing_room(id) {
            Some(room) => lock_room(&room).reservations.clone(),
            None => Vec::new(),
        }
    }

    /// Copy of every non-empty room list. Rooms are locked one at a time.
    pub fn all(&self) -> BTreeMap<ResourceId, Vec<Reservation>> {
        let rooms: Vec<(ResourceId, SharedRoom)> = self
            .rooms
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        rooms
            .into_iter()
            .filter_map(|(id, room)| {
                let list = lock_room(&room).reservations.clone();
                (!list.is_empty()).then_some((id, list))
            })
            .collect()
    }
}
