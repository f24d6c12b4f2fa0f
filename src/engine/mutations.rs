use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::MAX_RESERVATIONS_PER_ROOM;
use crate::model::*;
use crate::release::ReleaseOutcome;

use super::conflict::{check_no_conflict, now_ms, validate_request};
use super::store::lock_room;
use super::{EngineError, ReservationManager};

impl ReservationManager {
    /// Accept a reservation unless it overlaps an active one on the same room.
    /// On success an auto-release is armed; on any error nothing changes.
    pub fn book(&self, reservation: Reservation) -> Result<Reservation, EngineError> {
        validate_request(&reservation, now_ms(), self.start_tolerance)?;
        let resource_id = reservation.resource_id;
        self.validate_resource(resource_id)?;

        let room = self.store.room(resource_id);
        let mut guard = lock_room(&room);
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many reservations on room"));
        }

        if let Err(e) = check_no_conflict(&guard, &reservation.span()) {
            warn!("reservation {} on room {resource_id} rejected: {e}", reservation.id);
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let id = reservation.id;
        self.store.insert(&mut guard, reservation.clone())?;

        let me = self.me.clone();
        let armed = self.releases.arm(id, resource_id, move || match me.upgrade() {
            Some(manager) => manager.auto_release(id, resource_id),
            None => Ok(ReleaseOutcome::AlreadyGone),
        });
        if let Err(e) = armed {
            self.store.remove(&mut guard, id);
            return Err(e);
        }

        info!(
            "reservation {id} booked: room {resource_id}, owner {}, [{}, {})",
            reservation.owner.id,
            reservation.start,
            reservation.end()
        );
        metrics::counter!(crate::observability::RESERVATIONS_BOOKED_TOTAL).increment(1);
        self.notify.send(
            resource_id,
            ReservationEvent::Booked {
                id,
                resource_id,
                span: reservation.span(),
                owner: reservation.owner.id.clone(),
            },
        );
        Ok(reservation)
    }

    /// Remove a reservation and its pending release. `false` if the id is unknown.
    pub fn cancel(&self, id: Ulid) -> bool {
        let Some(existing) = self.store.find_by_id(&id) else {
            info!("attempted to cancel unknown reservation {id}");
            return false;
        };
        let resource_id = existing.resource_id;
        let room = self.store.room(resource_id);
        let mut guard = lock_room(&room);

        // Auto-release or another cancel may have won between lookup and lock.
        if self.store.remove(&mut guard, id).is_none() {
            debug!("reservation {id} vanished before cancel took the lock");
            return false;
        }
        self.releases.disarm(&id);

        info!("reservation {id} cancelled (room {resource_id})");
        metrics::counter!(crate::observability::RESERVATIONS_CANCELLED_TOTAL).increment(1);
        self.notify.send(resource_id, ReservationEvent::Cancelled { id, resource_id });
        true
    }

    /// Record a sensor reading. Reaching the occupancy threshold permanently
    /// disarms auto-release for every reservation currently on the room;
    /// dropping below it later re-arms nothing.
    pub fn update_occupancy(&self, resource_id: ResourceId, count: i64) -> Result<(), EngineError> {
        self.validate_resource(resource_id)?;
        if count < 0 {
            return Err(EngineError::Validation("occupant count must be >= 0".into()));
        }
        let count = u32::try_from(count)
            .map_err(|_| EngineError::LimitExceeded("occupant count too large"))?;

        self.occupancy.record(resource_id, count);
        debug!("room {resource_id} occupancy updated to {count}");
        self.notify.send(
            resource_id,
            ReservationEvent::OccupancyChanged { resource_id, count },
        );

        if self.occupancy.is_occupied(count) {
            let room = self.store.room(resource_id);
            let guard = lock_room(&room);
            for reservation in &guard.reservations {
                let id = reservation.id;
                if self.releases.disarm(&id) {
                    info!("auto-release disarmed for {id}: room {resource_id} occupied ({count})");
                    metrics::counter!(crate::observability::RELEASES_DISARMED_TOTAL).increment(1);
                    self.notify.send(
                        resource_id,
                        ReservationEvent::ReleaseDisarmed { id, resource_id },
                    );
                }
            }
        }
        Ok(())
    }

    /// Abort all pending releases and refuse new bookings. Idempotent.
    pub fn shutdown(&self) {
        if self.releases.is_shut_down() {
            return;
        }
        info!("shutting down reservation manager");
        self.releases.shutdown();
    }

    /// Body of a fired release task.
    pub(super) fn auto_release(
        &self,
        id: Ulid,
        resource_id: ResourceId,
    ) -> Result<ReleaseOutcome, EngineError> {
        let room = self.store.room(resource_id);
        let mut guard = lock_room(&room);

        if !self.releases.claim(&id) {
            debug!("auto-release: {id} was disarmed before firing");
            return Ok(ReleaseOutcome::AlreadyGone);
        }
        let Some(start) = guard.reservations.iter().find(|r| r.id == id).map(|r| r.start) else {
            debug!("auto-release: reservation {id} already gone");
            return Ok(ReleaseOutcome::AlreadyGone);
        };

        let count = self.occupancy.get(resource_id);
        if self.occupancy.is_occupied(count) {
            info!("auto-release skipped for {id}: room {resource_id} occupied ({count})");
            return Ok(ReleaseOutcome::Occupied(count));
        }
        if now_ms() >= start {
            info!("auto-release skipped for {id}: reservation already started");
            return Ok(ReleaseOutcome::Started);
        }

        self.store.remove(&mut guard, id);
        info!(
            "reservation {id} auto-released: room {resource_id} unoccupied after {:?}",
            self.releases.grace_period()
        );
        metrics::counter!(crate::observability::AUTO_RELEASES_TOTAL).increment(1);
        self.notify.send(resource_id, ReservationEvent::AutoReleased { id, resource_id });
        Ok(ReleaseOutcome::Released)
    }
}
