use serde::Serialize;
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

/// Rooms are numbered `1..=total_resources`.
pub type ResourceId = u32;

pub const MINUTE_MS: Ms = 60_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Who holds a reservation. `id` is an opaque token (e-mail, username),
/// `display_name` is only shown back to people.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Owner {
    pub id: String,
    pub display_name: String,
}

impl Owner {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        let id = id.into().trim().to_string();
        let display_name = display_name.into().trim().to_string();
        let display_name = if display_name.is_empty() { id.clone() } else { display_name };
        Self { id, display_name }
    }

    /// An owner with a blank id counts as no owner at all.
    pub fn is_present(&self) -> bool {
        !self.id.trim().is_empty()
    }
}

/// A time-bounded claim on one room by one owner. Never mutated once booked;
/// cancellation and auto-release remove it instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    pub id: Ulid,
    pub resource_id: ResourceId,
    pub owner: Owner,
    pub start: Ms,
    pub duration_ms: Ms,
}

impl Reservation {
    pub fn new(resource_id: ResourceId, owner: Owner, start: Ms, duration_ms: Ms) -> Self {
        Self {
            id: Ulid::new(),
            resource_id,
            owner,
            start,
            duration_ms,
        }
    }

    pub fn end(&self) -> Ms {
        self.start.saturating_add(self.duration_ms)
    }

    pub fn span(&self) -> Span {
        // Built directly: unvalidated requests may carry a non-positive duration.
        Span {
            start: self.start,
            end: self.end(),
        }
    }

    pub fn overlaps(&self, other: &Reservation) -> bool {
        self.resource_id == other.resource_id && self.span().overlaps(&other.span())
    }
}

/// Live bookings of one room, sorted by `start`.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: ResourceId,
    pub reservations: Vec<Reservation>,
}

impl RoomState {
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.start <= reservation.start);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    /// Reservations whose span overlaps the query window.
    /// Everything starting at or after `query.end` is skipped via binary search.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self.reservations.partition_point(|r| r.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.end() > query.start)
    }
}

/// Best-effort notifications published per room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationEvent {
    Booked {
        id: Ulid,
        resource_id: ResourceId,
        span: Span,
        owner: String,
    },
    Cancelled {
        id: Ulid,
        resource_id: ResourceId,
    },
    AutoReleased {
        id: Ulid,
        resource_id: ResourceId,
    },
    /// Auto-release was switched off because the room became occupied.
    ReleaseDisarmed {
        id: Ulid,
        resource_id: ResourceId,
    },
    OccupancyChanged {
        resource_id: ResourceId,
        count: u32,
    },
}
