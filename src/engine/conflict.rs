use std::time::Duration;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as Ms)
}

/// Request checks that need no room state.
pub(crate) fn validate_request(
    reservation: &Reservation,
    now: Ms,
    start_tolerance: Duration,
) -> Result<(), EngineError> {
    if reservation.duration_ms <= 0 {
        return Err(EngineError::Validation("duration must be > 0".into()));
    }
    if !reservation.owner.is_present() {
        return Err(EngineError::Validation("owner required".into()));
    }
    if reservation.owner.id.len() > MAX_OWNER_ID_LEN {
        return Err(EngineError::LimitExceeded("owner id too long"));
    }
    if reservation.owner.display_name.len() > MAX_DISPLAY_NAME_LEN {
        return Err(EngineError::LimitExceeded("display name too long"));
    }
    if reservation.duration_ms > MAX_DURATION_MS {
        return Err(EngineError::LimitExceeded("duration too long"));
    }
    if reservation.start < MIN_VALID_TIMESTAMP_MS || reservation.end() > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    let tolerance = Ms::try_from(start_tolerance.as_millis()).unwrap_or(Ms::MAX);
    let earliest = now.saturating_sub(tolerance);
    if reservation.start < earliest {
        return Err(EngineError::Validation(
            "start time must be now or in the future".into(),
        ));
    }
    Ok(())
}

/// First reservation in the room whose span intersects `span`, as a Conflict error.
pub(crate) fn check_no_conflict(room: &RoomState, span: &Span) -> Result<(), EngineError> {
    match room.overlapping(span).next() {
        Some(existing) => Err(EngineError::Conflict(existing.id)),
        None => Ok(()),
    }
}
