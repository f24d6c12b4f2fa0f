use crate::model::Ms;

pub const MAX_ROOMS: u32 = 10_000;
pub const MAX_OWNER_ID_LEN: usize = 256;
pub const MAX_DISPLAY_NAME_LEN: usize = 256;
pub const MAX_RESERVATIONS_PER_ROOM: usize = 10_000;

/// One week.
pub const MAX_DURATION_MS: Ms = 7 * 24 * 3_600_000;

/// 1970-01-01 .. 2100-01-01
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
