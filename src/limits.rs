//! Hard bounds enforced at component boundaries. Requests beyond these fail
//! with `EngineError::LimitExceeded` rather than being silently clamped.

use std::time::Duration;

/// Earliest year accepted in any date field.
pub const MIN_VALID_YEAR: i32 = 2000;

/// Latest year accepted in any date field.
pub const MAX_VALID_YEAR: i32 = 2200;

/// Widest accepted date range, in days (covers a three-year out-of-service window).
pub const MAX_RANGE_DAYS: i64 = 1100;

/// Longest stay a search may ask for, in nights.
pub const MAX_SEARCH_DURATION_DAYS: u32 = 365;

/// Widest overbooking look-ahead.
pub const MAX_HORIZON_WEEKS: u32 = 52;

/// Look-ahead used by premises summaries when the caller doesn't pick one.
pub const DEFAULT_HORIZON_WEEKS: u32 = 12;

pub const MAX_PREMISES: usize = 10_000;
pub const MAX_ROOMS_PER_PREMISES: usize = 500;
pub const MAX_BEDS_PER_PREMISES: usize = 1_000;
pub const MAX_OUT_OF_SERVICE_PER_PREMISES: usize = 5_000;
pub const MAX_BOOKINGS_PER_PREMISES: usize = 50_000;
pub const MAX_ASSIGNMENTS_PER_APPLICATION: usize = 10_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_CODE_LEN: usize = 64;
pub const MAX_REASON_LEN: usize = 1024;
pub const MAX_CRN_LEN: usize = 32;
pub const MAX_PRISON_CODE_LEN: usize = 16;

/// Bound on the per-application lock wait in `record_assignment`. Exceeding it
/// surfaces as `EngineError::AssignmentContention`.
pub const ASSIGNMENT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
