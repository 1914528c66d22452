use chrono::{Datelike, NaiveDate};
use ulid::Ulid;

use crate::model::*;

use super::capacity::capacity_for_day;
use super::EngineError;

pub(crate) fn validate_range(range: &DateRange) -> Result<(), EngineError> {
    use crate::limits::*;
    if range.start.year() < MIN_VALID_YEAR || range.end_inclusive.year() > MAX_VALID_YEAR {
        return Err(EngineError::LimitExceeded("date out of range"));
    }
    if range.len_days() > MAX_RANGE_DAYS {
        return Err(EngineError::LimitExceeded("range too wide"));
    }
    Ok(())
}

/// True when `bed_id` can take a booking over `range`: no active booking on
/// the bed overlaps it and the bed is in service throughout.
pub fn can_book(ps: &PremisesState, bed_id: Ulid, range: &DateRange) -> bool {
    check_no_conflict(ps, bed_id, range).is_ok()
}

/// The at-most-one-active-booking-per-bed-per-date invariant, checked before
/// any bed-assigned booking is committed.
pub(crate) fn check_no_conflict(
    ps: &PremisesState,
    bed_id: Ulid,
    range: &DateRange,
) -> Result<(), EngineError> {
    for oos in &ps.out_of_service {
        if oos.bed_id == bed_id && oos.range.overlaps(range) {
            return Err(EngineError::BedOutOfService(oos.id));
        }
    }
    for booking in ps.bookings.iter().filter(|b| b.is_active()) {
        if booking.bed_id == Some(bed_id) && booking.occupied_range().overlaps(range) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::BookingConflict(booking.id));
        }
    }
    Ok(())
}

/// Days in `[from, from + horizon_weeks * 7)` where committed bookings exceed
/// available beds, merged into minimal contiguous ranges.
pub fn overbooked_ranges(ps: &PremisesState, from: NaiveDate, horizon_weeks: u32) -> Vec<DateRange> {
    let days = i64::from(horizon_weeks) * 7;
    if days == 0 {
        return Vec::new();
    }
    let Some(end) = from.checked_add_days(chrono::Days::new((days - 1) as u64)) else {
        return Vec::new();
    };

    let horizon = DateRange { start: from, end_inclusive: end };
    let mut overbooked = Vec::new();
    for day in horizon.days() {
        let cap = capacity_for_day(ps, day);
        if cap.booking_count > cap.available_bed_count {
            overbooked.push(DateRange::single_day(day));
        }
    }
    merge_ranges(&overbooked)
}
