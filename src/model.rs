use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::characteristics::Characteristic;
use crate::engine::EngineError;

/// Inclusive calendar-day range `[start, end_inclusive]`.
///
/// Calendar days, not instants: a one-night stay arriving and leaving on the
/// same date is the single-day range `[d, d]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end_inclusive: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end_inclusive: NaiveDate) -> Result<Self, EngineError> {
        if start > end_inclusive {
            return Err(EngineError::InvalidRange { start, end: end_inclusive });
        }
        Ok(Self { start, end_inclusive })
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self { start: day, end_inclusive: day }
    }

    pub fn len_days(&self) -> i64 {
        (self.end_inclusive - self.start).num_days() + 1
    }

    /// Inclusive-inclusive overlap test. Symmetric.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end_inclusive && other.start <= self.end_inclusive
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end_inclusive
    }

    /// Every calendar day in the range, oldest first. Each call starts fresh.
    pub fn days(&self) -> Days {
        Days { next: Some(self.start), last: self.end_inclusive }
    }
}

/// Iterator over the calendar days of a [`DateRange`].
pub struct Days {
    next: Option<NaiveDate>,
    last: NaiveDate,
}

impl Iterator for Days {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let day = self.next?;
        self.next = if day < self.last { day.succ_opt() } else { None };
        Some(day)
    }
}

/// Coalesce overlapping or adjacent ranges into a minimal sorted set.
/// Adjacent means one range ends the day before the next starts. Idempotent.
pub fn merge_ranges(ranges: &[DateRange]) -> Vec<DateRange> {
    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(|r| (r.start, r.end_inclusive));

    let mut merged: Vec<DateRange> = Vec::new();
    for r in sorted {
        if let Some(last) = merged.last_mut() {
            let touches = match last.end_inclusive.succ_opt() {
                Some(next_day) => r.start <= next_day,
                None => true, // calendar end — nothing can start later
            };
            if touches {
                last.end_inclusive = last.end_inclusive.max(r.end_inclusive);
                continue;
            }
        }
        merged.push(r);
    }
    merged
}

/// A room within a premises. Beds belong to rooms; a room's characteristics
/// apply to every bed in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub name: String,
    pub characteristics: BTreeSet<Characteristic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bed {
    pub id: Ulid,
    pub room_id: Ulid,
    pub name: String,
    pub code: Option<String>,
    /// A bed with no end date is bookable indefinitely; one with an end date
    /// leaves the pool after that day.
    pub end_date: Option<NaiveDate>,
    pub characteristics: BTreeSet<Characteristic>,
}

impl Bed {
    /// Whether the bed's lifecycle spans the given day.
    pub fn in_service_on(&self, day: NaiveDate) -> bool {
        self.end_date.is_none_or(|end| day <= end)
    }

    /// Whether the bed's lifecycle covers every day of `range`.
    pub fn covers_range(&self, range: &DateRange) -> bool {
        self.end_date.is_none_or(|end| range.end_inclusive <= end)
    }
}

/// A bed removed from the bookable pool for a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutOfServiceBed {
    pub id: Ulid,
    pub bed_id: Ulid,
    pub range: DateRange,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Arrival {
    pub arrival_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Departure {
    pub departure_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonArrival {
    pub recorded_on: NaiveDate,
    pub reason: String,
}

/// A stay at a premises. `bed_id` is set once a concrete bed is allotted;
/// space bookings carry only the characteristics the bed must have.
///
/// Status is never stored — it is derived from the sub-records plus "today"
/// (see [`Booking::status`]), so the facts and the status cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Ulid,
    pub bed_id: Option<Ulid>,
    /// Case reference number. Opaque to this engine.
    pub crn: String,
    pub expected_arrival: NaiveDate,
    pub expected_departure: NaiveDate,
    pub essential_characteristics: BTreeSet<Characteristic>,
    pub confirmation: Option<Confirmation>,
    pub arrival: Option<Arrival>,
    pub departure: Option<Departure>,
    pub cancellation: Option<Cancellation>,
    pub non_arrival: Option<NonArrival>,
}

impl Booking {
    /// Actual arrival date if recorded, else the expected date.
    pub fn canonical_arrival(&self) -> NaiveDate {
        self.arrival.as_ref().map_or(self.expected_arrival, |a| a.arrival_date)
    }

    /// Actual departure date if recorded, else the expected date.
    pub fn canonical_departure(&self) -> NaiveDate {
        self.departure
            .as_ref()
            .map_or(self.expected_departure, |d| d.departure_date)
    }

    /// The stay as a date range, canonical arrival through canonical departure.
    pub fn occupied_range(&self) -> DateRange {
        let start = self.canonical_arrival();
        let end = self.canonical_departure().max(start);
        DateRange { start, end_inclusive: end }
    }

    /// Active bookings hold a bed; cancelled and non-arrived ones don't.
    pub fn is_active(&self) -> bool {
        self.cancellation.is_none() && self.non_arrival.is_none()
    }

    /// Derive the lifecycle status from the sub-records and `today`.
    pub fn status(&self, today: NaiveDate) -> BookingStatus {
        if self.cancellation.is_some() {
            return BookingStatus::Cancelled;
        }
        if self.non_arrival.is_some() {
            return BookingStatus::NotArrived;
        }
        if self.departure.is_some() {
            return BookingStatus::Departed;
        }
        if self.arrival.is_some() {
            return BookingStatus::Arrived;
        }
        if self.confirmation.is_some() {
            if today > self.canonical_arrival() {
                // Confirmed, arrival date gone by, nobody showed up.
                return BookingStatus::NotArrived;
            }
            return BookingStatus::Confirmed;
        }
        BookingStatus::Provisional
    }

    /// Caseworker-facing summary of where the stay sits relative to `today`.
    /// `None` for inactive bookings and stays too far out to flag.
    pub fn summary_status(&self, today: NaiveDate) -> Option<SummaryStatus> {
        if !self.is_active() {
            return None;
        }
        if self.departure.is_some() {
            return Some(SummaryStatus::Departed);
        }
        if self.arrival.is_some() {
            let departure = self.canonical_departure();
            if today > departure {
                return Some(SummaryStatus::OverdueDeparture);
            }
            if (departure - today).num_days() <= SOON_WINDOW_DAYS {
                return Some(SummaryStatus::DepartingSoon);
            }
            return Some(SummaryStatus::Arrived);
        }
        let arrival = self.canonical_arrival();
        if today > arrival {
            return Some(SummaryStatus::OverdueArrival);
        }
        if (arrival - today).num_days() <= SOON_WINDOW_DAYS {
            return Some(SummaryStatus::ArrivingSoon);
        }
        None
    }
}

/// How close "soon" is for arriving-soon / departing-soon flags.
pub const SOON_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BookingStatus {
    Provisional,
    Confirmed,
    Cancelled,
    NotArrived,
    Arrived,
    Departed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SummaryStatus {
    ArrivingSoon,
    OverdueArrival,
    Arrived,
    DepartingSoon,
    OverdueDeparture,
    Departed,
}

/// One immutable entry in an application's assignment history: where the
/// person is held and which POM (if any) holds the case. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationAssignment {
    pub id: Ulid,
    pub application_id: Ulid,
    pub prison_code: String,
    pub allocated_pom: Option<Ulid>,
    pub created_at: DateTime<Utc>,
    /// Insertion order within the application's log. Breaks `created_at` ties
    /// so "current" is deterministic.
    pub seq: u64,
}

#[derive(Debug, Clone)]
pub struct PremisesState {
    pub id: Ulid,
    pub name: String,
    pub address_line: String,
    pub postcode: String,
    pub ap_area: Option<String>,
    pub characteristics: BTreeSet<Characteristic>,
    pub rooms: Vec<Room>,
    pub beds: Vec<Bed>,
    pub out_of_service: Vec<OutOfServiceBed>,
    /// All bookings ever made at the premises, sorted by expected arrival.
    pub bookings: Vec<Booking>,
}

impl PremisesState {
    pub fn new(
        id: Ulid,
        name: String,
        address_line: String,
        postcode: String,
        ap_area: Option<String>,
        characteristics: BTreeSet<Characteristic>,
    ) -> Self {
        Self {
            id,
            name,
            address_line,
            postcode,
            ap_area,
            characteristics,
            rooms: Vec::new(),
            beds: Vec::new(),
            out_of_service: Vec::new(),
            bookings: Vec::new(),
        }
    }

    pub fn room(&self, id: Ulid) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }

    pub fn bed(&self, id: Ulid) -> Option<&Bed> {
        self.beds.iter().find(|b| b.id == id)
    }

    pub fn bed_mut(&mut self, id: Ulid) -> Option<&mut Bed> {
        self.beds.iter_mut().find(|b| b.id == id)
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Insert a booking maintaining sort order by expected arrival.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| b.expected_arrival <= booking.expected_arrival);
        self.bookings.insert(pos, booking);
    }

    /// A bed's effective characteristics: its own plus its room's.
    pub fn bed_characteristics(&self, bed: &Bed) -> BTreeSet<Characteristic> {
        let mut all = bed.characteristics.clone();
        if let Some(room) = self.room(bed.room_id) {
            all.extend(room.characteristics.iter().copied());
        }
        all
    }

    /// Active bookings whose canonical stay overlaps `range`.
    pub fn active_bookings_overlapping<'a>(
        &'a self,
        range: &'a DateRange,
    ) -> impl Iterator<Item = &'a Booking> {
        self.bookings
            .iter()
            .filter(move |b| b.is_active() && b.occupied_range().overlaps(range))
    }

    /// Whether any out-of-service record for `bed_id` overlaps `range`.
    pub fn bed_out_of_service_during(&self, bed_id: Ulid, range: &DateRange) -> bool {
        self.out_of_service
            .iter()
            .any(|o| o.bed_id == bed_id && o.range.overlaps(range))
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    PremisesCreated {
        id: Ulid,
        name: String,
        address_line: String,
        postcode: String,
        ap_area: Option<String>,
        characteristics: Vec<Characteristic>,
    },
    PremisesUpdated {
        id: Ulid,
        name: String,
        address_line: String,
        postcode: String,
        ap_area: Option<String>,
        characteristics: Vec<Characteristic>,
    },
    RoomAdded {
        id: Ulid,
        premises_id: Ulid,
        name: String,
        characteristics: Vec<Characteristic>,
    },
    BedAdded {
        id: Ulid,
        premises_id: Ulid,
        room_id: Ulid,
        name: String,
        code: Option<String>,
        end_date: Option<NaiveDate>,
        characteristics: Vec<Characteristic>,
    },
    BedRetired {
        id: Ulid,
        premises_id: Ulid,
        end_date: NaiveDate,
    },
    OutOfServiceRecorded {
        id: Ulid,
        premises_id: Ulid,
        bed_id: Ulid,
        range: DateRange,
        reason: String,
    },
    OutOfServiceCancelled {
        id: Ulid,
        premises_id: Ulid,
    },
    BookingMade {
        id: Ulid,
        premises_id: Ulid,
        bed_id: Option<Ulid>,
        crn: String,
        expected_arrival: NaiveDate,
        expected_departure: NaiveDate,
        essential_characteristics: Vec<Characteristic>,
    },
    BookingConfirmed {
        id: Ulid,
        premises_id: Ulid,
        recorded_at: DateTime<Utc>,
    },
    ArrivalRecorded {
        id: Ulid,
        premises_id: Ulid,
        arrival_date: NaiveDate,
    },
    DepartureRecorded {
        id: Ulid,
        premises_id: Ulid,
        departure_date: NaiveDate,
    },
    BookingCancelled {
        id: Ulid,
        premises_id: Ulid,
        date: NaiveDate,
        reason: String,
    },
    NonArrivalRecorded {
        id: Ulid,
        premises_id: Ulid,
        recorded_on: NaiveDate,
        reason: String,
    },
    AssignmentRecorded {
        id: Ulid,
        application_id: Ulid,
        prison_code: String,
        allocated_pom: Option<Ulid>,
        created_at: DateTime<Utc>,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacteristicAvailability {
    pub characteristic: Characteristic,
    pub available_beds_count: u32,
    pub bookings_count: u32,
}

/// Per-day capacity snapshot. Always derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityForDay {
    pub date: NaiveDate,
    pub total_bed_count: u32,
    pub available_bed_count: u32,
    pub booking_count: u32,
    pub characteristic_availability: Vec<CharacteristicAvailability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PremisesInfo {
    pub id: Ulid,
    pub name: String,
    pub address_line: String,
    pub postcode: String,
    pub ap_area: Option<String>,
    pub characteristics: Vec<Characteristic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PremisesSummary {
    pub id: Ulid,
    pub name: String,
    pub address_line: String,
    pub postcode: String,
    pub ap_area: Option<String>,
    pub bed_count: u32,
    pub available_beds: u32,
    pub out_of_service_beds: u32,
    pub overbooking_summary: Vec<DateRange>,
    pub characteristics: Vec<Characteristic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BedInfo {
    pub id: Ulid,
    pub room_id: Ulid,
    pub name: String,
    pub code: Option<String>,
    pub end_date: Option<NaiveDate>,
    pub characteristics: Vec<Characteristic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSummary {
    pub id: Ulid,
    pub bed_id: Option<Ulid>,
    pub crn: String,
    pub expected_arrival: NaiveDate,
    pub expected_departure: NaiveDate,
    pub canonical_arrival: NaiveDate,
    pub canonical_departure: NaiveDate,
    pub status: BookingStatus,
    pub summary_status: Option<SummaryStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PremisesRef {
    pub id: Ulid,
    pub name: String,
    pub postcode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BedRef {
    pub id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BedSearchResult {
    pub premises: PremisesRef,
    pub room: RoomRef,
    pub bed: BedRef,
    /// Absent when no postcode was given or the geocoder degraded.
    pub distance_miles: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BedSearchResults {
    pub results_bed_count: u32,
    pub results_room_count: u32,
    pub results_premises_count: u32,
    pub results: Vec<BedSearchResult>,
}

/// Uniform handle consumed by the cross-cutting withdrawal operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawable {
    pub id: Ulid,
    #[serde(rename = "type")]
    pub kind: WithdrawableType,
    pub dates: Vec<DateRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawableType {
    Application,
    Booking,
    PlacementApplication,
    PlacementRequest,
    SpaceBooking,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn range(a: NaiveDate, b: NaiveDate) -> DateRange {
        DateRange::new(a, b).unwrap()
    }

    #[test]
    fn range_rejects_inverted() {
        let result = DateRange::new(d(2024, 6, 2), d(2024, 6, 1));
        assert!(matches!(result, Err(EngineError::InvalidRange { .. })));
    }

    #[test]
    fn range_overlap_inclusive() {
        let a = range(d(2024, 6, 1), d(2024, 6, 10));
        let b = range(d(2024, 6, 10), d(2024, 6, 20));
        let c = range(d(2024, 6, 11), d(2024, 6, 20));
        assert!(a.overlaps(&b)); // shared boundary day counts
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn range_days_iteration() {
        let r = range(d(2024, 2, 27), d(2024, 3, 1));
        let days: Vec<NaiveDate> = r.days().collect();
        assert_eq!(
            days,
            vec![d(2024, 2, 27), d(2024, 2, 28), d(2024, 2, 29), d(2024, 3, 1)]
        );
        // Restartable: a second call walks the same days.
        assert_eq!(r.days().count(), 4);
        assert_eq!(r.len_days(), 4);
    }

    #[test]
    fn range_single_day() {
        let r = DateRange::single_day(d(2024, 6, 1));
        assert_eq!(r.len_days(), 1);
        assert_eq!(r.days().collect::<Vec<_>>(), vec![d(2024, 6, 1)]);
    }

    #[test]
    fn merge_coalesces_overlapping() {
        let ranges = vec![
            range(d(2024, 7, 5), d(2024, 7, 10)),
            range(d(2024, 7, 1), d(2024, 7, 6)),
        ];
        assert_eq!(merge_ranges(&ranges), vec![range(d(2024, 7, 1), d(2024, 7, 10))]);
    }

    #[test]
    fn merge_coalesces_adjacent() {
        let ranges = vec![
            range(d(2024, 7, 1), d(2024, 7, 3)),
            range(d(2024, 7, 4), d(2024, 7, 6)),
        ];
        assert_eq!(merge_ranges(&ranges), vec![range(d(2024, 7, 1), d(2024, 7, 6))]);
    }

    #[test]
    fn merge_keeps_gaps() {
        let ranges = vec![
            range(d(2024, 7, 1), d(2024, 7, 3)),
            range(d(2024, 7, 5), d(2024, 7, 6)),
        ];
        assert_eq!(merge_ranges(&ranges), ranges);
    }

    #[test]
    fn merge_is_idempotent() {
        let ranges = vec![
            range(d(2024, 7, 8), d(2024, 7, 9)),
            range(d(2024, 7, 1), d(2024, 7, 3)),
            range(d(2024, 7, 2), d(2024, 7, 5)),
            range(d(2024, 7, 6), d(2024, 7, 7)),
        ];
        let once = merge_ranges(&ranges);
        let twice = merge_ranges(&once);
        assert_eq!(once, twice);
        assert_eq!(once, vec![range(d(2024, 7, 1), d(2024, 7, 9))]);
    }

    #[test]
    fn merge_empty() {
        assert!(merge_ranges(&[]).is_empty());
    }

    fn bare_booking() -> Booking {
        Booking {
            id: Ulid::new(),
            bed_id: None,
            crn: "X320741".into(),
            expected_arrival: d(2024, 6, 1),
            expected_departure: d(2024, 6, 14),
            essential_characteristics: BTreeSet::new(),
            confirmation: None,
            arrival: None,
            departure: None,
            cancellation: None,
            non_arrival: None,
        }
    }

    #[test]
    fn canonical_dates_prefer_actuals() {
        let mut b = bare_booking();
        assert_eq!(b.canonical_arrival(), d(2024, 6, 1));
        assert_eq!(b.canonical_departure(), d(2024, 6, 14));

        b.arrival = Some(Arrival { arrival_date: d(2024, 6, 2) });
        b.departure = Some(Departure { departure_date: d(2024, 6, 12) });
        assert_eq!(b.canonical_arrival(), d(2024, 6, 2));
        assert_eq!(b.canonical_departure(), d(2024, 6, 12));
        assert_eq!(b.occupied_range(), range(d(2024, 6, 2), d(2024, 6, 12)));
    }

    #[test]
    fn status_derivation_walks_the_lifecycle() {
        let today = d(2024, 5, 20);
        let mut b = bare_booking();
        assert_eq!(b.status(today), BookingStatus::Provisional);

        b.confirmation = Some(Confirmation { recorded_at: Utc::now() });
        assert_eq!(b.status(today), BookingStatus::Confirmed);

        b.arrival = Some(Arrival { arrival_date: d(2024, 6, 1) });
        assert_eq!(b.status(d(2024, 6, 5)), BookingStatus::Arrived);

        b.departure = Some(Departure { departure_date: d(2024, 6, 14) });
        assert_eq!(b.status(d(2024, 6, 15)), BookingStatus::Departed);
    }

    #[test]
    fn status_confirmed_becomes_not_arrived_after_arrival_date() {
        let mut b = bare_booking();
        b.confirmation = Some(Confirmation { recorded_at: Utc::now() });
        assert_eq!(b.status(d(2024, 6, 1)), BookingStatus::Confirmed);
        assert_eq!(b.status(d(2024, 6, 2)), BookingStatus::NotArrived);
    }

    #[test]
    fn status_cancellation_wins() {
        let mut b = bare_booking();
        b.confirmation = Some(Confirmation { recorded_at: Utc::now() });
        b.cancellation = Some(Cancellation { date: d(2024, 5, 25), reason: "withdrawn".into() });
        assert_eq!(b.status(d(2024, 5, 26)), BookingStatus::Cancelled);
        assert!(!b.is_active());
    }

    #[test]
    fn summary_status_windows() {
        let mut b = bare_booking();
        assert_eq!(b.summary_status(d(2024, 5, 1)), None); // too far out
        assert_eq!(b.summary_status(d(2024, 5, 28)), Some(SummaryStatus::ArrivingSoon));
        assert_eq!(b.summary_status(d(2024, 6, 2)), Some(SummaryStatus::OverdueArrival));

        b.arrival = Some(Arrival { arrival_date: d(2024, 6, 1) });
        assert_eq!(b.summary_status(d(2024, 6, 3)), Some(SummaryStatus::Arrived));
        assert_eq!(b.summary_status(d(2024, 6, 10)), Some(SummaryStatus::DepartingSoon));
        assert_eq!(b.summary_status(d(2024, 6, 15)), Some(SummaryStatus::OverdueDeparture));

        b.departure = Some(Departure { departure_date: d(2024, 6, 14) });
        assert_eq!(b.summary_status(d(2024, 6, 15)), Some(SummaryStatus::Departed));
    }

    #[test]
    fn booking_insert_keeps_arrival_order() {
        let mut ps = PremisesState::new(
            Ulid::new(),
            "Oak House".into(),
            "12 The Avenue".into(),
            "SW1A 1AA".into(),
            None,
            BTreeSet::new(),
        );
        let mut late = bare_booking();
        late.expected_arrival = d(2024, 8, 1);
        let mut early = bare_booking();
        early.expected_arrival = d(2024, 6, 1);
        ps.insert_booking(late);
        ps.insert_booking(early);
        assert_eq!(ps.bookings[0].expected_arrival, d(2024, 6, 1));
        assert_eq!(ps.bookings[1].expected_arrival, d(2024, 8, 1));
    }

    #[test]
    fn bed_characteristics_include_room() {
        let mut ps = PremisesState::new(
            Ulid::new(),
            "Oak House".into(),
            "12 The Avenue".into(),
            "SW1A 1AA".into(),
            None,
            BTreeSet::new(),
        );
        let room_id = Ulid::new();
        ps.rooms.push(Room {
            id: room_id,
            name: "1".into(),
            characteristics: [Characteristic::EnSuite].into(),
        });
        let bed = Bed {
            id: Ulid::new(),
            room_id,
            name: "1-1".into(),
            code: None,
            end_date: None,
            characteristics: [Characteristic::Single].into(),
        };
        let all = ps.bed_characteristics(&bed);
        assert!(all.contains(&Characteristic::EnSuite));
        assert!(all.contains(&Characteristic::Single));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingMade {
            id: Ulid::new(),
            premises_id: Ulid::new(),
            bed_id: Some(Ulid::new()),
            crn: "X320741".into(),
            expected_arrival: d(2024, 6, 1),
            expected_departure: d(2024, 6, 14),
            essential_characteristics: vec![Characteristic::WheelchairDesignated],
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn capacity_row_serializes_with_wire_field_names() {
        let row = CapacityForDay {
            date: d(2024, 6, 1),
            total_bed_count: 5,
            available_bed_count: 4,
            booking_count: 2,
            characteristic_availability: vec![CharacteristicAvailability {
                characteristic: Characteristic::EnSuite,
                available_beds_count: 1,
                bookings_count: 0,
            }],
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["totalBedCount"], 5);
        assert_eq!(json["availableBedCount"], 4);
        assert_eq!(json["bookingCount"], 2);
        assert_eq!(
            json["characteristicAvailability"][0]["characteristic"],
            "hasEnSuite"
        );
    }

    #[test]
    fn withdrawable_serializes_with_discriminator() {
        let w = Withdrawable {
            id: Ulid::new(),
            kind: WithdrawableType::SpaceBooking,
            dates: vec![DateRange::single_day(d(2024, 6, 1))],
        };
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["type"], "space_booking");
    }
}
