use std::collections::HashSet;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::characteristics::Characteristic;
use crate::model::*;

// ── Capacity Ledger ──────────────────────────────────────────────

/// Compute the capacity snapshot for one day, from bed, booking and
/// out-of-service state. Derived on every call; nothing here is cached,
/// because stale capacity misplaces people.
pub fn capacity_for_day(ps: &PremisesState, day: NaiveDate) -> CapacityForDay {
    // Beds whose lifecycle spans the day.
    let live: Vec<&Bed> = ps.beds.iter().filter(|b| b.in_service_on(day)).collect();
    let total_bed_count = live.len() as u32;

    // Distinct beds with an out-of-service record covering the day. A bed with
    // two overlapping records is still one unavailable bed.
    let out_of_service: HashSet<Ulid> = ps
        .out_of_service
        .iter()
        .filter(|o| o.range.contains(day))
        .map(|o| o.bed_id)
        .collect();

    let available: Vec<&&Bed> = live.iter().filter(|b| !out_of_service.contains(&b.id)).collect();
    let available_bed_count = available.len() as u32;

    // A booked bed that later went out of service stays in the total and out
    // of the available count — retroactive out-of-service entry makes this a
    // legitimate data condition, not an error.
    let day_range = DateRange::single_day(day);
    let active: Vec<&Booking> = ps.active_bookings_overlapping(&day_range).collect();
    let booking_count = active.len() as u32;

    let characteristic_availability = Characteristic::TRACKED_FOR_AVAILABILITY
        .iter()
        .map(|&characteristic| CharacteristicAvailability {
            characteristic,
            available_beds_count: available
                .iter()
                .filter(|b| ps.bed_characteristics(b).contains(&characteristic))
                .count() as u32,
            bookings_count: active
                .iter()
                .filter(|bk| bk.essential_characteristics.contains(&characteristic))
                .count() as u32,
        })
        .collect();

    CapacityForDay {
        date: day,
        total_bed_count,
        available_bed_count,
        booking_count,
        characteristic_availability,
    }
}

/// Capacity for every day of `range`, oldest first.
pub fn capacity_for_range(ps: &PremisesState, range: &DateRange) -> Vec<CapacityForDay> {
    range.days().map(|day| capacity_for_day(ps, day)).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn premises_with_beds(count: usize) -> PremisesState {
        let mut ps = PremisesState::new(
            Ulid::new(),
            "Oak House".into(),
            "12 The Avenue".into(),
            "SW1A 1AA".into(),
            None,
            BTreeSet::new(),
        );
        let room_id = Ulid::new();
        ps.rooms.push(Room { id: room_id, name: "1".into(), characteristics: BTreeSet::new() });
        for i in 0..count {
            ps.beds.push(Bed {
                id: Ulid::new(),
                room_id,
                name: format!("1-{i}"),
                code: None,
                end_date: None,
                characteristics: BTreeSet::new(),
            });
        }
        ps
    }

    fn booking_over(bed_id: Option<Ulid>, start: NaiveDate, end: NaiveDate) -> Booking {
        Booking {
            id: Ulid::new(),
            bed_id,
            crn: "X1".into(),
            expected_arrival: start,
            expected_departure: end,
            essential_characteristics: BTreeSet::new(),
            confirmation: None,
            arrival: None,
            departure: None,
            cancellation: None,
            non_arrival: None,
        }
    }

    #[test]
    fn empty_premises_gives_all_zero_rows() {
        let ps = PremisesState::new(
            Ulid::new(),
            "Empty".into(),
            "1 Side Road".into(),
            "E1 1AA".into(),
            None,
            BTreeSet::new(),
        );
        let cap = capacity_for_day(&ps, d(2024, 6, 1));
        assert_eq!(cap.total_bed_count, 0);
        assert_eq!(cap.available_bed_count, 0);
        assert_eq!(cap.booking_count, 0);
        for ca in &cap.characteristic_availability {
            assert_eq!(ca.available_beds_count, 0);
            assert_eq!(ca.bookings_count, 0);
        }
    }

    #[test]
    fn five_beds_no_bookings() {
        let ps = premises_with_beds(5);
        let cap = capacity_for_day(&ps, d(2024, 6, 1));
        assert_eq!(cap.total_bed_count, 5);
        assert_eq!(cap.available_bed_count, 5);
        assert_eq!(cap.booking_count, 0);
    }

    #[test]
    fn out_of_service_bed_reduces_available_not_total() {
        let mut ps = premises_with_beds(5);
        ps.out_of_service.push(OutOfServiceBed {
            id: Ulid::new(),
            bed_id: ps.beds[0].id,
            range: DateRange::new(d(2024, 6, 1), d(2024, 6, 7)).unwrap(),
            reason: "flood damage".into(),
        });
        let cap = capacity_for_day(&ps, d(2024, 6, 1));
        assert_eq!(cap.total_bed_count, 5);
        assert_eq!(cap.available_bed_count, 4);

        // Outside the window the bed is back.
        let cap = capacity_for_day(&ps, d(2024, 6, 8));
        assert_eq!(cap.available_bed_count, 5);
    }

    #[test]
    fn duplicate_out_of_service_records_count_once() {
        let mut ps = premises_with_beds(3);
        for _ in 0..2 {
            ps.out_of_service.push(OutOfServiceBed {
                id: Ulid::new(),
                bed_id: ps.beds[0].id,
                range: DateRange::new(d(2024, 6, 1), d(2024, 6, 7)).unwrap(),
                reason: "repair".into(),
            });
        }
        let cap = capacity_for_day(&ps, d(2024, 6, 3));
        assert_eq!(cap.available_bed_count, 2);
    }

    #[test]
    fn ended_bed_leaves_the_total() {
        let mut ps = premises_with_beds(2);
        ps.beds[0].end_date = Some(d(2024, 6, 15));
        assert_eq!(capacity_for_day(&ps, d(2024, 6, 15)).total_bed_count, 2);
        assert_eq!(capacity_for_day(&ps, d(2024, 6, 16)).total_bed_count, 1);
    }

    #[test]
    fn booking_counts_use_canonical_dates() {
        let mut ps = premises_with_beds(2);
        let mut b = booking_over(None, d(2024, 6, 1), d(2024, 6, 10));
        b.arrival = Some(Arrival { arrival_date: d(2024, 6, 3) });
        ps.insert_booking(b);

        assert_eq!(capacity_for_day(&ps, d(2024, 6, 2)).booking_count, 0);
        assert_eq!(capacity_for_day(&ps, d(2024, 6, 3)).booking_count, 1);
        assert_eq!(capacity_for_day(&ps, d(2024, 6, 10)).booking_count, 1);
    }

    #[test]
    fn cancelled_booking_not_counted() {
        let mut ps = premises_with_beds(2);
        let mut b = booking_over(None, d(2024, 6, 1), d(2024, 6, 10));
        b.cancellation = Some(Cancellation { date: d(2024, 5, 20), reason: "withdrawn".into() });
        ps.insert_booking(b);
        assert_eq!(capacity_for_day(&ps, d(2024, 6, 5)).booking_count, 0);
    }

    #[test]
    fn booked_and_out_of_service_bed_still_in_total() {
        let mut ps = premises_with_beds(3);
        let bed_id = ps.beds[0].id;
        ps.insert_booking(booking_over(Some(bed_id), d(2024, 6, 1), d(2024, 6, 10)));
        // Retroactive out-of-service entry over the same bed and days.
        ps.out_of_service.push(OutOfServiceBed {
            id: Ulid::new(),
            bed_id,
            range: DateRange::new(d(2024, 6, 1), d(2024, 6, 10)).unwrap(),
            reason: "late report".into(),
        });
        let cap = capacity_for_day(&ps, d(2024, 6, 5));
        assert_eq!(cap.total_bed_count, 3);
        assert_eq!(cap.available_bed_count, 2);
        assert_eq!(cap.booking_count, 1);
    }

    #[test]
    fn characteristic_breakdown_tracks_the_six() {
        let mut ps = premises_with_beds(3);
        ps.beds[0].characteristics.insert(Characteristic::WheelchairDesignated);
        ps.beds[1].characteristics.insert(Characteristic::EnSuite);

        let mut b = booking_over(None, d(2024, 6, 1), d(2024, 6, 10));
        b.essential_characteristics.insert(Characteristic::WheelchairDesignated);
        ps.insert_booking(b);

        let cap = capacity_for_day(&ps, d(2024, 6, 5));
        assert_eq!(cap.characteristic_availability.len(), 6);
        for ca in &cap.characteristic_availability {
            assert!(ca.characteristic.is_tracked_for_availability());
            assert!(ca.available_beds_count <= cap.available_bed_count);
        }
        let wheelchair = cap
            .characteristic_availability
            .iter()
            .find(|ca| ca.characteristic == Characteristic::WheelchairDesignated)
            .unwrap();
        assert_eq!(wheelchair.available_beds_count, 1);
        assert_eq!(wheelchair.bookings_count, 1);
    }

    #[test]
    fn range_rows_ascend_chronologically() {
        let ps = premises_with_beds(1);
        let range = DateRange::new(d(2024, 6, 1), d(2024, 6, 5)).unwrap();
        let rows = capacity_for_range(&ps, &range);
        assert_eq!(rows.len(), 5);
        for pair in rows.windows(2) {
            assert!(pair[0].date < pair[1].date);
        }
    }

    #[test]
    fn capacity_bound_holds_under_churn() {
        let mut ps = premises_with_beds(4);
        ps.beds[3].end_date = Some(d(2024, 6, 2));
        ps.out_of_service.push(OutOfServiceBed {
            id: Ulid::new(),
            bed_id: ps.beds[1].id,
            range: DateRange::new(d(2024, 6, 1), d(2024, 6, 30)).unwrap(),
            reason: "repair".into(),
        });
        for day in DateRange::new(d(2024, 5, 28), d(2024, 6, 8)).unwrap().days() {
            let cap = capacity_for_day(&ps, day);
            assert!(cap.available_bed_count <= cap.total_bed_count);
        }
    }
}
