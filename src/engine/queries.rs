use std::collections::HashSet;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::capacity::capacity_for_range;
use super::conflict::{overbooked_ranges, validate_range};
use super::{Engine, EngineError};

impl Engine {
    /// Per-day capacity rows for a premises over `range`, oldest first.
    /// Recomputed from current state on every call.
    pub async fn premises_capacity(
        &self,
        premises_id: Ulid,
        range: &DateRange,
    ) -> Result<Vec<CapacityForDay>, EngineError> {
        validate_range(range)?;
        let ps = self
            .get_premises(&premises_id)
            .ok_or(EngineError::UnknownPremises(premises_id))?;
        let guard = ps.read().await;
        Ok(capacity_for_range(&guard, range))
    }

    /// Snapshot counts as of `today` plus the overbooking look-ahead.
    pub async fn premises_summary(
        &self,
        premises_id: Ulid,
        today: NaiveDate,
    ) -> Result<PremisesSummary, EngineError> {
        let ps = self
            .get_premises(&premises_id)
            .ok_or(EngineError::UnknownPremises(premises_id))?;
        let guard = ps.read().await;

        let live: Vec<&Bed> = guard.beds.iter().filter(|b| b.in_service_on(today)).collect();
        let out_today: HashSet<Ulid> = guard
            .out_of_service
            .iter()
            .filter(|o| o.range.contains(today))
            .map(|o| o.bed_id)
            .collect();
        let bed_count = live.len() as u32;
        let out_of_service_beds = live.iter().filter(|b| out_today.contains(&b.id)).count() as u32;

        Ok(PremisesSummary {
            id: guard.id,
            name: guard.name.clone(),
            address_line: guard.address_line.clone(),
            postcode: guard.postcode.clone(),
            ap_area: guard.ap_area.clone(),
            bed_count,
            available_beds: bed_count - out_of_service_beds,
            out_of_service_beds,
            overbooking_summary: overbooked_ranges(&guard, today, DEFAULT_HORIZON_WEEKS),
            characteristics: guard.characteristics.iter().copied().collect(),
        })
    }

    /// Overbooked day ranges over a caller-chosen horizon.
    pub async fn overbooking_summary(
        &self,
        premises_id: Ulid,
        from: NaiveDate,
        horizon_weeks: u32,
    ) -> Result<Vec<DateRange>, EngineError> {
        if horizon_weeks > MAX_HORIZON_WEEKS {
            return Err(EngineError::LimitExceeded("horizon too wide"));
        }
        let ps = self
            .get_premises(&premises_id)
            .ok_or(EngineError::UnknownPremises(premises_id))?;
        let guard = ps.read().await;
        Ok(overbooked_ranges(&guard, from, horizon_weeks))
    }

    /// Whether `bed_id` can take a booking over `range`.
    pub async fn can_book(&self, bed_id: Ulid, range: &DateRange) -> Result<bool, EngineError> {
        validate_range(range)?;
        let premises_id = self
            .premises_for_entity(&bed_id)
            .ok_or(EngineError::UnknownBed(bed_id))?;
        let ps = self
            .get_premises(&premises_id)
            .ok_or(EngineError::UnknownPremises(premises_id))?;
        let guard = ps.read().await;
        if guard.bed(bed_id).is_none() {
            return Err(EngineError::UnknownBed(bed_id));
        }
        Ok(super::conflict::can_book(&guard, bed_id, range))
    }

    pub async fn list_premises(&self) -> Vec<PremisesInfo> {
        let mut out = Vec::new();
        for ps_arc in self.premises_snapshot() {
            let guard = ps_arc.read().await;
            out.push(PremisesInfo {
                id: guard.id,
                name: guard.name.clone(),
                address_line: guard.address_line.clone(),
                postcode: guard.postcode.clone(),
                ap_area: guard.ap_area.clone(),
                characteristics: guard.characteristics.iter().copied().collect(),
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub async fn list_beds(&self, premises_id: Ulid) -> Result<Vec<BedInfo>, EngineError> {
        let ps = self
            .get_premises(&premises_id)
            .ok_or(EngineError::UnknownPremises(premises_id))?;
        let guard = ps.read().await;
        Ok(guard
            .beds
            .iter()
            .map(|b| BedInfo {
                id: b.id,
                room_id: b.room_id,
                name: b.name.clone(),
                code: b.code.clone(),
                end_date: b.end_date,
                characteristics: b.characteristics.iter().copied().collect(),
            })
            .collect())
    }

    /// Out-of-service records for a premises, optionally only those touching
    /// `range`.
    pub async fn list_out_of_service(
        &self,
        premises_id: Ulid,
        range: Option<&DateRange>,
    ) -> Result<Vec<OutOfServiceBed>, EngineError> {
        let ps = self
            .get_premises(&premises_id)
            .ok_or(EngineError::UnknownPremises(premises_id))?;
        let guard = ps.read().await;
        Ok(guard
            .out_of_service
            .iter()
            .filter(|o| range.is_none_or(|r| o.range.overlaps(r)))
            .cloned()
            .collect())
    }

    /// Active bookings (not cancelled, not non-arrived) whose canonical stay
    /// overlaps `range`, for a premises or narrowed to one bed.
    pub async fn list_active_bookings(
        &self,
        premises_id: Ulid,
        bed_id: Option<Ulid>,
        range: &DateRange,
        today: NaiveDate,
    ) -> Result<Vec<BookingSummary>, EngineError> {
        validate_range(range)?;
        let ps = self
            .get_premises(&premises_id)
            .ok_or(EngineError::UnknownPremises(premises_id))?;
        let guard = ps.read().await;
        Ok(guard
            .active_bookings_overlapping(range)
            .filter(|b| bed_id.is_none() || b.bed_id == bed_id)
            .map(|b| booking_summary(b, today))
            .collect())
    }

    /// Bookings at a premises with their derived statuses as of `today`,
    /// ordered by expected arrival.
    pub async fn list_bookings(
        &self,
        premises_id: Ulid,
        today: NaiveDate,
    ) -> Result<Vec<BookingSummary>, EngineError> {
        let ps = self
            .get_premises(&premises_id)
            .ok_or(EngineError::UnknownPremises(premises_id))?;
        let guard = ps.read().await;
        Ok(guard.bookings.iter().map(|b| booking_summary(b, today)).collect())
    }

    pub async fn get_booking(
        &self,
        booking_id: Ulid,
        today: NaiveDate,
    ) -> Result<BookingSummary, EngineError> {
        let premises_id = self
            .premises_for_entity(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let ps = self
            .get_premises(&premises_id)
            .ok_or(EngineError::UnknownPremises(premises_id))?;
        let guard = ps.read().await;
        let booking = guard.booking(booking_id).ok_or(EngineError::NotFound(booking_id))?;
        Ok(booking_summary(booking, today))
    }

    /// Uniform withdrawal handle for a booking, for the cross-cutting
    /// withdrawal operation.
    pub async fn booking_withdrawable(&self, booking_id: Ulid) -> Result<Withdrawable, EngineError> {
        let premises_id = self
            .premises_for_entity(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let ps = self
            .get_premises(&premises_id)
            .ok_or(EngineError::UnknownPremises(premises_id))?;
        let guard = ps.read().await;
        let booking = guard.booking(booking_id).ok_or(EngineError::NotFound(booking_id))?;
        let kind = if booking.bed_id.is_some() {
            WithdrawableType::Booking
        } else {
            WithdrawableType::SpaceBooking
        };
        Ok(Withdrawable { id: booking.id, kind, dates: vec![booking.occupied_range()] })
    }
}

fn booking_summary(b: &Booking, today: NaiveDate) -> BookingSummary {
    BookingSummary {
        id: b.id,
        bed_id: b.bed_id,
        crn: b.crn.clone(),
        expected_arrival: b.expected_arrival,
        expected_departure: b.expected_departure,
        canonical_arrival: b.canonical_arrival(),
        canonical_departure: b.canonical_departure(),
        status: b.status(today),
        summary_status: b.summary_status(today),
    }
}
