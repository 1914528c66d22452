use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::characteristics::Characteristic;
use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, validate_range};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub async fn create_premises(
        &self,
        id: Ulid,
        name: &str,
        address_line: &str,
        postcode: &str,
        ap_area: Option<String>,
        characteristics: BTreeSet<Characteristic>,
    ) -> Result<(), EngineError> {
        if self.state.len() >= MAX_PREMISES {
            return Err(EngineError::LimitExceeded("too many premises"));
        }
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("premises name length"));
        }
        if address_line.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("address length"));
        }
        if characteristics.iter().any(|c| !c.applies_to_premises()) {
            return Err(EngineError::LimitExceeded("characteristic not premises-scoped"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::PremisesCreated {
            id,
            name: name.to_string(),
            address_line: address_line.to_string(),
            postcode: postcode.to_string(),
            ap_area: ap_area.clone(),
            characteristics: characteristics.iter().copied().collect(),
        };
        self.wal_append(&event).await?;
        let ps = PremisesState::new(
            id,
            name.to_string(),
            address_line.to_string(),
            postcode.to_string(),
            ap_area,
            characteristics,
        );
        self.state.insert(id, Arc::new(RwLock::new(ps)));
        self.notify.send(id, &event);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_premises(
        &self,
        id: Ulid,
        name: &str,
        address_line: &str,
        postcode: &str,
        ap_area: Option<String>,
        characteristics: BTreeSet<Characteristic>,
    ) -> Result<(), EngineError> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("premises name length"));
        }
        if address_line.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("address length"));
        }
        if characteristics.iter().any(|c| !c.applies_to_premises()) {
            return Err(EngineError::LimitExceeded("characteristic not premises-scoped"));
        }
        let ps = self.get_premises(&id).ok_or(EngineError::UnknownPremises(id))?;
        let mut guard = ps.write().await;

        let event = Event::PremisesUpdated {
            id,
            name: name.to_string(),
            address_line: address_line.to_string(),
            postcode: postcode.to_string(),
            ap_area,
            characteristics: characteristics.iter().copied().collect(),
        };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    pub async fn add_room(
        &self,
        id: Ulid,
        premises_id: Ulid,
        name: &str,
        characteristics: BTreeSet<Characteristic>,
    ) -> Result<(), EngineError> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("room name length"));
        }
        if characteristics.iter().any(|c| !c.applies_to_rooms()) {
            return Err(EngineError::LimitExceeded("characteristic not room-scoped"));
        }
        let ps = self
            .get_premises(&premises_id)
            .ok_or(EngineError::UnknownPremises(premises_id))?;
        let mut guard = ps.write().await;
        if guard.rooms.len() >= MAX_ROOMS_PER_PREMISES {
            return Err(EngineError::LimitExceeded("too many rooms on premises"));
        }
        if guard.room(id).is_some() {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::RoomAdded {
            id,
            premises_id,
            name: name.to_string(),
            characteristics: characteristics.iter().copied().collect(),
        };
        self.persist_and_apply(premises_id, &mut guard, &event).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn add_bed(
        &self,
        id: Ulid,
        premises_id: Ulid,
        room_id: Ulid,
        name: &str,
        code: Option<String>,
        end_date: Option<NaiveDate>,
        characteristics: BTreeSet<Characteristic>,
    ) -> Result<(), EngineError> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("bed name length"));
        }
        if let Some(ref c) = code
            && c.len() > MAX_CODE_LEN
        {
            return Err(EngineError::LimitExceeded("bed code length"));
        }
        if characteristics.iter().any(|c| !c.applies_to_rooms()) {
            return Err(EngineError::LimitExceeded("characteristic not room-scoped"));
        }
        let ps = self
            .get_premises(&premises_id)
            .ok_or(EngineError::UnknownPremises(premises_id))?;
        let mut guard = ps.write().await;
        if guard.beds.len() >= MAX_BEDS_PER_PREMISES {
            return Err(EngineError::LimitExceeded("too many beds on premises"));
        }
        if guard.room(room_id).is_none() {
            return Err(EngineError::NotFound(room_id));
        }
        if guard.bed(id).is_some() {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::BedAdded {
            id,
            premises_id,
            room_id,
            name: name.to_string(),
            code,
            end_date,
            characteristics: characteristics.iter().copied().collect(),
        };
        self.persist_and_apply(premises_id, &mut guard, &event).await
    }

    /// End a bed's lifecycle: it stays in the inventory (and in historical
    /// capacity) but leaves the pool after `end_date`.
    pub async fn retire_bed(&self, bed_id: Ulid, end_date: NaiveDate) -> Result<Ulid, EngineError> {
        let (premises_id, mut guard) = self.resolve_entity_write(&bed_id).await?;
        if guard.bed(bed_id).is_none() {
            return Err(EngineError::UnknownBed(bed_id));
        }
        let event = Event::BedRetired { id: bed_id, premises_id, end_date };
        self.persist_and_apply(premises_id, &mut guard, &event).await?;
        Ok(premises_id)
    }

    /// Remove a bed from the bookable pool for a date range. Retroactive
    /// entries overlapping existing bookings are accepted; the capacity ledger
    /// tolerates the resulting booked-but-unavailable days.
    pub async fn record_out_of_service(
        &self,
        id: Ulid,
        bed_id: Ulid,
        range: DateRange,
        reason: &str,
    ) -> Result<(), EngineError> {
        validate_range(&range)?;
        if reason.len() > MAX_REASON_LEN {
            return Err(EngineError::LimitExceeded("reason length"));
        }
        let premises_id = self
            .premises_for_entity(&bed_id)
            .ok_or(EngineError::UnknownBed(bed_id))?;
        let ps = self
            .get_premises(&premises_id)
            .ok_or(EngineError::UnknownPremises(premises_id))?;
        let mut guard = ps.write().await;
        if guard.bed(bed_id).is_none() {
            return Err(EngineError::UnknownBed(bed_id));
        }
        if guard.out_of_service.len() >= MAX_OUT_OF_SERVICE_PER_PREMISES {
            return Err(EngineError::LimitExceeded("too many out-of-service records"));
        }

        let event = Event::OutOfServiceRecorded {
            id,
            premises_id,
            bed_id,
            range,
            reason: reason.to_string(),
        };
        self.persist_and_apply(premises_id, &mut guard, &event).await
    }

    pub async fn cancel_out_of_service(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (premises_id, mut guard) = self.resolve_entity_write(&id).await?;
        let event = Event::OutOfServiceCancelled { id, premises_id };
        self.persist_and_apply(premises_id, &mut guard, &event).await?;
        Ok(premises_id)
    }

    /// Make a booking. With a concrete bed the conflict guard runs first; a
    /// premises-level space booking carries only its essential characteristics
    /// and is checked against capacity by the overbooking summary instead.
    #[allow(clippy::too_many_arguments)]
    pub async fn make_booking(
        &self,
        id: Ulid,
        premises_id: Ulid,
        bed_id: Option<Ulid>,
        crn: &str,
        expected_arrival: NaiveDate,
        expected_departure: NaiveDate,
        essential_characteristics: BTreeSet<Characteristic>,
    ) -> Result<(), EngineError> {
        if crn.is_empty() || crn.len() > MAX_CRN_LEN {
            return Err(EngineError::LimitExceeded("crn length"));
        }
        let stay = DateRange::new(expected_arrival, expected_departure)?;
        validate_range(&stay)?;

        let ps = self
            .get_premises(&premises_id)
            .ok_or(EngineError::UnknownPremises(premises_id))?;
        let mut guard = ps.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_PREMISES {
            return Err(EngineError::LimitExceeded("too many bookings on premises"));
        }
        if guard.booking(id).is_some() {
            return Err(EngineError::AlreadyExists(id));
        }
        if let Some(bed_id) = bed_id {
            if guard.bed(bed_id).is_none() {
                return Err(EngineError::UnknownBed(bed_id));
            }
            check_no_conflict(&guard, bed_id, &stay)?;
        }

        let event = Event::BookingMade {
            id,
            premises_id,
            bed_id,
            crn: crn.to_string(),
            expected_arrival,
            expected_departure,
            essential_characteristics: essential_characteristics.iter().copied().collect(),
        };
        self.persist_and_apply(premises_id, &mut guard, &event).await
    }

    pub async fn confirm_booking(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (premises_id, mut guard) = self.resolve_entity_write(&id).await?;
        let booking = guard.booking(id).ok_or(EngineError::NotFound(id))?;
        if !booking.is_active() {
            return Err(EngineError::InvalidTransition { booking: id, reason: "not active" });
        }
        if booking.arrival.is_some() {
            return Err(EngineError::InvalidTransition { booking: id, reason: "already arrived" });
        }

        let event = Event::BookingConfirmed { id, premises_id, recorded_at: Utc::now() };
        self.persist_and_apply(premises_id, &mut guard, &event).await?;
        Ok(premises_id)
    }

    pub async fn record_arrival(
        &self,
        id: Ulid,
        arrival_date: NaiveDate,
    ) -> Result<Ulid, EngineError> {
        let (premises_id, mut guard) = self.resolve_entity_write(&id).await?;
        let booking = guard.booking(id).ok_or(EngineError::NotFound(id))?;
        if !booking.is_active() {
            return Err(EngineError::InvalidTransition { booking: id, reason: "not active" });
        }
        if booking.arrival.is_some() {
            return Err(EngineError::InvalidTransition { booking: id, reason: "already arrived" });
        }
        if arrival_date > booking.expected_departure {
            return Err(EngineError::InvalidRange {
                start: arrival_date,
                end: booking.expected_departure,
            });
        }

        let event = Event::ArrivalRecorded { id, premises_id, arrival_date };
        self.persist_and_apply(premises_id, &mut guard, &event).await?;
        Ok(premises_id)
    }

    pub async fn record_departure(
        &self,
        id: Ulid,
        departure_date: NaiveDate,
    ) -> Result<Ulid, EngineError> {
        let (premises_id, mut guard) = self.resolve_entity_write(&id).await?;
        let booking = guard.booking(id).ok_or(EngineError::NotFound(id))?;
        if !booking.is_active() {
            return Err(EngineError::InvalidTransition { booking: id, reason: "not active" });
        }
        let Some(arrival) = &booking.arrival else {
            return Err(EngineError::InvalidTransition { booking: id, reason: "no arrival recorded" });
        };
        if booking.departure.is_some() {
            return Err(EngineError::InvalidTransition { booking: id, reason: "already departed" });
        }
        if departure_date < arrival.arrival_date {
            return Err(EngineError::InvalidRange {
                start: arrival.arrival_date,
                end: departure_date,
            });
        }

        let event = Event::DepartureRecorded { id, premises_id, departure_date };
        self.persist_and_apply(premises_id, &mut guard, &event).await?;
        Ok(premises_id)
    }

    /// Cancellation is only reachable before arrival — after that the stay is
    /// a fact and ends with a departure record.
    pub async fn cancel_booking(
        &self,
        id: Ulid,
        date: NaiveDate,
        reason: &str,
    ) -> Result<Ulid, EngineError> {
        if reason.len() > MAX_REASON_LEN {
            return Err(EngineError::LimitExceeded("reason length"));
        }
        let (premises_id, mut guard) = self.resolve_entity_write(&id).await?;
        let booking = guard.booking(id).ok_or(EngineError::NotFound(id))?;
        if !booking.is_active() {
            return Err(EngineError::InvalidTransition { booking: id, reason: "not active" });
        }
        if booking.arrival.is_some() {
            return Err(EngineError::InvalidTransition { booking: id, reason: "already arrived" });
        }

        let event = Event::BookingCancelled { id, premises_id, date, reason: reason.to_string() };
        self.persist_and_apply(premises_id, &mut guard, &event).await?;
        Ok(premises_id)
    }

    pub async fn record_non_arrival(
        &self,
        id: Ulid,
        recorded_on: NaiveDate,
        reason: &str,
    ) -> Result<Ulid, EngineError> {
        if reason.len() > MAX_REASON_LEN {
            return Err(EngineError::LimitExceeded("reason length"));
        }
        let (premises_id, mut guard) = self.resolve_entity_write(&id).await?;
        let booking = guard.booking(id).ok_or(EngineError::NotFound(id))?;
        if !booking.is_active() {
            return Err(EngineError::InvalidTransition { booking: id, reason: "not active" });
        }
        if booking.arrival.is_some() {
            return Err(EngineError::InvalidTransition { booking: id, reason: "already arrived" });
        }

        let event = Event::NonArrivalRecorded {
            id,
            premises_id,
            recorded_on,
            reason: reason.to_string(),
        };
        self.persist_and_apply(premises_id, &mut guard, &event).await?;
        Ok(premises_id)
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate
    /// the current state. Booking sub-records collapse into their final form;
    /// cancelled out-of-service records disappear.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for ps_arc in self.premises_snapshot() {
            let guard = ps_arc.read().await;
            events.push(Event::PremisesCreated {
                id: guard.id,
                name: guard.name.clone(),
                address_line: guard.address_line.clone(),
                postcode: guard.postcode.clone(),
                ap_area: guard.ap_area.clone(),
                characteristics: guard.characteristics.iter().copied().collect(),
            });
            for room in &guard.rooms {
                events.push(Event::RoomAdded {
                    id: room.id,
                    premises_id: guard.id,
                    name: room.name.clone(),
                    characteristics: room.characteristics.iter().copied().collect(),
                });
            }
            for bed in &guard.beds {
                events.push(Event::BedAdded {
                    id: bed.id,
                    premises_id: guard.id,
                    room_id: bed.room_id,
                    name: bed.name.clone(),
                    code: bed.code.clone(),
                    end_date: bed.end_date,
                    characteristics: bed.characteristics.iter().copied().collect(),
                });
            }
            for oos in &guard.out_of_service {
                events.push(Event::OutOfServiceRecorded {
                    id: oos.id,
                    premises_id: guard.id,
                    bed_id: oos.bed_id,
                    range: oos.range,
                    reason: oos.reason.clone(),
                });
            }
            for booking in &guard.bookings {
                events.push(Event::BookingMade {
                    id: booking.id,
                    premises_id: guard.id,
                    bed_id: booking.bed_id,
                    crn: booking.crn.clone(),
                    expected_arrival: booking.expected_arrival,
                    expected_departure: booking.expected_departure,
                    essential_characteristics: booking
                        .essential_characteristics
                        .iter()
                        .copied()
                        .collect(),
                });
                if let Some(c) = &booking.confirmation {
                    events.push(Event::BookingConfirmed {
                        id: booking.id,
                        premises_id: guard.id,
                        recorded_at: c.recorded_at,
                    });
                }
                if let Some(a) = &booking.arrival {
                    events.push(Event::ArrivalRecorded {
                        id: booking.id,
                        premises_id: guard.id,
                        arrival_date: a.arrival_date,
                    });
                }
                if let Some(dep) = &booking.departure {
                    events.push(Event::DepartureRecorded {
                        id: booking.id,
                        premises_id: guard.id,
                        departure_date: dep.departure_date,
                    });
                }
                if let Some(c) = &booking.cancellation {
                    events.push(Event::BookingCancelled {
                        id: booking.id,
                        premises_id: guard.id,
                        date: c.date,
                        reason: c.reason.clone(),
                    });
                }
                if let Some(na) = &booking.non_arrival {
                    events.push(Event::NonArrivalRecorded {
                        id: booking.id,
                        premises_id: guard.id,
                        recorded_on: na.recorded_on,
                        reason: na.reason.clone(),
                    });
                }
            }
        }

        // Assignment histories are already minimal — every record is an audit
        // fact — but they must be re-emitted in insertion order so replay
        // rebuilds the same tie-break sequence.
        let application_ids: Vec<Ulid> = self.assignments.iter().map(|e| *e.key()).collect();
        for application_id in application_ids {
            let log = {
                let Some(entry) = self.assignments.get(&application_id) else { continue };
                entry.value().clone()
            };
            let guard = log.read().await;
            for record in guard.insertion_order() {
                events.push(Event::AssignmentRecorded {
                    id: record.id,
                    application_id: record.application_id,
                    prison_code: record.prison_code.clone(),
                    allocated_pom: record.allocated_pom,
                    created_at: record.created_at,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
