mod assignments;
mod capacity;
mod conflict;
mod error;
mod mutations;
mod queries;
mod search;

pub use capacity::{capacity_for_day, capacity_for_range};
pub use conflict::{can_book, overbooked_ranges};
pub use error::EngineError;
pub use search::BedSearchCriteria;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::geocode::Geocoder;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

use assignments::AssignmentLog;

pub type SharedPremisesState = Arc<RwLock<PremisesState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The availability and assignment engine: all premises state plus the
/// per-application assignment logs, rebuilt from the WAL on startup.
pub struct Engine {
    pub state: DashMap<Ulid, SharedPremisesState>,
    pub(super) assignments: DashMap<Ulid, Arc<RwLock<AssignmentLog>>>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: entity (room/bed/booking/out-of-service) id → premises id
    pub(super) entity_to_premises: DashMap<Ulid, Ulid>,
    pub(super) geocoder: Arc<dyn Geocoder>,
}

/// Apply an event directly to a PremisesState (no locking — caller holds the lock).
fn apply_to_premises(ps: &mut PremisesState, event: &Event, entity_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::PremisesUpdated { name, address_line, postcode, ap_area, characteristics, .. } => {
            ps.name = name.clone();
            ps.address_line = address_line.clone();
            ps.postcode = postcode.clone();
            ps.ap_area = ap_area.clone();
            ps.characteristics = characteristics.iter().copied().collect();
        }
        Event::RoomAdded { id, premises_id, name, characteristics } => {
            ps.rooms.push(Room {
                id: *id,
                name: name.clone(),
                characteristics: characteristics.iter().copied().collect(),
            });
            entity_map.insert(*id, *premises_id);
        }
        Event::BedAdded { id, premises_id, room_id, name, code, end_date, characteristics } => {
            ps.beds.push(Bed {
                id: *id,
                room_id: *room_id,
                name: name.clone(),
                code: code.clone(),
                end_date: *end_date,
                characteristics: characteristics.iter().copied().collect(),
            });
            entity_map.insert(*id, *premises_id);
        }
        Event::BedRetired { id, end_date, .. } => {
            if let Some(bed) = ps.bed_mut(*id) {
                bed.end_date = Some(*end_date);
            }
        }
        Event::OutOfServiceRecorded { id, premises_id, bed_id, range, reason } => {
            ps.out_of_service.push(OutOfServiceBed {
                id: *id,
                bed_id: *bed_id,
                range: *range,
                reason: reason.clone(),
            });
            entity_map.insert(*id, *premises_id);
        }
        Event::OutOfServiceCancelled { id, .. } => {
            ps.out_of_service.retain(|o| o.id != *id);
            entity_map.remove(id);
        }
        Event::BookingMade {
            id,
            premises_id,
            bed_id,
            crn,
            expected_arrival,
            expected_departure,
            essential_characteristics,
        } => {
            ps.insert_booking(Booking {
                id: *id,
                bed_id: *bed_id,
                crn: crn.clone(),
                expected_arrival: *expected_arrival,
                expected_departure: *expected_departure,
                essential_characteristics: essential_characteristics.iter().copied().collect(),
                confirmation: None,
                arrival: None,
                departure: None,
                cancellation: None,
                non_arrival: None,
            });
            entity_map.insert(*id, *premises_id);
        }
        Event::BookingConfirmed { id, recorded_at, .. } => {
            if let Some(booking) = ps.booking_mut(*id) {
                booking.confirmation = Some(Confirmation { recorded_at: *recorded_at });
            }
        }
        Event::ArrivalRecorded { id, arrival_date, .. } => {
            if let Some(booking) = ps.booking_mut(*id) {
                booking.arrival = Some(Arrival { arrival_date: *arrival_date });
            }
        }
        Event::DepartureRecorded { id, departure_date, .. } => {
            if let Some(booking) = ps.booking_mut(*id) {
                booking.departure = Some(Departure { departure_date: *departure_date });
            }
        }
        Event::BookingCancelled { id, date, reason, .. } => {
            if let Some(booking) = ps.booking_mut(*id) {
                booking.cancellation = Some(Cancellation { date: *date, reason: reason.clone() });
            }
        }
        Event::NonArrivalRecorded { id, recorded_on, reason, .. } => {
            if let Some(booking) = ps.booking_mut(*id) {
                booking.non_arrival =
                    Some(NonArrival { recorded_on: *recorded_on, reason: reason.clone() });
            }
        }
        // Handled at the engine level, not per-premises
        Event::PremisesCreated { .. } | Event::AssignmentRecorded { .. } => {}
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        geocoder: Arc<dyn Geocoder>,
    ) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            assignments: DashMap::new(),
            wal_tx,
            notify,
            entity_to_premises: DashMap::new(),
            geocoder,
        };

        // Replay events — we're the sole owner of these Arcs, so try_read/try_write
        // always succeed instantly (no contention). Never use blocking_read/blocking_write
        // here because this may run inside an async context.
        for event in &events {
            match event {
                Event::PremisesCreated { id, name, address_line, postcode, ap_area, characteristics } => {
                    let ps = PremisesState::new(
                        *id,
                        name.clone(),
                        address_line.clone(),
                        postcode.clone(),
                        ap_area.clone(),
                        characteristics.iter().copied().collect(),
                    );
                    engine.state.insert(*id, Arc::new(RwLock::new(ps)));
                }
                Event::AssignmentRecorded {
                    id,
                    application_id,
                    prison_code,
                    allocated_pom,
                    created_at,
                } => {
                    let log = {
                        let entry = engine.assignments.entry(*application_id).or_default();
                        entry.value().clone()
                    };
                    let mut guard = log.try_write().expect("replay: uncontended write");
                    guard.push(ApplicationAssignment {
                        id: *id,
                        application_id: *application_id,
                        prison_code: prison_code.clone(),
                        allocated_pom: *allocated_pom,
                        created_at: *created_at,
                        seq: 0, // reassigned by push
                    });
                }
                other => {
                    if let Some(premises_id) = event_premises_id(other)
                        && let Some(entry) = engine.state.get(&premises_id)
                    {
                        let ps_arc = entry.clone();
                        let mut guard = ps_arc.try_write().expect("replay: uncontended write");
                        apply_to_premises(&mut guard, other, &engine.entity_to_premises);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_premises(&self, id: &Ulid) -> Option<SharedPremisesState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn premises_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_premises.get(entity_id).map(|e| *e.value())
    }

    /// WAL-append + apply + notify in one call. Eliminates the repeated 3-line pattern.
    pub(super) async fn persist_and_apply(
        &self,
        premises_id: Ulid,
        ps: &mut PremisesState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_premises(ps, event, &self.entity_to_premises);
        self.notify.send(premises_id, event);
        Ok(())
    }

    /// Lookup entity → premises, get premises, acquire write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<PremisesState>), EngineError> {
        let premises_id = self
            .premises_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let ps = self
            .get_premises(&premises_id)
            .ok_or(EngineError::UnknownPremises(premises_id))?;
        let guard = ps.write_owned().await;
        Ok((premises_id, guard))
    }

    /// Snapshot the premises Arcs without holding any shard lock across an await.
    pub(super) fn premises_snapshot(&self) -> Vec<SharedPremisesState> {
        self.state.iter().map(|e| e.value().clone()).collect()
    }
}

/// Extract the premises_id from an event (for non-Create/Assignment events).
fn event_premises_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::RoomAdded { premises_id, .. }
        | Event::BedAdded { premises_id, .. }
        | Event::BedRetired { premises_id, .. }
        | Event::OutOfServiceRecorded { premises_id, .. }
        | Event::OutOfServiceCancelled { premises_id, .. }
        | Event::BookingMade { premises_id, .. }
        | Event::BookingConfirmed { premises_id, .. }
        | Event::ArrivalRecorded { premises_id, .. }
        | Event::DepartureRecorded { premises_id, .. }
        | Event::BookingCancelled { premises_id, .. }
        | Event::NonArrivalRecorded { premises_id, .. } => Some(*premises_id),
        Event::PremisesUpdated { id, .. } => Some(*id),
        Event::PremisesCreated { .. } | Event::AssignmentRecorded { .. } => None,
    }
}
