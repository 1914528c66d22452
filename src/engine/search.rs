use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;
use ulid::Ulid;

use crate::characteristics::Characteristic;
use crate::geocode::distance_or_none;
use crate::limits::*;
use crate::model::*;

use super::conflict::validate_range;
use super::{Engine, EngineError};

/// What a caseworker is looking for: a stay of `duration_days` nights from
/// `start_date`, in a bed whose premises/room/bed traits cover every required
/// characteristic, optionally ranked by distance from a postcode.
#[derive(Debug, Clone)]
pub struct BedSearchCriteria {
    pub start_date: NaiveDate,
    pub duration_days: u32,
    pub required_characteristics: BTreeSet<Characteristic>,
    pub postcode: Option<String>,
}

impl Engine {
    /// Rank every bookable bed matching `criteria`. No candidates is a valid
    /// answer (empty results, zero counts), not an error.
    pub async fn search_beds(
        &self,
        criteria: &BedSearchCriteria,
    ) -> Result<BedSearchResults, EngineError> {
        if criteria.duration_days == 0 {
            return Err(EngineError::LimitExceeded("search duration must be at least one night"));
        }
        if criteria.duration_days > MAX_SEARCH_DURATION_DAYS {
            return Err(EngineError::LimitExceeded("search duration too long"));
        }
        let end = criteria
            .start_date
            .checked_add_days(chrono::Days::new(u64::from(criteria.duration_days) - 1))
            .ok_or(EngineError::LimitExceeded("date out of range"))?;
        let target = DateRange::new(criteria.start_date, end)?;
        validate_range(&target)?;

        let search_start = std::time::Instant::now();
        let mut results = Vec::new();

        for ps_arc in self.premises_snapshot() {
            let ps = ps_arc.read().await;
            for bed in &ps.beds {
                if !bed.covers_range(&target) {
                    continue;
                }
                if ps.bed_out_of_service_during(bed.id, &target) {
                    continue;
                }
                let occupied = ps
                    .active_bookings_overlapping(&target)
                    .any(|b| b.bed_id == Some(bed.id));
                if occupied {
                    continue;
                }

                let mut effective = ps.bed_characteristics(bed);
                effective.extend(ps.characteristics.iter().copied());
                if !criteria.required_characteristics.is_subset(&effective) {
                    continue;
                }

                // A bed whose room is missing is inventory corruption; skip it
                // rather than fabricating a result.
                let Some(room) = ps.room(bed.room_id) else {
                    continue;
                };

                results.push(BedSearchResult {
                    premises: PremisesRef {
                        id: ps.id,
                        name: ps.name.clone(),
                        postcode: ps.postcode.clone(),
                    },
                    room: RoomRef { id: room.id, name: room.name.clone() },
                    bed: BedRef { id: bed.id, name: bed.name.clone() },
                    distance_miles: None,
                });
            }
        }

        if let Some(target_postcode) = &criteria.postcode {
            // One lookup per distinct premises postcode; a failed or timed-out
            // lookup leaves the distance off rather than failing the search.
            let mut cache: HashMap<String, Option<f64>> = HashMap::new();
            for result in &mut results {
                let premises_postcode = result.premises.postcode.clone();
                let miles = match cache.get(&premises_postcode) {
                    Some(cached) => *cached,
                    None => {
                        let miles = distance_or_none(
                            self.geocoder.as_ref(),
                            target_postcode,
                            &premises_postcode,
                        )
                        .await;
                        cache.insert(premises_postcode, miles);
                        miles
                    }
                };
                result.distance_miles = miles;
            }
        }

        results.sort_by(|a, b| {
            cmp_distance(a.distance_miles, b.distance_miles)
                .then_with(|| a.premises.name.cmp(&b.premises.name))
                .then_with(|| a.bed.name.cmp(&b.bed.name))
        });

        let bed_ids: HashSet<Ulid> = results.iter().map(|r| r.bed.id).collect();
        let room_ids: HashSet<Ulid> = results.iter().map(|r| r.room.id).collect();
        let premises_ids: HashSet<Ulid> = results.iter().map(|r| r.premises.id).collect();

        metrics::counter!(crate::observability::SEARCHES_TOTAL).increment(1);
        metrics::histogram!(crate::observability::SEARCH_DURATION_SECONDS)
            .record(search_start.elapsed().as_secs_f64());

        Ok(BedSearchResults {
            results_bed_count: bed_ids.len() as u32,
            results_room_count: room_ids.len() as u32,
            results_premises_count: premises_ids.len() as u32,
            results,
        })
    }
}

/// Ascending by distance, beds without a distance last.
fn cmp_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
