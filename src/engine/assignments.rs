use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::{ApplicationAssignment, Event};

use super::{Engine, EngineError};

/// Append-only assignment history for one application. Records never change
/// and never leave; "current" is always re-derived from the latest record.
#[derive(Debug, Default)]
pub(super) struct AssignmentLog {
    records: Vec<ApplicationAssignment>,
}

impl AssignmentLog {
    pub(super) fn push(&mut self, mut record: ApplicationAssignment) {
        record.seq = self.records.len() as u64;
        self.records.push(record);
    }

    pub(super) fn len(&self) -> usize {
        self.records.len()
    }

    /// The record with the greatest `created_at`; equal timestamps resolve to
    /// the later insertion, so concurrent same-millisecond appends still read
    /// deterministically.
    pub(super) fn current(&self) -> Option<&ApplicationAssignment> {
        self.records
            .iter()
            .max_by_key(|r| (r.created_at, r.seq))
    }

    /// Records exactly as appended. WAL compaction re-emits this order so the
    /// tie-break sequence survives replay.
    pub(super) fn insertion_order(&self) -> &[ApplicationAssignment] {
        &self.records
    }

    pub(super) fn sorted(&self) -> Vec<ApplicationAssignment> {
        let mut out = self.records.clone();
        out.sort_by_key(|r| (r.created_at, r.seq));
        out
    }

    pub(super) fn distinct_prisons(&self) -> usize {
        let mut codes: Vec<&str> = self.records.iter().map(|r| r.prison_code.as_str()).collect();
        codes.sort_unstable();
        codes.dedup();
        codes.len()
    }
}

impl Engine {
    /// Append an assignment record stamped with the current time. One call per
    /// detected external event (submission, location change, reallocation) —
    /// each call is a permanent audit record.
    pub async fn record_assignment(
        &self,
        application_id: Ulid,
        prison_code: &str,
        allocated_pom: Option<Ulid>,
    ) -> Result<Ulid, EngineError> {
        self.record_assignment_at(application_id, prison_code, allocated_pom, Utc::now())
            .await
    }

    /// Append an assignment record with a caller-supplied timestamp. Backfill
    /// imports use this to carry the original event times.
    pub async fn record_assignment_at(
        &self,
        application_id: Ulid,
        prison_code: &str,
        allocated_pom: Option<Ulid>,
        created_at: DateTime<Utc>,
    ) -> Result<Ulid, EngineError> {
        if prison_code.is_empty() || prison_code.len() > MAX_PRISON_CODE_LEN {
            return Err(EngineError::LimitExceeded("prison code length"));
        }

        let log = {
            let entry = self.assignments.entry(application_id).or_default();
            entry.value().clone()
        };

        // Appends for the same application serialize here; different
        // applications never contend.
        let mut guard = match tokio::time::timeout(ASSIGNMENT_LOCK_TIMEOUT, log.write()).await {
            Ok(guard) => guard,
            Err(_) => {
                metrics::counter!(crate::observability::ASSIGNMENT_CONTENTION_TOTAL).increment(1);
                return Err(EngineError::AssignmentContention(application_id));
            }
        };
        if guard.len() >= MAX_ASSIGNMENTS_PER_APPLICATION {
            return Err(EngineError::LimitExceeded("too many assignments for application"));
        }

        let id = Ulid::new();
        let event = Event::AssignmentRecorded {
            id,
            application_id,
            prison_code: prison_code.to_string(),
            allocated_pom,
            created_at,
        };
        self.wal_append(&event).await?;
        guard.push(ApplicationAssignment {
            id,
            application_id,
            prison_code: prison_code.to_string(),
            allocated_pom,
            created_at,
            seq: 0, // reassigned by push
        });
        Ok(id)
    }

    /// Full history for an application, ordered by `created_at` (insertion
    /// order breaking ties). Empty when the application is unknown.
    pub async fn list_assignments(&self, application_id: Ulid) -> Vec<ApplicationAssignment> {
        match self.assignment_log(application_id) {
            Some(log) => log.read().await.sorted(),
            None => Vec::new(),
        }
    }

    /// Prison code of the most recent assignment.
    pub async fn current_prison_code(&self, application_id: Ulid) -> Option<String> {
        let log = self.assignment_log(application_id)?;
        let guard = log.read().await;
        guard.current().map(|r| r.prison_code.clone())
    }

    /// POM of the most recent assignment. `None` both for unknown applications
    /// and for the located-but-unallocated state.
    pub async fn current_allocated_pom(&self, application_id: Ulid) -> Option<Ulid> {
        let log = self.assignment_log(application_id)?;
        let guard = log.read().await;
        guard.current().and_then(|r| r.allocated_pom)
    }

    /// Whether the person has been held in more than one prison over the
    /// application's lifetime.
    pub async fn is_transferred(&self, application_id: Ulid) -> bool {
        match self.assignment_log(application_id) {
            Some(log) => log.read().await.distinct_prisons() > 1,
            None => false,
        }
    }

    fn assignment_log(&self, application_id: Ulid) -> Option<Arc<RwLock<AssignmentLog>>> {
        self.assignments.get(&application_id).map(|e| e.value().clone())
    }
}
