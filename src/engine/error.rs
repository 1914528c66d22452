use chrono::NaiveDate;
use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    InvalidRange { start: NaiveDate, end: NaiveDate },
    UnknownPremises(Ulid),
    UnknownBed(Ulid),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The bed already carries an active booking overlapping the requested range.
    BookingConflict(Ulid),
    /// The bed is out of service during part of the requested range.
    BedOutOfService(Ulid),
    /// A booking sub-record that its current lifecycle state cannot accept.
    InvalidTransition { booking: Ulid, reason: &'static str },
    /// The per-application lock wait on `record_assignment` timed out.
    AssignmentContention(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidRange { start, end } => {
                write!(f, "invalid date range: {start} > {end}")
            }
            EngineError::UnknownPremises(id) => write!(f, "unknown premises: {id}"),
            EngineError::UnknownBed(id) => write!(f, "unknown bed: {id}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::BookingConflict(id) => write!(f, "conflict with booking: {id}"),
            EngineError::BedOutOfService(id) => {
                write!(f, "bed out of service (record {id})")
            }
            EngineError::InvalidTransition { booking, reason } => {
                write!(f, "invalid transition for booking {booking}: {reason}")
            }
            EngineError::AssignmentContention(app) => {
                write!(f, "assignment log for application {app} is contended")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
