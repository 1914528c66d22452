use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

/// Bound on a single distance lookup. Searches never wait longer than this
/// for the external service.
pub const GEOCODE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub enum GeocodeError {
    Unavailable(String),
    UnknownPostcode(String),
}

impl std::fmt::Display for GeocodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeocodeError::Unavailable(msg) => write!(f, "geocoding unavailable: {msg}"),
            GeocodeError::UnknownPostcode(pc) => write!(f, "unknown postcode: {pc}"),
        }
    }
}

impl std::error::Error for GeocodeError {}

/// Distance lookup between two postcodes. External collaborator — the only
/// network dependency of the engine.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn distance_miles(&self, from: &str, to: &str) -> Result<f64, GeocodeError>;
}

/// Geocoder that never resolves a distance. The default when no collaborator
/// is wired up; searches still work, just without distance ordering.
pub struct NullGeocoder;

#[async_trait]
impl Geocoder for NullGeocoder {
    async fn distance_miles(&self, _from: &str, _to: &str) -> Result<f64, GeocodeError> {
        Err(GeocodeError::Unavailable("no geocoder configured".into()))
    }
}

/// Geocoder backed by a fixed table of postcode pairs. Lookup is symmetric.
/// Used by seeded deployments and tests.
pub struct TableGeocoder {
    distances: HashMap<(String, String), f64>,
}

impl TableGeocoder {
    pub fn new(pairs: impl IntoIterator<Item = (String, String, f64)>) -> Self {
        let mut distances = HashMap::new();
        for (a, b, miles) in pairs {
            distances.insert((a.clone(), b.clone()), miles);
            distances.insert((b, a), miles);
        }
        Self { distances }
    }
}

#[async_trait]
impl Geocoder for TableGeocoder {
    async fn distance_miles(&self, from: &str, to: &str) -> Result<f64, GeocodeError> {
        if from == to {
            return Ok(0.0);
        }
        self.distances
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .ok_or_else(|| GeocodeError::UnknownPostcode(to.to_string()))
    }
}

/// Bounded lookup that degrades instead of failing: a timeout or collaborator
/// error yields `None`, and the search result goes out without a distance.
pub async fn distance_or_none(geocoder: &dyn Geocoder, from: &str, to: &str) -> Option<f64> {
    match tokio::time::timeout(GEOCODE_TIMEOUT, geocoder.distance_miles(from, to)).await {
        Ok(Ok(miles)) => Some(miles),
        Ok(Err(e)) => {
            warn!("geocode lookup {from} -> {to} failed: {e}");
            metrics::counter!(crate::observability::GEOCODE_DEGRADED_TOTAL).increment(1);
            None
        }
        Err(_) => {
            warn!("geocode lookup {from} -> {to} timed out");
            metrics::counter!(crate::observability::GEOCODE_DEGRADED_TOTAL).increment(1);
            None
        }
    }
}
