pub mod characteristics;
pub mod engine;
pub mod geocode;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;
