use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bed searches executed.
pub const SEARCHES_TOTAL: &str = "bedspace_searches_total";

/// Histogram: bed search latency in seconds.
pub const SEARCH_DURATION_SECONDS: &str = "bedspace_search_duration_seconds";

/// Counter: booking attempts rejected by the conflict guard.
pub const BOOKING_CONFLICTS_TOTAL: &str = "bedspace_booking_conflicts_total";

/// Counter: searches that went out without distances because the geocoder
/// failed or timed out.
pub const GEOCODE_DEGRADED_TOTAL: &str = "bedspace_geocode_degraded_total";

/// Counter: record_assignment calls that hit the per-application lock timeout.
pub const ASSIGNMENT_CONTENTION_TOTAL: &str = "bedspace_assignment_contention_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "bedspace_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "bedspace_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "bedspace_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
