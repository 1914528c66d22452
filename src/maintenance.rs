use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Background task that rewrites the WAL once enough appends have accumulated
/// since the last compaction. Spawned once per engine by the embedding host.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => tracing::warn!("WAL compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use std::sync::Arc;

    use chrono::NaiveDate;
    use ulid::Ulid;

    use crate::engine::Engine;
    use crate::geocode::NullGeocoder;
    use crate::notify::NotifyHub;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("bedspace_test_maintenance");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn compaction_shrinks_churned_wal() {
        let path = test_wal_path("compactor_shrink.wal");
        let engine = Arc::new(
            Engine::new(path.clone(), Arc::new(NotifyHub::new()), Arc::new(NullGeocoder)).unwrap(),
        );

        let premises_id = Ulid::new();
        engine
            .create_premises(premises_id, "Oak House", "12 The Avenue", "SW1A 1AA", None, BTreeSet::new())
            .await
            .unwrap();

        // Churn: bookings made and immediately cancelled.
        for _ in 0..20 {
            let booking_id = Ulid::new();
            engine
                .make_booking(
                    booking_id,
                    premises_id,
                    None,
                    "X1",
                    d(2024, 6, 1),
                    d(2024, 6, 14),
                    BTreeSet::new(),
                )
                .await
                .unwrap();
            engine
                .cancel_booking(booking_id, d(2024, 5, 20), "withdrawn")
                .await
                .unwrap();
        }

        let appends = engine.wal_appends_since_compact().await;
        assert_eq!(appends, 41); // create + 20 * (make + cancel)

        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);

        // The compacted log still rebuilds the full state.
        let reopened =
            Engine::new(path.clone(), Arc::new(NotifyHub::new()), Arc::new(NullGeocoder)).unwrap();
        let bookings = reopened.list_bookings(premises_id, d(2024, 6, 1)).await.unwrap();
        assert_eq!(bookings.len(), 20);
        assert!(bookings.iter().all(|b| b.status == crate::model::BookingStatus::Cancelled));

        let _ = std::fs::remove_file(&path);
    }
}
