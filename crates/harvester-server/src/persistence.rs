//! Snapshot sidecar for the metric repository.

use anyhow::{Context, Result};
use harvester_storage::{SnapshotFile, StorageEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Creates the snapshot file when missing and, for non-durable backends with
/// `restore` set, loads it into `storage`. An unreadable snapshot aborts
/// start-up.
pub async fn bootstrap(
    storage: &dyn StorageEngine,
    snapshot: &SnapshotFile,
    restore: bool,
) -> Result<()> {
    snapshot
        .ensure_exists()
        .with_context(|| format!("preparing snapshot {}", snapshot.path().display()))?;
    if !restore {
        return Ok(());
    }
    if storage.is_durable() {
        tracing::info!(backend = storage.name(), "Durable backend, snapshot not restored");
        return Ok(());
    }
    let restored = snapshot
        .restore_into(storage)
        .await
        .with_context(|| format!("restoring snapshot {}", snapshot.path().display()))?;
    tracing::info!(restored, path = %snapshot.path().display(), "Snapshot restored");
    Ok(())
}

/// Writes the repository to the snapshot every `period`, first after one
/// period. Failures are logged and retried at the next tick.
pub async fn store_loop(storage: Arc<dyn StorageEngine>, snapshot: SnapshotFile, period: Duration) {
    tracing::info!(
        period_secs = period.as_secs(),
        path = %snapshot.path().display(),
        "Starting snapshot worker"
    );
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tick.tick().await;
        match snapshot.save_from(storage.as_ref()).await {
            Ok(count) => tracing::debug!(count, "Snapshot written"),
            Err(e) => tracing::error!(error = %e, "Snapshot write failed"),
        }
    }
}

/// Last snapshot write on shutdown.
pub async fn final_flush(storage: &dyn StorageEngine, snapshot: &SnapshotFile) {
    match snapshot.save_from(storage).await {
        Ok(count) => tracing::info!(count, "Final snapshot written"),
        Err(e) => tracing::error!(error = %e, "Final snapshot write failed"),
    }
}
