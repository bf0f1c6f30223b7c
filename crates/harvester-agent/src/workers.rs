use crate::delivery::BackoffSchedule;
use crate::reporter::Reporter;
use harvester_collector::{Catalogue, MetricTable};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

/// Samples the catalogue into the table every `period`, starting at once.
pub async fn poll_loop(mut catalogue: Catalogue, table: Arc<MetricTable>, period: Duration) {
    tracing::info!(
        period_secs = period.as_secs(),
        metrics = catalogue.len(),
        "Starting poll worker"
    );
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tick.tick().await;
        let applied = table.apply(catalogue.poll());
        tracing::debug!(applied, "Polled metrics");
    }
}

/// Sends a snapshot of the table every `period`, first after one period.
/// A slow delivery delays the next report rather than overlapping it.
pub async fn report_loop(
    reporter: Arc<Reporter>,
    table: Arc<MetricTable>,
    period: Duration,
    schedule: BackoffSchedule,
) {
    tracing::info!(
        period_secs = period.as_secs(),
        attempts = schedule.max_attempts(),
        "Starting report worker"
    );
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tick.tick().await;
        let snapshot = table.snapshot();
        reporter.report(&snapshot, &schedule).await;
    }
}
