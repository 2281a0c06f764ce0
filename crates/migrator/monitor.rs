//! Progress reporting and interrupt handling running beside the worker.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::stats::{MigrationStats, StatsSnapshot};

/// Throughput between two snapshots, in scanned keys per second.
pub fn throughput(previous: &StatsSnapshot, current: &StatsSnapshot, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    current.total.saturating_sub(previous.total) as f64 / secs
}

/// Logs progress every `interval` until `stop` is cancelled.
///
/// Only reads `stats`; never blocks the worker.
pub fn spawn_monitor(
    stats: Arc<MigrationStats>,
    interval: Duration,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        let started = Instant::now();
        let mut previous = stats.snapshot();
        let mut last_tick = Instant::now();
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let current = stats.snapshot();
                    let rate = throughput(&previous, &current, last_tick.elapsed());
                    info!(
                        "[MIGRATION] {} | scanned {} | written {} | {:.0} keys/s | elapsed {}s",
                        current.phase,
                        current.total,
                        current.written,
                        rate,
                        started.elapsed().as_secs()
                    );
                    previous = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}

/// Cancels `cancel` on Ctrl-C. Exits quietly once `cancel` fires for any
/// other reason.
pub fn spawn_interrupt_listener(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    warn!("[MIGRATION] Interrupt received, stopping after the current record");
                    cancel.cancel();
                }
                Err(e) => warn!("[MIGRATION] Cannot listen for interrupts: {e}"),
            },
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::RecordKind;

    #[test]
    fn throughput_uses_scanned_delta() {
        let stats = MigrationStats::new();
        let before = stats.snapshot();
        for _ in 0..50 {
            stats.record_scanned(RecordKind::Other);
        }
        let after = stats.snapshot();
        let rate = throughput(&before, &after, Duration::from_secs(5));
        assert!((rate - 10.0).abs() < f64::EPSILON);
        assert_eq!(throughput(&before, &after, Duration::ZERO), 0.0);
    }

    #[tokio::test]
    async fn monitor_stops_when_cancelled() {
        let stats = Arc::new(MigrationStats::new());
        let stop = CancellationToken::new();
        let handle = spawn_monitor(stats, Duration::from_millis(10), stop.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        stop.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor exits")
            .expect("monitor task");
    }

    #[tokio::test]
    async fn listener_exits_on_external_cancel() {
        let cancel = CancellationToken::new();
        let handle = spawn_interrupt_listener(cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("listener exits")
            .expect("listener task");
    }
}
