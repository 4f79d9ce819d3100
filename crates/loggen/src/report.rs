//! Periodic progress reports in the log.

use loggen_core::{MetricsSnapshot, PipelineMetrics};
use std::{sync::Arc, time::Duration};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

/// Logs a snapshot of `metrics` every `every` until `shutdown` is cancelled.
///
/// The final snapshot is left to the caller, which knows when the pipeline
/// has actually drained.
pub async fn report_progress(
    metrics: Arc<PipelineMetrics>,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut previous = metrics.snapshot();

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let current = metrics.snapshot();
        let lines = current.lines.saturating_sub(previous.lines);
        tracing::info!(
            lines = current.lines,
            bytes = current.bytes,
            errors = current.errors,
            generate_errors = current.generate_errors,
            inflight = current.inflight,
            "Progress - {:.1} lines/s over the last {}s",
            lines as f64 / every.as_secs_f64(),
            every.as_secs()
        );
        previous = current;
    }
}

/// Logs the totals of a finished run.
pub fn report_final(snapshot: &MetricsSnapshot, elapsed: Duration) {
    let success_rate = if snapshot.dispatched == 0 {
        0.0
    } else {
        snapshot.delivered as f64 * 100.0 / snapshot.dispatched as f64
    };

    tracing::info!(
        lines = snapshot.lines,
        bytes = snapshot.bytes,
        dispatched = snapshot.dispatched,
        delivered = snapshot.delivered,
        errors = snapshot.errors,
        generate_errors = snapshot.generate_errors,
        inflight = snapshot.inflight,
        "Final metrics - {:.1}% success rate, avg send {}ms, ran for {:.1}s",
        success_rate,
        snapshot.avg_send_duration().as_millis(),
        elapsed.as_secs_f64()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn stops_when_cancelled() {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(report_progress(
            Arc::new(PipelineMetrics::new()),
            Duration::from_secs(1),
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert!(!task.is_finished());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("reporter did not stop")
            .unwrap();
    }

    #[test]
    fn final_report_handles_empty_run() {
        report_final(&MetricsSnapshot::default(), Duration::ZERO);
    }
}
