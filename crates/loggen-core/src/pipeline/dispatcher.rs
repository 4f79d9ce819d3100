use super::PipelineState;
use crate::{Batch, PipelineMetrics, Sender};
use core::time::Duration;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch},
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{Instrument, Span, field};

/// Dispatch loop.
///
/// On every tick of a `period` timer, takes exactly one batch off `queue` and
/// spawns a delivery task for it. The first tick fires one period after the
/// loop starts. If the queue is empty the loop waits for the next batch, so
/// the effective send rate is bounded by both the timer and the producer.
///
/// On cancellation the loop stops taking batches, moves the pipeline to
/// [`PipelineState::Draining`] and waits for every spawned delivery to finish.
pub(super) async fn dispatch<S: Sender>(
    sender: Arc<S>,
    mut queue: mpsc::Receiver<Batch>,
    rate: u64,
    period: Duration,
    shutdown: CancellationToken,
    metrics: Arc<PipelineMetrics>,
    state: &watch::Sender<PipelineState>,
) {
    let span = tracing::info_span!("start sending");

    async move {
        let tracker = TaskTracker::new();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let batch = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                batch = queue.recv() => match batch {
                    Some(batch) => batch,
                    None => {
                        tracing::warn!("Queue closed before shutdown, stopping dispatch");
                        break;
                    }
                },
            };

            let delivery = tracing::info_span!(
                "receive new batch",
                lines = rate,
                bytes = batch.len(),
                otel.status_code = field::Empty,
                otel.status_description = field::Empty,
            );
            let delivery_task = deliver(
                Arc::clone(&sender),
                batch,
                rate,
                Arc::clone(&metrics),
                shutdown.clone(),
            );
            tracker.spawn(delivery_task.instrument(delivery));
        }

        state.send_replace(PipelineState::Draining);
        tracker.close();
        tracing::info!("Draining in-flight sends ({} active)", tracker.len());
        tracker.wait().await;
        tracing::debug!("All in-flight sends drained");
    }
    .instrument(span)
    .await;
}

/// One delivery attempt. Counters are bumped before the send so they reflect
/// attempts rather than confirmed deliveries.
async fn deliver<S: Sender>(
    sender: Arc<S>,
    batch: Batch,
    lines: u64,
    metrics: Arc<PipelineMetrics>,
    shutdown: CancellationToken,
) {
    let bytes = batch.len() as u64;
    tracing::debug!("Sending batch of {lines} lines of {bytes} bytes");

    let attempt = metrics.begin_send(lines, bytes);
    match sender.send(batch, &shutdown).await {
        Ok(()) => attempt.delivered(),
        Err(e) => {
            attempt.failed();

            let span = Span::current();
            span.record("otel.status_code", "ERROR");
            span.record("otel.status_description", field::display(&e));
            tracing::error!(error = %e, "Error sending request");
        }
    }
}
