use crate::{Batch, Generator, PipelineMetrics};
use core::time::Duration;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, field};

/// Production loop.
///
/// Calls the generator until `shutdown` is cancelled and pushes every batch
/// onto `queue`. The push suspends while the queue is full, which throttles
/// generation to the dispatch rate. Cancellation is checked before each
/// attempt and while suspended on a full queue.
///
/// A failed generation is logged on its attempt span, counted, and retried
/// after `retry_delay`. Nothing is enqueued for it.
pub(super) async fn produce<G: Generator>(
    generator: G,
    queue: mpsc::Sender<Batch>,
    shutdown: CancellationToken,
    metrics: Arc<PipelineMetrics>,
    retry_delay: Duration,
) {
    let span = tracing::info_span!("start generating");

    async move {
        tracing::debug!("Production loop started");

        while !shutdown.is_cancelled() {
            let attempt = tracing::info_span!(
                "generate new batch",
                otel.status_code = field::Empty,
                otel.status_description = field::Empty,
            );

            let batch = match generator.generate(&shutdown).instrument(attempt.clone()).await {
                Ok(batch) => batch,
                Err(e) => {
                    attempt.record("otel.status_code", "ERROR");
                    attempt.record("otel.status_description", field::display(&e));
                    attempt.in_scope(|| tracing::warn!(error = %e, "Error generating batch"));
                    drop(attempt);

                    metrics.record_generate_error();
                    back_off(&shutdown, retry_delay).await;
                    continue;
                }
            };
            drop(attempt);
            metrics.record_generated();

            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                sent = queue.send(batch) => {
                    if sent.is_err() {
                        tracing::debug!("Queue closed, stopping production");
                        break;
                    }
                }
            }
        }

        tracing::debug!("Production loop stopped");
    }
    .instrument(span)
    .await;
}

async fn back_off(shutdown: &CancellationToken, delay: Duration) {
    if delay.is_zero() {
        // Yield to the scheduler so a generator that fails synchronously
        // cannot starve the runtime.
        tokio::task::yield_now().await;
        return;
    }

    tokio::select! {
        () = shutdown.cancelled() => {}
        () = tokio::time::sleep(delay) => {}
    }
}
