use crate::{
    config::RunConfig,
    generators::{LogGenerator, MetricGenerator, TelemetryKind, TraceGenerator},
    report::{report_final, report_progress},
    senders::HttpSender,
    telemetry,
};
use loggen_core::{Generator, MetricsSnapshot, Pipeline, PipelineMetrics};
use std::{sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;

/// Runs one generate/send session until `shutdown` is cancelled or the
/// configured duration elapses, and returns the final counters.
///
/// # Errors
///
/// Returns an error if the HTTP sender or the pipeline cannot be built.
/// Failures while running are only counted.
pub async fn run(
    config: RunConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<MetricsSnapshot> {
    let sender = HttpSender::new(
        config.endpoint(),
        config.kind.content_type(),
        &config.api_key,
        &config.api_secret,
        config.timeout,
    )?;

    if let Some(duration) = config.duration {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {}
                () = tokio::time::sleep(duration) => {
                    tracing::info!("Run duration of {:?} elapsed, stopping", duration);
                    shutdown.cancel();
                }
            }
        });
    }

    tracing::info!(
        kind = %config.kind,
        endpoint = sender.endpoint(),
        rate = config.rate,
        "Starting loggen"
    );

    let rate = config.rate;
    let labels = config.labels.clone();
    match config.kind {
        TelemetryKind::Logs => {
            run_pipeline(LogGenerator::new(rate, labels), sender, &config, shutdown).await
        }
        TelemetryKind::Metrics => {
            run_pipeline(MetricGenerator::new(rate, labels), sender, &config, shutdown).await
        }
        TelemetryKind::Traces => {
            run_pipeline(TraceGenerator::new(rate, labels), sender, &config, shutdown).await
        }
    }
}

async fn run_pipeline<G: Generator>(
    generator: G,
    sender: HttpSender,
    config: &RunConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<MetricsSnapshot> {
    let metrics = Arc::new(PipelineMetrics::new());
    telemetry::observe_pipeline(&metrics);

    let pipeline = Pipeline::with_config(generator, sender, config.pipeline)?
        .with_metrics(Arc::clone(&metrics));

    let reporter = tokio::spawn(report_progress(
        Arc::clone(&metrics),
        config.report_interval,
        shutdown.clone(),
    ));

    let started = Instant::now();
    pipeline.run(shutdown).await;
    if let Err(e) = reporter.await {
        tracing::warn!("Progress reporter terminated abnormally: {e}");
    }

    let snapshot = metrics.snapshot();
    report_final(&snapshot, started.elapsed());
    Ok(snapshot)
}
