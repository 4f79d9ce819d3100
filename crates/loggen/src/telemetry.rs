//! # Self-telemetry
//!
//! `loggen` reports on itself through `tracing` and, optionally,
//! OpenTelemetry. Console logging is always on; exporters are selected with
//! Cargo features.
//!
//! ## Feature matrix
//!
//! - `otel-traces`: exports the pipeline's `tracing` spans (`start generating`,
//!   `generate new batch`, `start sending`, `receive new batch`).
//! - `otel-metrics`: exports the pipeline counters as observable instruments.
//! - `otlp`: OTLP/HTTP exporter pointed at the ingestion endpoint itself
//!   (`{url}/v1/traces`, `{url}/v1/metrics`) with the API credentials.
//! - `stdout`: stdout exporter, for local debugging.
//!
//! Exporters require at least one of `otel-traces` or `otel-metrics`. Both
//! exporters may be enabled at once.
//!
//! ## Runtime
//!
//! The OTLP exporter uses a blocking HTTP client on the SDK's own worker
//! threads. [`init_telemetry`] and [`TelemetryProviders::shutdown`] must
//! therefore be called outside the Tokio runtime.

#[cfg(all(feature = "otlp", not(any(feature = "otel-traces", feature = "otel-metrics"))))]
compile_error!(
    "The 'otlp' feature requires at least one of 'otel-traces' or 'otel-metrics' to be enabled."
);

#[cfg(all(feature = "stdout", not(any(feature = "otel-traces", feature = "otel-metrics"))))]
compile_error!(
    "The 'stdout' feature requires at least one of 'otel-traces' or 'otel-metrics' to be enabled."
);

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(all(feature = "otlp", any(feature = "otel-metrics", feature = "otel-traces")))]
use opentelemetry_otlp::{Protocol, WithExportConfig, WithHttpConfig};

#[cfg(feature = "otel-metrics")]
use loggen_core::PipelineMetrics;
#[cfg(feature = "otel-metrics")]
use opentelemetry::metrics::{ObservableCounter, ObservableGauge};
#[cfg(feature = "otel-metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "otel-metrics")]
use std::sync::{Arc, OnceLock};

#[cfg(any(feature = "otel-metrics", feature = "otel-traces"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "otel-metrics", feature = "otel-traces"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "otel-metrics", feature = "otel-traces"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "otel-traces")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel-traces")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "otel-traces")]
use opentelemetry_sdk::trace as sdktrace;

/// Where and how to export self-telemetry.
#[derive(Debug, Clone, Default)]
pub struct TelemetryOptions {
    /// Base URL for OTLP export. `None` keeps telemetry local.
    pub otlp_url: Option<String>,
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
    /// Attached to the exported resource.
    pub labels: BTreeMap<String, String>,
}

pub struct TelemetryProviders {
    #[cfg(feature = "otel-traces")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "otel-metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down every provider. Errors are printed to stderr
    /// since the subscriber may already be gone.
    pub fn shutdown(self) {
        #[cfg(feature = "otel-traces")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "otel-metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

/// Installs the global `tracing` subscriber and the OpenTelemetry providers
/// enabled by features.
///
/// # Errors
///
/// Returns an error if an exporter cannot be built or a subscriber is
/// already installed.
pub fn init_telemetry(options: &TelemetryOptions) -> anyhow::Result<TelemetryProviders> {
    #[cfg(not(any(feature = "otel-metrics", feature = "otel-traces")))]
    let _ = options;

    #[cfg(feature = "otel-traces")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "otel-traces")]
    let tracer_provider = init_tracer(options)?;

    #[cfg(feature = "otel-metrics")]
    let meter_provider = init_metrics(options)?;

    // Console output, independent of the `stdout` exporter.
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true),
        );

    #[cfg(feature = "otel-traces")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "otel-metrics")]
    opentelemetry::global::set_meter_provider(meter_provider.clone());

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "otel-traces")]
        tracer_provider,
        #[cfg(feature = "otel-metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "otel-metrics", feature = "otel-traces"))]
fn scope() -> InstrumentationScope {
    InstrumentationScope::builder("loggen")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build()
}

#[cfg(any(feature = "otel-metrics", feature = "otel-traces"))]
fn resource(labels: &BTreeMap<String, String>) -> Resource {
    Resource::builder()
        .with_service_name("loggen")
        .with_attributes(
            labels
                .iter()
                .map(|(key, value)| KeyValue::new(key.clone(), value.clone())),
        )
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "otel-metrics")]
fn init_metrics(options: &TelemetryOptions) -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource(&options.labels));

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::MetricExporter;
        let reader = sdkmetrics::PeriodicReader::builder(MetricExporter::default())
            .with_interval(Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    };

    #[cfg(feature = "otlp")]
    let builder = match &options.otlp_url {
        Some(url) => {
            use anyhow::Context;

            let exporter = opentelemetry_otlp::MetricExporter::builder()
                .with_http()
                .with_endpoint(format!("{url}/v1/metrics"))
                .with_headers(options.headers.clone())
                .with_timeout(options.timeout)
                .with_protocol(Protocol::HttpBinary)
                .build()
                .context("failed to build metrics exporter")?;

            builder.with_periodic_exporter(exporter)
        }
        None => builder,
    };

    Ok(builder.build())
}

#[cfg(feature = "otel-traces")]
fn init_tracer(options: &TelemetryOptions) -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource(&options.labels));

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::SpanExporter;
        builder.with_span_processor(batch_processor(SpanExporter::default()))
    };

    #[cfg(feature = "otlp")]
    let builder = match &options.otlp_url {
        Some(url) => {
            use anyhow::Context;

            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .with_endpoint(format!("{url}/v1/traces"))
                .with_headers(options.headers.clone())
                .with_timeout(options.timeout)
                .with_protocol(Protocol::HttpBinary)
                .build()
                .context("failed to build span exporter")?;

            builder.with_span_processor(batch_processor(exporter))
        }
        None => builder,
    };

    Ok(builder.build())
}

#[cfg(all(feature = "otel-traces", any(feature = "otlp", feature = "stdout")))]
fn batch_processor<E>(exporter: E) -> sdktrace::BatchSpanProcessor
where
    E: opentelemetry_sdk::trace::SpanExporter + 'static,
{
    sdktrace::BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            sdktrace::BatchConfigBuilder::default()
                .with_scheduled_delay(Duration::from_secs(5))
                .with_max_queue_size(2048)
                .build(),
        )
        .build()
}

/// Observable instruments reading a pipeline's registry. Kept alive for the
/// life of the process.
#[cfg(feature = "otel-metrics")]
#[allow(dead_code)]
struct PipelineInstruments {
    lines: ObservableCounter<u64>,
    bytes: ObservableCounter<u64>,
    send_errors: ObservableCounter<u64>,
    generate_errors: ObservableCounter<u64>,
    inflight: ObservableGauge<u64>,
}

#[cfg(feature = "otel-metrics")]
static PIPELINE_INSTRUMENTS: OnceLock<PipelineInstruments> = OnceLock::new();

/// Exposes `metrics` through the global meter provider. Only the first
/// registry registered is observed.
#[cfg(feature = "otel-metrics")]
pub fn observe_pipeline(metrics: &Arc<PipelineMetrics>) {
    let meter = opentelemetry::global::meter_with_scope(scope());

    let counter =
        |name: &'static str, description: &'static str, read: fn(&PipelineMetrics) -> u64| {
            let metrics = Arc::clone(metrics);
            meter
                .u64_observable_counter(name)
                .with_description(description)
                .with_callback(move |observer| observer.observe(read(&metrics), &[]))
                .build()
        };

    let instruments = PipelineInstruments {
        lines: counter(
            "loggen.lines_sent",
            "Items emitted, including failed sends",
            PipelineMetrics::lines,
        ),
        bytes: counter(
            "loggen.bytes_sent",
            "Bytes emitted, including failed sends",
            PipelineMetrics::bytes,
        ),
        send_errors: counter(
            "loggen.send_errors",
            "Failed batch deliveries",
            PipelineMetrics::errors,
        ),
        generate_errors: counter(
            "loggen.generate_errors",
            "Failed batch generations",
            PipelineMetrics::generate_errors,
        ),
        inflight: {
            let metrics = Arc::clone(metrics);
            meter
                .u64_observable_gauge("loggen.inflight_sends")
                .with_description("Deliveries in progress")
                .with_callback(move |observer| observer.observe(metrics.inflight(), &[]))
                .build()
        },
    };

    let _ = PIPELINE_INSTRUMENTS.set(instruments);
}

#[cfg(not(feature = "otel-metrics"))]
pub fn observe_pipeline(_metrics: &std::sync::Arc<loggen_core::PipelineMetrics>) {}

#[cfg(all(test, any(feature = "otel-metrics", feature = "otel-traces")))]
mod tests {
    use super::*;
    use opentelemetry::Key;

    #[test]
    fn resource_carries_service_and_labels() {
        let labels = BTreeMap::from([("env".to_string(), "ci".to_string())]);
        let resource = resource(&labels);

        assert_eq!(
            resource.get(&Key::from_static_str("service.name")),
            Some("loggen".into())
        );
        assert_eq!(resource.get(&Key::from_static_str("env")), Some("ci".into()));
        assert_eq!(
            resource.get(&Key::from_static_str("service.version")),
            Some(env!("CARGO_PKG_VERSION").into())
        );
    }
}
