use super::{ROUTES, SERVICES, unix_nanos};
use loggen_core::{Batch, Generator, Result};
use rand::{Rng, seq::IndexedRandom};
use std::{collections::BTreeMap, fmt::Write as _};
use tokio_util::sync::CancellationToken;

/// Measurement name and the range its value is drawn from.
const MEASUREMENTS: &[(&str, f64, f64)] = &[
    ("cpu_usage_percent", 0.0, 100.0),
    ("memory_usage_bytes", 64.0e6, 8.0e9),
    ("http_request_duration_ms", 0.5, 2_500.0),
    ("http_requests_in_flight", 0.0, 512.0),
    ("disk_io_bytes", 0.0, 1.0e8),
    ("network_rx_bytes", 0.0, 1.0e9),
];

const HOSTS: usize = 16;

/// Gauge samples in InfluxDB line protocol, one sample per line.
///
/// ```text
/// cpu_usage_percent,env=prod,host=host-03,service=cart value=42.17 1700000000000000000
/// ```
#[derive(Debug, Clone)]
pub struct MetricGenerator {
    rate: usize,
    tags: String,
}

impl MetricGenerator {
    pub fn new(rate: usize, labels: BTreeMap<String, String>) -> Self {
        // Label tags are identical on every line, so escape them once.
        let mut tags = String::new();
        for (key, value) in &labels {
            let _ = write!(tags, ",{}={}", escape(key), escape(value));
        }
        Self { rate, tags }
    }

    /// Builds one batch using `rng`, with the first sample stamped at
    /// `now_nanos` and each following sample one nanosecond later.
    pub fn build_with<R: Rng + ?Sized>(&self, rng: &mut R, now_nanos: u128) -> Batch {
        let mut body = String::with_capacity(self.rate * 96);

        for i in 0..self.rate {
            let (name, low, high) = *MEASUREMENTS.choose(rng).unwrap_or(&MEASUREMENTS[0]);
            let value = rng.random_range(low..high);
            let _ = writeln!(
                body,
                "{name}{tags},host=host-{host:02},service={service},route={route} \
                 value={value:.2} {ts}",
                tags = self.tags,
                host = rng.random_range(0..HOSTS),
                service = SERVICES.choose(rng).unwrap_or(&"frontend"),
                route = escape(ROUTES.choose(rng).unwrap_or(&"/")),
                ts = now_nanos + i as u128,
            );
        }

        Batch::from(body)
    }
}

impl Generator for MetricGenerator {
    async fn generate(&self, _cancel: &CancellationToken) -> Result<Batch> {
        Ok(self.build_with(&mut rand::rng(), unix_nanos()))
    }

    fn rate(&self) -> usize {
        self.rate
    }
}

/// Escapes a tag key or value: commas, equals signs and spaces are
/// backslash-escaped.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
