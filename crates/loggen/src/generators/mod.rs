//! Content generators.
//!
//! Each generator produces one [`Batch`](loggen_core::Batch) of exactly `rate`
//! items per call, encoded in the wire format of the ingestion endpoint it
//! targets. Randomness comes from the thread-local RNG; the `*_with` builders
//! take an explicit RNG and clock so tests can pin both.

mod logs;
mod metrics;
mod traces;

pub use logs::LogGenerator;
pub use metrics::MetricGenerator;
pub use traces::TraceGenerator;

use clap::ValueEnum;
use core::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Kind of telemetry a run produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum)]
pub enum TelemetryKind {
    /// Loki push API, JSON encoded.
    Logs,
    /// InfluxDB line protocol.
    Metrics,
    /// Zipkin v2 JSON spans.
    Traces,
}

impl TelemetryKind {
    /// Endpoint path, relative to the base URL.
    pub const fn path(self) -> &'static str {
        match self {
            Self::Logs => "/loki/api/v1/push",
            Self::Metrics => "/influx/api/v2/write",
            Self::Traces => "/tempo/spans",
        }
    }

    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Logs | Self::Traces => "application/json",
            Self::Metrics => "text/plain; charset=utf-8",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Logs => "logs",
            Self::Metrics => "metrics",
            Self::Traces => "traces",
        }
    }
}

impl fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

// Picked so the payloads look like a small web service.
pub(crate) const SERVICES: &[&str] = &["frontend", "checkout", "cart", "payments", "inventory"];

pub(crate) const ROUTES: &[&str] = &[
    "/",
    "/api/v1/users",
    "/api/v1/orders",
    "/api/v1/cart",
    "/api/v1/products",
    "/api/v1/payments",
    "/healthz",
];

pub(crate) const METHODS: &[&str] = &["GET", "GET", "GET", "POST", "PUT", "DELETE"];

pub(crate) const STATUSES: &[u16] = &[200, 200, 200, 200, 201, 204, 301, 400, 404, 429, 500, 503];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_endpoints() {
        assert_eq!(TelemetryKind::Logs.path(), "/loki/api/v1/push");
        assert_eq!(TelemetryKind::Metrics.path(), "/influx/api/v2/write");
        assert_eq!(TelemetryKind::Traces.path(), "/tempo/spans");
        assert_eq!(
            TelemetryKind::Metrics.content_type(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn display_matches_cli_value() {
        for kind in TelemetryKind::value_variants() {
            let parsed = TelemetryKind::from_str(&kind.to_string(), false).unwrap();
            assert_eq!(parsed, *kind);
        }
    }
}
