use super::{METHODS, ROUTES, SERVICES, STATUSES, unix_nanos};
use loggen_core::{Batch, Error, Generator, Result};
use rand::{Rng, seq::IndexedRandom};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

const MAX_SPANS_PER_TRACE: usize = 5;

const DOWNSTREAM_OPERATIONS: &[&str] = &[
    "SELECT orders",
    "SELECT users",
    "INSERT payments",
    "redis GET",
    "redis SET",
    "kafka produce",
    "grpc inventory.Reserve",
];

/// Zipkin v2 span.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Span<'a> {
    trace_id: String,
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    name: String,
    kind: &'static str,
    /// Epoch microseconds.
    timestamp: u64,
    /// Microseconds.
    duration: u64,
    local_endpoint: Endpoint<'a>,
    tags: BTreeMap<&'a str, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Endpoint<'a> {
    service_name: &'a str,
}

/// Zipkin v2 JSON spans grouped into small request traces.
///
/// Each trace has a `SERVER` root span and up to four `CLIENT` children that
/// fit inside the root's time window. Trace ids are 128-bit and span ids
/// 64-bit, both lowercase hex.
#[derive(Debug, Clone)]
pub struct TraceGenerator {
    rate: usize,
    labels: BTreeMap<String, String>,
}

impl TraceGenerator {
    pub fn new(rate: usize, labels: BTreeMap<String, String>) -> Self {
        Self { rate, labels }
    }

    /// Builds one span array using `rng`, with root spans starting at
    /// `now_nanos`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if the spans cannot be serialized.
    pub fn build_with<R: Rng + ?Sized>(&self, rng: &mut R, now_nanos: u128) -> Result<Batch> {
        let now_micros = u64::try_from(now_nanos / 1_000).unwrap_or(u64::MAX);
        let mut spans = Vec::with_capacity(self.rate);

        while spans.len() < self.rate {
            let size = rng
                .random_range(1..=MAX_SPANS_PER_TRACE)
                .min(self.rate - spans.len());
            self.push_trace(rng, now_micros, size, &mut spans);
        }

        let body = serde_json::to_vec(&spans)
            .map_err(|e| Error::encoding(format!("zipkin spans: {e}")))?;
        Ok(Batch::from(body))
    }

    fn push_trace<'a, R: Rng + ?Sized>(
        &'a self,
        rng: &mut R,
        start: u64,
        size: usize,
        spans: &mut Vec<Span<'a>>,
    ) {
        let trace_id = format!("{:032x}", rng.random::<u128>());
        let root_id = format!("{:016x}", rng.random::<u64>());
        let service = *SERVICES.choose(rng).unwrap_or(&"frontend");
        let method = *METHODS.choose(rng).unwrap_or(&"GET");
        let route = *ROUTES.choose(rng).unwrap_or(&"/");
        let status = *STATUSES.choose(rng).unwrap_or(&200);
        let root_duration = rng.random_range(1_000..=2_000_000u64);

        let mut tags = self.base_tags();
        tags.insert("http.method", method.to_string());
        tags.insert("http.route", route.to_string());
        tags.insert("http.status_code", status.to_string());
        if status >= 500 {
            tags.insert("error", "true".to_string());
        }

        spans.push(Span {
            trace_id: trace_id.clone(),
            id: root_id.clone(),
            parent_id: None,
            name: format!("{method} {route}"),
            kind: "SERVER",
            timestamp: start,
            duration: root_duration,
            local_endpoint: Endpoint {
                service_name: service,
            },
            tags,
        });

        for _ in 1..size {
            let offset = rng.random_range(0..root_duration / 2);
            let duration = rng.random_range(1..=root_duration - offset);
            let operation = *DOWNSTREAM_OPERATIONS.choose(rng).unwrap_or(&"redis GET");

            let mut tags = self.base_tags();
            let peer = operation.split(' ').next().unwrap_or(operation);
            tags.insert("peer.service", peer.to_string());

            spans.push(Span {
                trace_id: trace_id.clone(),
                id: format!("{:016x}", rng.random::<u64>()),
                parent_id: Some(root_id.clone()),
                name: operation.to_string(),
                kind: "CLIENT",
                timestamp: start + offset,
                duration,
                local_endpoint: Endpoint {
                    service_name: service,
                },
                tags,
            });
        }
    }

    fn base_tags(&self) -> BTreeMap<&str, String> {
        self.labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect()
    }
}

impl Generator for TraceGenerator {
    async fn generate(&self, _cancel: &CancellationToken) -> Result<Batch> {
        self.build_with(&mut rand::rng(), unix_nanos())
    }

    fn rate(&self) -> usize {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};
    use serde_json::Value;
    use std::collections::HashMap;

    fn spans(rate: usize, seed: u64) -> Vec<Value> {
        let labels = BTreeMap::from([("cluster".to_string(), "eu-1".to_string())]);
        let generator = TraceGenerator::new(rate, labels);
        let batch = generator
            .build_with(&mut StdRng::seed_from_u64(seed), 1_700_000_000_000_000_000)
            .unwrap();
        serde_json::from_slice::<Value>(&batch)
            .unwrap()
            .as_array()
            .unwrap()
            .clone()
    }

    #[test]
    fn emits_exactly_rate_spans() {
        for rate in [1, 4, 5, 17, 200] {
            assert_eq!(spans(rate, rate as u64).len(), rate);
        }
    }

    #[test]
    fn traces_are_small_and_rooted() {
        let spans = spans(300, 11);
        let mut traces: HashMap<&str, Vec<&Value>> = HashMap::new();
        for span in &spans {
            traces
                .entry(span["traceId"].as_str().unwrap())
                .or_default()
                .push(span);
        }

        for members in traces.values() {
            assert!(members.len() <= MAX_SPANS_PER_TRACE);
            let roots: Vec<_> = members.iter().filter(|s| s.get("parentId").is_none()).collect();
            assert_eq!(roots.len(), 1);

            let root = roots[0];
            let root_start = root["timestamp"].as_u64().unwrap();
            let root_end = root_start + root["duration"].as_u64().unwrap();
            for child in members.iter().filter(|s| s.get("parentId").is_some()) {
                assert_eq!(child["parentId"], root["id"]);
                assert_eq!(child["kind"], "CLIENT");
                let start = child["timestamp"].as_u64().unwrap();
                assert!(start >= root_start);
                assert!(start + child["duration"].as_u64().unwrap() <= root_end);
            }
        }
    }

    #[test]
    fn ids_are_hex_and_labels_are_tags() {
        for span in spans(20, 5) {
            let trace_id = span["traceId"].as_str().unwrap();
            let id = span["id"].as_str().unwrap();
            assert_eq!(trace_id.len(), 32);
            assert_eq!(id.len(), 16);
            assert!(trace_id.chars().chain(id.chars()).all(|c| c.is_ascii_hexdigit()));
            assert_eq!(span["tags"]["cluster"], "eu-1");
            assert_eq!(span["timestamp"].as_u64().unwrap() / 1_000_000, 1_700_000_000);
        }
    }
}
