use super::{METHODS, ROUTES, SERVICES, STATUSES, unix_nanos};
use loggen_core::{Batch, Error, Generator, Result};
use rand::{Rng, seq::IndexedRandom};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (X11; Linux x86_64) Firefox/131.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_6) Safari/605.1.15",
    "curl/8.9.1",
    "Go-http-client/2.0",
    "okhttp/4.12.0",
];

/// Loki push request body.
#[derive(Serialize)]
struct PushRequest<'a> {
    streams: Vec<Stream<'a>>,
}

#[derive(Serialize)]
struct Stream<'a> {
    stream: BTreeMap<&'a str, &'a str>,
    /// `[unix nanos as string, line]` pairs.
    values: Vec<[String; 2]>,
}

/// Access-log lines in logfmt, pushed to Loki with one stream per level.
#[derive(Debug, Clone)]
pub struct LogGenerator {
    rate: usize,
    labels: BTreeMap<String, String>,
}

impl LogGenerator {
    pub fn new(rate: usize, labels: BTreeMap<String, String>) -> Self {
        Self { rate, labels }
    }

    /// Builds one push request using `rng`, with the first line stamped at
    /// `now_nanos` and each following line one nanosecond later.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if the request cannot be serialized.
    pub fn build_with<R: Rng + ?Sized>(&self, rng: &mut R, now_nanos: u128) -> Result<Batch> {
        let mut by_level: BTreeMap<&'static str, Vec<[String; 2]>> = BTreeMap::new();

        for i in 0..self.rate {
            let (level, line) = access_line(rng);
            let ts = now_nanos + i as u128;
            by_level
                .entry(level)
                .or_default()
                .push([ts.to_string(), line]);
        }

        let streams = by_level
            .into_iter()
            .map(|(level, values)| {
                let mut stream: BTreeMap<&str, &str> = self
                    .labels
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                stream.insert("level", level);
                stream.entry("job").or_insert("loggen");
                Stream { stream, values }
            })
            .collect();

        let body = serde_json::to_vec(&PushRequest { streams })
            .map_err(|e| Error::encoding(format!("loki push request: {e}")))?;
        Ok(Batch::from(body))
    }

    fn build(&self) -> Result<Batch> {
        self.build_with(&mut rand::rng(), unix_nanos())
    }
}

impl Generator for LogGenerator {
    async fn generate(&self, _cancel: &CancellationToken) -> Result<Batch> {
        self.build()
    }

    fn rate(&self) -> usize {
        self.rate
    }
}

/// One logfmt access-log record and the level derived from its status.
fn access_line<R: Rng + ?Sized>(rng: &mut R) -> (&'static str, String) {
    let status = *STATUSES.choose(rng).unwrap_or(&200);
    let level = match status {
        500.. => "error",
        400..500 => "warn",
        _ if rng.random_bool(0.1) => "debug",
        _ => "info",
    };

    let line = format!(
        "level={level} service={service} method={method} path={path} status={status} \
         latency_ms={latency} bytes={bytes} trace_id={trace_id:032x} user_agent=\"{agent}\"",
        service = SERVICES.choose(rng).unwrap_or(&"frontend"),
        method = METHODS.choose(rng).unwrap_or(&"GET"),
        path = ROUTES.choose(rng).unwrap_or(&"/"),
        latency = rng.random_range(1..=1_500u32),
        bytes = rng.random_range(64..=65_536u32),
        trace_id = rng.random::<u128>(),
        agent = USER_AGENTS.choose(rng).unwrap_or(&"curl/8.9.1"),
    );
    (level, line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};
    use serde_json::Value;

    fn labels() -> BTreeMap<String, String> {
        BTreeMap::from([("env".to_string(), "test".to_string())])
    }

    #[test]
    fn emits_exactly_rate_lines() {
        let generator = LogGenerator::new(250, labels());
        let batch = generator.build_with(&mut StdRng::seed_from_u64(7), 1_000).unwrap();

        let body: Value = serde_json::from_slice(&batch).unwrap();
        let streams = body["streams"].as_array().unwrap();
        let lines: usize = streams
            .iter()
            .map(|s| s["values"].as_array().unwrap().len())
            .sum();
        assert_eq!(lines, 250);
    }

    #[test]
    fn streams_carry_labels_and_matching_level() {
        let generator = LogGenerator::new(100, labels());
        let batch = generator.build_with(&mut StdRng::seed_from_u64(1), 0).unwrap();

        let body: Value = serde_json::from_slice(&batch).unwrap();
        for stream in body["streams"].as_array().unwrap() {
            assert_eq!(stream["stream"]["env"], "test");
            assert_eq!(stream["stream"]["job"], "loggen");
            let level = stream["stream"]["level"].as_str().unwrap();
            for value in stream["values"].as_array().unwrap() {
                let line = value[1].as_str().unwrap();
                assert!(line.starts_with(&format!("level={level} ")), "{line}");
            }
        }
    }

    #[test]
    fn timestamps_are_distinct_nanoseconds() {
        let generator = LogGenerator::new(50, BTreeMap::new());
        let batch = generator
            .build_with(&mut StdRng::seed_from_u64(3), 1_700_000_000_000_000_000)
            .unwrap();

        let body: Value = serde_json::from_slice(&batch).unwrap();
        let mut stamps: Vec<u128> = body["streams"]
            .as_array()
            .unwrap()
            .iter()
            .flat_map(|s| s["values"].as_array().unwrap().clone())
            .map(|v| v[0].as_str().unwrap().parse().unwrap())
            .collect();
        stamps.sort_unstable();
        stamps.dedup();
        assert_eq!(stamps.len(), 50);
        assert_eq!(stamps[0], 1_700_000_000_000_000_000);
    }

    #[tokio::test]
    async fn generate_uses_configured_rate() {
        let generator = LogGenerator::new(3, BTreeMap::new());
        assert_eq!(generator.rate(), 3);
        assert!(!generator.generate(&CancellationToken::new()).await.unwrap().is_empty());
    }
}
