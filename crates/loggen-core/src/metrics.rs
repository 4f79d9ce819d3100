//! Outcome counters for a pipeline run.
//!
//! [`PipelineMetrics`] is owned by the caller (or created by the pipeline) and
//! shared with the dispatch tasks through an `Arc`. All counters are monotonic
//! except `inflight`, and every update is a single relaxed atomic operation so
//! concurrent delivery tasks never lose an increment.
//!
//! Telemetry sinks read the registry through the accessor methods or a
//! [`MetricsSnapshot`]; only the pipeline writes to it.

use core::time::Duration;
use portable_atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    lines: AtomicU64,
    bytes: AtomicU64,
    errors: AtomicU64,
    generated: AtomicU64,
    generate_errors: AtomicU64,
    dispatched: AtomicU64,
    delivered: AtomicU64,
    inflight: AtomicU64,
    send_nanos: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines emitted: the generator's rate, summed over every dispatch
    /// attempt, including attempts that later failed.
    pub fn lines(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }

    /// Bytes emitted, summed over every dispatch attempt.
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Failed deliveries. Generation failures are not counted here.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn generated(&self) -> u64 {
        self.generated.load(Ordering::Relaxed)
    }

    pub fn generate_errors(&self) -> u64 {
        self.generate_errors.load(Ordering::Relaxed)
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Deliveries that have started but not finished yet.
    pub fn inflight(&self) -> u64 {
        self.inflight.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lines: self.lines(),
            bytes: self.bytes(),
            errors: self.errors(),
            generated: self.generated(),
            generate_errors: self.generate_errors(),
            dispatched: self.dispatched(),
            delivered: self.delivered(),
            inflight: self.inflight(),
            send_time: Duration::from_nanos(self.send_nanos.load(Ordering::Relaxed)),
        }
    }

    pub(crate) fn record_generated(&self) {
        self.generated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_generate_error(&self) {
        self.generate_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Accounts for a batch before its delivery is attempted.
    pub(crate) fn record_dispatch(&self, lines: u64, bytes: u64) {
        self.lines.fetch_add(lines, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.inflight.fetch_add(1, Ordering::Relaxed);
    }

    /// Accounts for a batch and returns the guard that settles its outcome.
    pub(crate) fn begin_send(&self, lines: u64, bytes: u64) -> SendAttempt<'_> {
        self.record_dispatch(lines, bytes);
        SendAttempt {
            metrics: self,
            started: Instant::now(),
            settled: false,
        }
    }

    pub(crate) fn record_delivered(&self, elapsed: Duration) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.finish_send(elapsed);
    }

    pub(crate) fn record_send_error(&self, elapsed: Duration) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.finish_send(elapsed);
    }

    fn finish_send(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.send_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.inflight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// An in-flight delivery.
///
/// Dropping it without calling [`delivered`](Self::delivered) or
/// [`failed`](Self::failed), e.g. while a panicking sender unwinds, counts the
/// attempt as failed so `inflight` always returns to zero.
#[must_use]
pub(crate) struct SendAttempt<'a> {
    metrics: &'a PipelineMetrics,
    started: Instant,
    settled: bool,
}

impl SendAttempt<'_> {
    pub(crate) fn delivered(mut self) {
        self.settled = true;
        self.metrics.record_delivered(self.started.elapsed());
    }

    pub(crate) fn failed(mut self) {
        self.settled = true;
        self.metrics.record_send_error(self.started.elapsed());
    }
}

impl Drop for SendAttempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.metrics.record_send_error(self.started.elapsed());
        }
    }
}

/// Point-in-time copy of a [`PipelineMetrics`] registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub lines: u64,
    pub bytes: u64,
    pub errors: u64,
    pub generated: u64,
    pub generate_errors: u64,
    pub dispatched: u64,
    pub delivered: u64,
    pub inflight: u64,
    /// Total time spent in finished delivery attempts.
    pub send_time: Duration,
}

impl MetricsSnapshot {
    /// Mean duration of a finished delivery attempt, successful or not.
    pub fn avg_send_duration(&self) -> Duration {
        let finished = self.delivered + self.errors;
        if finished == 0 {
            return Duration::ZERO;
        }
        let nanos = self.send_time.as_nanos() / u128::from(finished);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}
