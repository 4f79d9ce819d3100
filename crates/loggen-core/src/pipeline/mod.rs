//! Pipeline coordinator.
//!
//! A [`Pipeline`] wires a production loop and a dispatch loop to one bounded
//! queue and one [`CancellationToken`]:
//!
//! - The production loop runs on its own task and pushes batches as fast as
//!   the queue accepts them.
//! - The dispatch loop runs on the caller's task. Every `send_interval` it
//!   takes one batch off the queue and spawns a delivery task for it.
//!
//! Cancelling the token stops both loops. [`Pipeline::run`] returns once the
//! producer has returned and every delivery task already spawned has
//! finished. Batches still sitting in the queue at that point are dropped.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle --run()--> Running --cancel--> Draining --in-flight done--> Stopped
//! ```
//!
//! `run` consumes the pipeline, so an instance cannot be restarted. Use
//! [`Pipeline::watch_state`] before running to follow the transitions.

mod dispatcher;
mod producer;

use crate::{Error, Generator, PipelineMetrics, Result, Sender};
use core::time::Duration;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Number of batches buffered between the producer and the dispatcher.
pub const DEFAULT_QUEUE_CAPACITY: usize = 5;

/// Interval between two dispatch ticks.
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(1);

/// Tunables for a [`Pipeline`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Capacity of the queue. A full queue suspends the producer.
    pub queue_capacity: usize,

    /// Time between two dispatch ticks. Each tick sends exactly one batch.
    pub send_interval: Duration,

    /// Pause after a failed generation before the next attempt. Zero retries
    /// immediately, yielding to the scheduler once.
    pub generate_retry_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            send_interval: DEFAULT_SEND_INTERVAL,
            generate_retry_delay: Duration::ZERO,
        }
    }
}

impl PipelineConfig {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the queue capacity or the send
    /// interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig {
                reason: "queue capacity must be greater than 0".to_string(),
            });
        }
        if self.send_interval.is_zero() {
            return Err(Error::InvalidConfig {
                reason: "send interval must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Lifecycle of a single [`Pipeline`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Built but not started.
    Idle,
    /// Both loops are running.
    Running,
    /// Cancellation observed; waiting for in-flight deliveries.
    Draining,
    /// Everything has stopped. Terminal.
    Stopped,
}

/// Read side of a pipeline's lifecycle.
#[derive(Clone, Debug)]
pub struct StateWatcher(watch::Receiver<PipelineState>);

impl StateWatcher {
    pub fn current(&self) -> PipelineState {
        *self.0.borrow()
    }

    /// Waits until the pipeline reaches `state`.
    ///
    /// Returns `false` if the pipeline was dropped before reaching it.
    pub async fn wait_for(&mut self, state: PipelineState) -> bool {
        self.0.wait_for(|current| *current == state).await.is_ok()
    }
}

/// Generate/send pipeline over a bounded queue.
pub struct Pipeline<G, S> {
    generator: G,
    sender: Arc<S>,
    config: PipelineConfig,
    metrics: Arc<PipelineMetrics>,
    state: watch::Sender<PipelineState>,
}

impl<G, S> Pipeline<G, S>
where
    G: Generator,
    S: Sender,
{
    /// Creates a pipeline with the default [`PipelineConfig`].
    pub fn new(generator: G, sender: S) -> Self {
        Self {
            generator,
            sender: Arc::new(sender),
            config: PipelineConfig::default(),
            metrics: Arc::new(PipelineMetrics::new()),
            state: watch::Sender::new(PipelineState::Idle),
        }
    }

    /// Creates a pipeline with explicit tunables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` does not validate.
    pub fn with_config(generator: G, sender: S, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let mut pipeline = Self::new(generator, sender);
        pipeline.config = config;
        Ok(pipeline)
    }

    /// Records outcomes into an existing registry instead of a fresh one.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn watch_state(&self) -> StateWatcher {
        StateWatcher(self.state.subscribe())
    }

    /// Runs both loops until `shutdown` is cancelled and in-flight deliveries
    /// have drained.
    ///
    /// Generation and delivery failures never end the run; they are logged and
    /// counted in [`PipelineMetrics`].
    pub async fn run(self, shutdown: CancellationToken) {
        let Self {
            generator,
            sender,
            config,
            metrics,
            state,
        } = self;

        let rate = generator.rate() as u64;
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);

        state.send_replace(PipelineState::Running);
        tracing::info!(
            queue_capacity = config.queue_capacity,
            send_interval_ms = config.send_interval.as_millis() as u64,
            rate,
            "Pipeline started"
        );

        let producer = tokio::spawn(producer::produce(
            generator,
            queue_tx,
            shutdown.clone(),
            Arc::clone(&metrics),
            config.generate_retry_delay,
        ));

        dispatcher::dispatch(
            sender,
            queue_rx,
            rate,
            config.send_interval,
            shutdown,
            Arc::clone(&metrics),
            &state,
        )
        .await;

        if let Err(e) = producer.await {
            tracing::error!("Production loop terminated abnormally: {e}");
        }

        state.send_replace(PipelineState::Stopped);
        tracing::info!("Pipeline stopped");
    }
}

/// Runs a pipeline with default tunables until `shutdown` is cancelled and all
/// in-flight deliveries have finished.
///
/// Failures are only visible through logs and metrics; nothing is returned.
pub async fn start<S, G>(shutdown: CancellationToken, sender: S, generator: G)
where
    S: Sender,
    G: Generator,
{
    Pipeline::new(generator, sender).run(shutdown).await;
}
