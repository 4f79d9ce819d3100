//! # loggen-core
//!
//! The generate/send pipeline behind `loggen`, a synthetic telemetry load
//! generator.
//!
//! A [`Pipeline`] owns a bounded queue of [`Batch`]es. A production loop keeps
//! the queue full by calling a [`Generator`]; a dispatch loop wakes up on a
//! fixed interval, takes one batch off the queue and hands it to a [`Sender`]
//! on its own task. A full queue suspends the producer, which is the only
//! backpressure in the system.
//!
//! Outcomes are counted in an explicitly-owned [`PipelineMetrics`] registry and
//! every generation/send cycle is wrapped in a `tracing` span, so the core can
//! be exercised without a telemetry backend.
//!
//! ```no_run
//! use loggen_core::{Batch, Generator, Result, Sender};
//! use tokio_util::sync::CancellationToken;
//!
//! struct Fixed;
//!
//! impl Generator for Fixed {
//!     async fn generate(&self, _cancel: &CancellationToken) -> Result<Batch> {
//!         Ok(Batch::from_static(b"hello"))
//!     }
//!
//!     fn rate(&self) -> usize {
//!         1
//!     }
//! }
//!
//! struct Discard;
//!
//! impl Sender for Discard {
//!     async fn send(&self, _batch: Batch, _cancel: &CancellationToken) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() {
//! let token = CancellationToken::new();
//! loggen_core::start(token, Discard, Fixed).await;
//! # }
//! ```

mod batch;
mod error;
mod generator;
mod metrics;
mod pipeline;
mod sender;

pub use crate::batch::*;
pub use crate::error::*;
pub use crate::generator::*;
pub use crate::metrics::*;
pub use crate::pipeline::*;
pub use crate::sender::*;
