use crate::{Batch, Result};
use core::future::Future;
use tokio_util::sync::CancellationToken;

/// Produces batches of synthetic telemetry.
///
/// The pipeline makes no assumption about the content or encoding of a batch.
/// `rate` is the nominal number of items (log lines, samples, spans) that one
/// batch represents and is only used for accounting.
///
/// Implementations may be written with `async fn`; the returned future must be
/// `Send` because the production loop runs on its own task.
pub trait Generator: Send + Sync + 'static {
    /// Returns a future that resolves to the next batch.
    ///
    /// `cancel` is the pipeline's shutdown token. Generators that wait on
    /// external resources should give up once it is cancelled.
    ///
    /// # Errors
    ///
    /// Any error discards this attempt. The production loop logs it and asks
    /// for another batch.
    fn generate(&self, cancel: &CancellationToken) -> impl Future<Output = Result<Batch>> + Send;

    /// Number of items represented by one batch.
    fn rate(&self) -> usize;
}
