use crate::{Batch, Result};
use core::future::Future;
use tokio_util::sync::CancellationToken;

/// Delivers a batch to a remote endpoint.
///
/// Every error is treated as a permanent failure for that batch: the pipeline
/// counts it, logs it and drops the batch. There is no retry and no
/// re-enqueue, so transports that want a deadline must apply their own
/// timeout.
pub trait Sender: Send + Sync + 'static {
    /// Returns a future that resolves once the delivery attempt is over.
    ///
    /// `cancel` is the pipeline's shutdown token. The pipeline waits for every
    /// started send during the drain, so a transport that stops early once
    /// `cancel` fires shortens shutdown; one that ignores it runs to
    /// completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be delivered.
    fn send(
        &self,
        batch: Batch,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<()>> + Send;
}
