//! The job handler seam.

use std::sync::Arc;

use async_trait::async_trait;

/// User-supplied job logic: a function from payload to success or failure.
///
/// Handlers run inside an isolated task with a hard wall-clock ceiling. A
/// handler that panics is treated the same as one that returns an error;
/// one that outlives the worker's timeout is killed without any chance to
/// clean up, so resources that must be released on timeout have to be
/// externalized.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// Process one message payload.
    ///
    /// # Errors
    /// Any error marks the attempt as failed; the queue's retry policy
    /// decides what happens next.
    async fn handle(&self, payload: Arc<[u8]>) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> JobHandler for F
where
    F: Fn(Arc<[u8]>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, payload: Arc<[u8]>) -> anyhow::Result<()> {
        (self)(payload).await
    }
}
