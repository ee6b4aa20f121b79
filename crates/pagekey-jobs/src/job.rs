//! The unit of background work.

use async_trait::async_trait;

use pagekey_core::Result;

/// Called on the queue worker once a job has finished, with the job's
/// outcome. The callback may enqueue follow-up jobs.
pub type CompletionCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// A job run by the coordinator.
///
/// The name selects the queue: all jobs sharing a name run one at a time in
/// submission order.
#[async_trait]
pub trait Job: Send + Sync {
    /// Queue name for this job.
    fn name(&self) -> &str;

    /// Run the job.
    async fn execute(&self) -> Result<()>;
}
