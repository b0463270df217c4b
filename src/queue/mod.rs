pub mod memory_queue;
pub mod pg_queue;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;

pub use memory_queue::InMemoryJobQueue;
pub use pg_queue::PgJobQueue;

/// Job type consumed by the push delivery worker
pub const PUSH_JOB: &str = "push";

/// A job claimed by a consumer. It stays invisible to other consumers until
/// it is acked, retried, failed, or released as stale.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: Value,
    /// Attempts including the current one
    pub attempts: i32,
}

/// Durable at-least-once work queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job_type: &str, payload: Value) -> Result<Uuid>;

    /// Claim the oldest runnable job of this type, if any.
    async fn dequeue(&self, job_type: &str) -> Result<Option<QueuedJob>>;

    /// The job finished; it will not be handed out again.
    async fn ack(&self, job_id: Uuid) -> Result<()>;

    /// Put the job back with a backoff, or fail it once attempts are exhausted.
    async fn retry(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Give up on the job for good.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Return claimed jobs older than `older_than` to the pending state.
    async fn release_stale(&self, older_than: Duration) -> Result<u64>;

    /// Drop completed and failed jobs that finished more than `older_than` ago.
    async fn purge_finished(&self, older_than: Duration) -> Result<u64>;
}

/// Delay before a retried job becomes runnable again
pub fn retry_backoff(attempts: i32) -> Duration {
    Duration::from_secs(5 * attempts.max(1) as u64)
}
