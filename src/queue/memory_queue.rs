use async_trait::async_trait;
use serde_json::Value;
use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};
use tokio::{sync::Mutex, time::Instant};
use uuid::Uuid;

use crate::error::{AppError, Result};

use super::{retry_backoff, JobQueue, QueuedJob};

/// Oldest failures are dropped past this many
const MAX_FAILED_JOBS: usize = 1000;

/// Process-local queue. Jobs survive consumer failures but not a restart.
/// Acked jobs are dropped at once; failed ones are kept for inspection.
pub struct InMemoryJobQueue {
    state: Mutex<QueueState>,
    max_attempts: i32,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Pending>,
    in_flight: HashMap<Uuid, (QueuedJob, Instant)>,
    failed: VecDeque<Failed>,
}

struct Failed {
    job: QueuedJob,
    error: String,
    failed_at: Instant,
}

impl QueueState {
    fn record_failure(&mut self, job: QueuedJob, error: &str) {
        self.failed.push_back(Failed {
            job,
            error: error.to_string(),
            failed_at: Instant::now(),
        });
        while self.failed.len() > MAX_FAILED_JOBS {
            if let Some(dropped) = self.failed.pop_front() {
                tracing::debug!("Dropping failed job {}: {}", dropped.job.id, dropped.error);
            }
        }
    }
}

struct Pending {
    job: QueuedJob,
    run_at: Instant,
}

impl InMemoryJobQueue {
    pub fn new(max_attempts: i32) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            max_attempts,
        }
    }

    #[cfg(test)]
    pub async fn pending_jobs(&self) -> Vec<QueuedJob> {
        let state = self.state.lock().await;
        state.pending.iter().map(|p| p.job.clone()).collect()
    }

    #[cfg(test)]
    pub async fn failed_count(&self) -> usize {
        self.state.lock().await.failed.len()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job_type: &str, payload: Value) -> Result<Uuid> {
        let job = QueuedJob {
            id: Uuid::new_v4(),
            job_type: job_type.to_string(),
            payload,
            attempts: 0,
        };
        let id = job.id;

        self.state.lock().await.pending.push_back(Pending {
            job,
            run_at: Instant::now(),
        });

        tracing::debug!("Enqueued job: id={}, type='{}'", id, job_type);
        Ok(id)
    }

    async fn dequeue(&self, job_type: &str) -> Result<Option<QueuedJob>> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let Some(index) = state
            .pending
            .iter()
            .position(|p| p.job.job_type == job_type && p.run_at <= now)
        else {
            return Ok(None);
        };

        let Some(Pending { mut job, .. }) = state.pending.remove(index) else {
            return Ok(None);
        };
        job.attempts += 1;
        state.in_flight.insert(job.id, (job.clone(), now));

        Ok(Some(job))
    }

    async fn ack(&self, job_id: Uuid) -> Result<()> {
        self.state.lock().await.in_flight.remove(&job_id);
        Ok(())
    }

    async fn retry(&self, job_id: Uuid, error: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let (job, _) = state
            .in_flight
            .remove(&job_id)
            .ok_or_else(|| AppError::Queue(format!("job {} is not in flight", job_id)))?;

        if job.attempts >= self.max_attempts {
            tracing::warn!("Job {} exhausted {} attempts: {}", job_id, job.attempts, error);
            state.record_failure(job, error);
        } else {
            let run_at = Instant::now() + retry_backoff(job.attempts);
            state.pending.push_back(Pending { job, run_at });
        }

        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some((job, _)) = state.in_flight.remove(&job_id) {
            state.record_failure(job, error);
        }
        Ok(())
    }

    async fn release_stale(&self, older_than: Duration) -> Result<u64> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let stale: Vec<Uuid> = state
            .in_flight
            .iter()
            .filter(|(_, (_, claimed_at))| now.duration_since(*claimed_at) >= older_than)
            .map(|(id, _)| *id)
            .collect();

        for id in &stale {
            if let Some((job, _)) = state.in_flight.remove(id) {
                state.pending.push_back(Pending { job, run_at: now });
            }
        }

        Ok(stale.len() as u64)
    }

    async fn purge_finished(&self, older_than: Duration) -> Result<u64> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let mut purged = 0;
        while state
            .failed
            .front()
            .is_some_and(|f| now.duration_since(f.failed_at) >= older_than)
        {
            state.failed.pop_front();
            purged += 1;
        }

        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::PUSH_JOB;
    use serde_json::json;

    #[tokio::test]
    async fn test_claimed_job_is_not_handed_out_twice() {
        let queue = InMemoryJobQueue::new(3);
        queue.enqueue(PUSH_JOB, json!({ "n": 1 })).await.unwrap();

        let job = queue.dequeue(PUSH_JOB).await.unwrap().unwrap();
        assert_eq!(job.attempts, 1);
        assert_eq!(job.payload["n"], 1);
        assert!(queue.dequeue(PUSH_JOB).await.unwrap().is_none());

        queue.ack(job.id).await.unwrap();
        assert!(queue.dequeue(PUSH_JOB).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dequeue_filters_by_type() {
        let queue = InMemoryJobQueue::new(3);
        queue.enqueue("email", json!({})).await.unwrap();

        assert!(queue.dequeue(PUSH_JOB).await.unwrap().is_none());
        assert!(queue.dequeue("email").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backs_off_then_fails_after_max_attempts() {
        let queue = InMemoryJobQueue::new(2);
        queue.enqueue(PUSH_JOB, json!({})).await.unwrap();

        let job = queue.dequeue(PUSH_JOB).await.unwrap().unwrap();
        queue.retry(job.id, "endpoint store down").await.unwrap();
        assert!(queue.dequeue(PUSH_JOB).await.unwrap().is_none());

        tokio::time::advance(retry_backoff(1)).await;
        let job = queue.dequeue(PUSH_JOB).await.unwrap().unwrap();
        assert_eq!(job.attempts, 2);

        queue.retry(job.id, "endpoint store down").await.unwrap();
        assert_eq!(queue.failed_count().await, 1);
        assert!(queue.pending_jobs().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_drops_old_failures_only() {
        let queue = InMemoryJobQueue::new(3);
        for n in 0..2 {
            queue.enqueue(PUSH_JOB, json!({ "n": n })).await.unwrap();
            let job = queue.dequeue(PUSH_JOB).await.unwrap().unwrap();
            queue.fail(job.id, "undecodable").await.unwrap();
            tokio::time::advance(Duration::from_secs(3600)).await;
        }
        assert_eq!(queue.failed_count().await, 2);

        assert_eq!(queue.purge_finished(Duration::from_secs(7200)).await.unwrap(), 1);
        assert_eq!(queue.failed_count().await, 1);
        assert_eq!(queue.purge_finished(Duration::from_secs(3600)).await.unwrap(), 1);
        assert_eq!(queue.failed_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_list_is_bounded() {
        let queue = InMemoryJobQueue::new(1);
        for _ in 0..MAX_FAILED_JOBS + 5 {
            queue.enqueue(PUSH_JOB, json!({})).await.unwrap();
            let job = queue.dequeue(PUSH_JOB).await.unwrap().unwrap();
            queue.fail(job.id, "undecodable").await.unwrap();
        }

        assert_eq!(queue.failed_count().await, MAX_FAILED_JOBS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_stale_requeues_abandoned_claims() {
        let queue = InMemoryJobQueue::new(3);
        queue.enqueue(PUSH_JOB, json!({})).await.unwrap();
        let job = queue.dequeue(PUSH_JOB).await.unwrap().unwrap();

        assert_eq!(queue.release_stale(Duration::from_secs(60)).await.unwrap(), 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(queue.release_stale(Duration::from_secs(60)).await.unwrap(), 1);

        let again = queue.dequeue(PUSH_JOB).await.unwrap().unwrap();
        assert_eq!(again.id, job.id);
        assert_eq!(again.attempts, 2);
    }
}
