use futures::future::join_all;
use std::{sync::Arc, time::Duration};
use tokio::sync::{watch, Semaphore};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{debug, error, info, warn};

use crate::{
    error::Result,
    queue::{JobQueue, QueuedJob, PUSH_JOB},
};

use super::{
    push_models::{DeliveryJob, PushEnvelope, PushSubscription},
    push_repository::SubscriptionStore,
    sender::{PushError, PushSender},
    template,
};

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub concurrency: usize,
    pub poll_interval: Duration,
}

/// Tally of one job's endpoint attempts
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub delivered: usize,
    pub pruned: usize,
    pub failed: usize,
}

enum Outcome {
    Delivered,
    Pruned,
    Failed,
}

pub struct PushWorker {
    queue: Arc<dyn JobQueue>,
    subscriptions: Arc<dyn SubscriptionStore>,
    sender: Arc<dyn PushSender>,
    settings: WorkerSettings,
}

impl PushWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        subscriptions: Arc<dyn SubscriptionStore>,
        sender: Arc<dyn PushSender>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            subscriptions,
            sender,
            settings,
        }
    }

    /// Deliver one notification to every endpoint of its recipient.
    ///
    /// Endpoint failures never fail the job; only a failure to load
    /// subscriptions does.
    pub async fn process(&self, job: &DeliveryJob) -> Result<DeliveryReport> {
        let subscriptions = self.subscriptions.list_for_user(job.recipient_id).await?;
        if subscriptions.is_empty() {
            debug!("No push subscriptions for user {}", job.recipient_id);
            return Ok(DeliveryReport::default());
        }

        let content = template::render(job);
        let payload = serde_json::to_vec(&PushEnvelope::new(&content, job))?;

        let outcomes = join_all(
            subscriptions
                .iter()
                .map(|subscription| self.deliver(subscription, &payload)),
        )
        .await;

        let mut report = DeliveryReport {
            attempted: outcomes.len(),
            ..DeliveryReport::default()
        };
        for outcome in outcomes {
            match outcome {
                Outcome::Delivered => report.delivered += 1,
                Outcome::Pruned => report.pruned += 1,
                Outcome::Failed => report.failed += 1,
            }
        }

        Ok(report)
    }

    async fn deliver(&self, subscription: &PushSubscription, payload: &[u8]) -> Outcome {
        match self.sender.send(subscription, payload).await {
            Ok(()) => Outcome::Delivered,
            Err(PushError::Gone(status)) => {
                info!(
                    "Pruning push subscription {} (HTTP {})",
                    subscription.id, status
                );
                match self.subscriptions.delete(subscription.id).await {
                    Ok(_) => Outcome::Pruned,
                    Err(e) => {
                        error!(
                            "Failed to prune push subscription {}: {}",
                            subscription.id, e
                        );
                        Outcome::Failed
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Push to subscription {} failed: {}",
                    subscription.id, e
                );
                Outcome::Failed
            }
        }
    }

    /// Run one claimed job and settle it with the queue.
    pub async fn handle(&self, job: QueuedJob) {
        debug!(
            "Processing job: id={}, type='{}', attempt={}",
            job.id, job.job_type, job.attempts
        );

        let delivery: DeliveryJob = match serde_json::from_value(job.payload.clone()) {
            Ok(delivery) => delivery,
            Err(e) => {
                error!("Discarding undecodable push job {}: {}", job.id, e);
                if let Err(e) = self.queue.fail(job.id, &e.to_string()).await {
                    error!("Failed to mark job {} as failed: {}", job.id, e);
                }
                return;
            }
        };

        match self.process(&delivery).await {
            Ok(report) => {
                info!(
                    "Push job {} completed: attempted={}, delivered={}, pruned={}, failed={}",
                    job.id, report.attempted, report.delivered, report.pruned, report.failed
                );
                if let Err(e) = self.queue.ack(job.id).await {
                    error!("Failed to ack job {}: {}", job.id, e);
                }
            }
            Err(e) => {
                warn!("Push job {} attempt {} failed: {}", job.id, job.attempts, e);
                if let Err(e) = self.queue.retry(job.id, &e.to_string()).await {
                    error!("Failed to reschedule job {}: {}", job.id, e);
                }
            }
        }
    }

    /// Poll for push jobs until the shutdown flag changes, then wait for
    /// in-flight jobs to settle.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Push worker started with concurrency={}, poll_interval={:?}",
            self.settings.concurrency, self.settings.poll_interval
        );

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency));

        loop {
            let permit = tokio::select! {
                _ = shutdown.changed() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match self.queue.dequeue(PUSH_JOB).await {
                Ok(Some(job)) => {
                    let worker = Arc::clone(&self);
                    tokio::spawn(async move {
                        let _permit = permit;
                        worker.handle(job).await;
                    });
                    continue;
                }
                Ok(None) => {}
                Err(e) => error!("Failed to poll push queue: {}", e),
            }
            drop(permit);

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        info!("Push worker waiting for in-flight jobs...");
        let permits = self.settings.concurrency as u32;
        let _ = tokio::time::timeout(Duration::from_secs(30), semaphore.acquire_many(permits)).await;
        info!("Push worker stopped");
    }
}

/// Every minute, hand jobs claimed by a consumer that died back to the queue
/// and drop finished jobs older than `retention`.
pub async fn start_job_reaper(
    queue: Arc<dyn JobQueue>,
    stale_after: Duration,
    retention: Duration,
) -> std::result::Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async("0 * * * * *", move |_uuid, _l| {
        let queue = Arc::clone(&queue);

        Box::pin(async move {
            reap(queue.as_ref(), stale_after, retention).await;
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    info!("Job reaper started");
    Ok(scheduler)
}

async fn reap(queue: &dyn JobQueue, stale_after: Duration, retention: Duration) {
    match queue.release_stale(stale_after).await {
        Ok(0) => {}
        Ok(n) => info!("Released {} stale job(s)", n),
        Err(e) => error!("Error releasing stale jobs: {:?}", e),
    }

    match queue.purge_finished(retention).await {
        Ok(0) => {}
        Ok(n) => info!("Purged {} finished job(s)", n),
        Err(e) => error!("Error purging finished jobs: {:?}", e),
    }
}
