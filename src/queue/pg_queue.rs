use async_trait::async_trait;
use serde_json::Value;
use sqlx::{types::Json, FromRow, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;

use super::{retry_backoff, JobQueue, QueuedJob};

/// Queue backed by the `jobs` table. Claims use `FOR UPDATE SKIP LOCKED`,
/// so several consumers can poll the same table.
#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
    max_attempts: i32,
}

#[derive(FromRow)]
struct JobRow {
    id: Uuid,
    job_type: String,
    payload: Json<Value>,
    attempts: i32,
}

impl PgJobQueue {
    pub fn new(pool: PgPool, max_attempts: i32) -> Self {
        Self { pool, max_attempts }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job_type: &str, payload: Value) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO jobs (job_type, payload, max_attempts)
             VALUES ($1, $2, $3)
             RETURNING id",
        )
        .bind(job_type)
        .bind(Json(payload))
        .bind(self.max_attempts)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!("Enqueued job: id={}, type='{}'", id, job_type);
        Ok(id)
    }

    async fn dequeue(&self, job_type: &str) -> Result<Option<QueuedJob>> {
        let row = sqlx::query_as::<_, JobRow>(
            "UPDATE jobs
             SET status = 'processing', attempts = attempts + 1,
                 locked_at = NOW(), updated_at = NOW()
             WHERE id = (
                 SELECT id FROM jobs
                 WHERE job_type = $1 AND status = 'pending' AND run_at <= NOW()
                 ORDER BY created_at
                 FOR UPDATE SKIP LOCKED
                 LIMIT 1
             )
             RETURNING id, job_type, payload, attempts",
        )
        .bind(job_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| QueuedJob {
            id: row.id,
            job_type: row.job_type,
            payload: row.payload.0,
            attempts: row.attempts,
        }))
    }

    async fn ack(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'completed', locked_at = NULL, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn retry(&self, job_id: Uuid, error: &str) -> Result<()> {
        let attempts: Option<i32> =
            sqlx::query_scalar("SELECT attempts FROM jobs WHERE id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;
        let backoff = retry_backoff(attempts.unwrap_or(1));

        sqlx::query(
            "UPDATE jobs
             SET status = CASE WHEN attempts >= max_attempts THEN 'failed' ELSE 'pending' END,
                 last_error = $2,
                 run_at = NOW() + ($3::bigint * INTERVAL '1 second'),
                 locked_at = NULL,
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(error)
        .bind(backoff.as_secs() as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'failed', last_error = $2, locked_at = NULL, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn release_stale(&self, older_than: Duration) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'pending', locked_at = NULL, updated_at = NOW()
             WHERE status = 'processing'
               AND locked_at < NOW() - ($1::bigint * INTERVAL '1 second')",
        )
        .bind(older_than.as_secs() as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn purge_finished(&self, older_than: Duration) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM jobs
             WHERE status IN ('completed', 'failed')
               AND updated_at < NOW() - ($1::bigint * INTERVAL '1 second')",
        )
        .bind(older_than.as_secs() as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
