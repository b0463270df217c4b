use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::error::Result;

use super::notification_models::{Notification, NotificationKind, NotificationRow};

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(
        &self,
        recipient_id: Uuid,
        actor_id: Option<Uuid>,
        kind: &NotificationKind,
    ) -> Result<Notification>;

    /// Newest first
    async fn find_all_by_user(&self, user_id: Uuid) -> Result<Vec<Notification>>;

    async fn mark_as_read(&self, id: Uuid, user_id: Uuid) -> Result<Option<Notification>>;

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<u64>;
}

#[derive(Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for NotificationRepository {
    async fn create(
        &self,
        recipient_id: Uuid,
        actor_id: Option<Uuid>,
        kind: &NotificationKind,
    ) -> Result<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(
            "INSERT INTO notifications (recipient_id, actor_id, kind, payload)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(recipient_id)
        .bind(actor_id)
        .bind(kind.type_name())
        .bind(Json(kind.payload()))
        .fetch_one(&self.pool)
        .await?;

        Ok(Notification::try_from(row)?)
    }

    async fn find_all_by_user(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT * FROM notifications WHERE recipient_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let notifications = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                Notification::try_from(row)
                    .map_err(|e| tracing::warn!("Skipping unreadable notification {}: {}", id, e))
                    .ok()
            })
            .collect();

        Ok(notifications)
    }

    async fn mark_as_read(&self, id: Uuid, user_id: Uuid) -> Result<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(
            "UPDATE notifications SET read = true WHERE id = $1 AND recipient_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Notification::try_from).transpose()?)
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND recipient_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
