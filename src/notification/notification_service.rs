use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    push::push_models::DeliveryJob,
    queue::{JobQueue, PUSH_JOB},
    websocket::{presence::PresenceRegistry, types::ServerEvent},
};

use super::{
    notification_models::{Notification, NotificationKind},
    notification_repository::NotificationStore,
};

/// Persists notifications and fans them out to live sessions and the push queue.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    presence: PresenceRegistry,
    queue: Arc<dyn JobQueue>,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        presence: PresenceRegistry,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            store,
            presence,
            queue,
        }
    }

    /// Only the insert can fail the call. The live emit and the push enqueue
    /// are best-effort.
    pub async fn create_notification(
        &self,
        recipient_id: Uuid,
        actor_id: Option<Uuid>,
        kind: NotificationKind,
    ) -> Result<Notification> {
        let notification = self.store.create(recipient_id, actor_id, &kind).await?;

        let delivered = self.presence.emit(
            &recipient_id,
            ServerEvent::Notification((&notification).into()),
        );
        debug!(
            "Notification {} emitted to {} live connection(s)",
            notification.id, delivered
        );

        if let Err(e) = self.enqueue_push(&notification).await {
            warn!(
                "Failed to enqueue push for notification {}: {}",
                notification.id, e
            );
        }

        Ok(notification)
    }

    async fn enqueue_push(&self, notification: &Notification) -> Result<()> {
        let job = serde_json::to_value(DeliveryJob::from(notification))?;
        self.queue.enqueue(PUSH_JOB, job).await?;
        Ok(())
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        self.store.find_all_by_user(user_id).await
    }

    pub async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<Notification> {
        self.store
            .mark_as_read(id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))
    }

    pub async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<()> {
        if self.store.delete(id, user_id).await? == 0 {
            return Err(AppError::NotFound("Notification not found".to_string()));
        }
        Ok(())
    }
}
