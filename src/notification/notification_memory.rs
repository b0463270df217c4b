use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

use super::{
    notification_models::{Notification, NotificationKind},
    notification_repository::NotificationStore,
};

#[derive(Default)]
pub struct InMemoryNotificationStore {
    notifications: RwLock<Vec<Notification>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn create(
        &self,
        recipient_id: Uuid,
        actor_id: Option<Uuid>,
        kind: &NotificationKind,
    ) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id,
            actor_id,
            kind: kind.clone(),
            read: false,
            created_at: Utc::now(),
        };

        self.notifications.write().await.push(notification.clone());
        Ok(notification)
    }

    async fn find_all_by_user(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        let notifications = self.notifications.read().await;

        Ok(notifications
            .iter()
            .rev()
            .filter(|n| n.recipient_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_as_read(&self, id: Uuid, user_id: Uuid) -> Result<Option<Notification>> {
        let mut notifications = self.notifications.write().await;

        Ok(notifications
            .iter_mut()
            .find(|n| n.id == id && n.recipient_id == user_id)
            .map(|n| {
                n.read = true;
                n.clone()
            }))
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<u64> {
        let mut notifications = self.notifications.write().await;
        let before = notifications.len();
        notifications.retain(|n| !(n.id == id && n.recipient_id == user_id));

        Ok((before - notifications.len()) as u64)
    }
}
