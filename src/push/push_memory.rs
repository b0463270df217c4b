use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

use super::{
    push_models::{PushSubscription, SubscriptionKeys},
    push_repository::SubscriptionStore,
};

#[derive(Default)]
pub struct InMemorySubscriptionStore {
    subscriptions: RwLock<Vec<PushSubscription>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn upsert(
        &self,
        user_id: Uuid,
        endpoint: &str,
        keys: &SubscriptionKeys,
    ) -> Result<PushSubscription> {
        let mut subscriptions = self.subscriptions.write().await;
        let now = Utc::now();

        if let Some(existing) = subscriptions
            .iter_mut()
            .find(|s| s.user_id == user_id && s.endpoint == endpoint)
        {
            existing.p256dh = keys.p256dh.clone();
            existing.auth = keys.auth.clone();
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let subscription = PushSubscription {
            id: Uuid::new_v4(),
            user_id,
            endpoint: endpoint.to_string(),
            p256dh: keys.p256dh.clone(),
            auth: keys.auth.clone(),
            created_at: now,
            updated_at: now,
        };
        subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<PushSubscription>> {
        Ok(self
            .subscriptions
            .read()
            .await
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<u64> {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        Ok((before - subscriptions.len()) as u64)
    }

    async fn delete_by_endpoint(&self, user_id: Uuid, endpoint: &str) -> Result<u64> {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| !(s.user_id == user_id && s.endpoint == endpoint));
        Ok((before - subscriptions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(p256dh: &str) -> SubscriptionKeys {
        SubscriptionKeys {
            p256dh: p256dh.to_string(),
            auth: "auth".to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_refreshes_keys_for_same_endpoint() {
        let store = InMemorySubscriptionStore::new();
        let user = Uuid::new_v4();

        let first = store.upsert(user, "https://push.example/a", &keys("k1")).await.unwrap();
        let second = store.upsert(user, "https://push.example/a", &keys("k2")).await.unwrap();

        assert_eq!(first.id, second.id);
        let all = store.list_for_user(user).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].p256dh, "k2");
    }

    #[tokio::test]
    async fn test_same_endpoint_for_different_users_is_kept_apart() {
        let store = InMemorySubscriptionStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        store.upsert(alice, "https://push.example/shared", &keys("a")).await.unwrap();
        store.upsert(bob, "https://push.example/shared", &keys("b")).await.unwrap();

        assert_eq!(store.delete_by_endpoint(alice, "https://push.example/shared").await.unwrap(), 1);
        assert!(store.list_for_user(alice).await.unwrap().is_empty());
        assert_eq!(store.list_for_user(bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_zero() {
        let store = InMemorySubscriptionStore::new();
        assert_eq!(store.delete(Uuid::new_v4()).await.unwrap(), 0);
        assert_eq!(
            store.delete_by_endpoint(Uuid::new_v4(), "https://nope").await.unwrap(),
            0
        );
    }
}
