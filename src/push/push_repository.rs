use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

use super::push_models::{PushSubscription, SubscriptionKeys};

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert, or refresh the keys of an existing (user, endpoint) pair.
    async fn upsert(
        &self,
        user_id: Uuid,
        endpoint: &str,
        keys: &SubscriptionKeys,
    ) -> Result<PushSubscription>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<PushSubscription>>;

    async fn delete(&self, id: Uuid) -> Result<u64>;

    async fn delete_by_endpoint(&self, user_id: Uuid, endpoint: &str) -> Result<u64>;
}

#[derive(Clone)]
pub struct PushSubscriptionRepository {
    pool: PgPool,
}

impl PushSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PushSubscriptionRepository {
    async fn upsert(
        &self,
        user_id: Uuid,
        endpoint: &str,
        keys: &SubscriptionKeys,
    ) -> Result<PushSubscription> {
        let subscription = sqlx::query_as::<_, PushSubscription>(
            "INSERT INTO push_subscriptions (user_id, endpoint, p256dh, auth)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id, endpoint)
             DO UPDATE SET p256dh = EXCLUDED.p256dh, auth = EXCLUDED.auth, updated_at = NOW()
             RETURNING *",
        )
        .bind(user_id)
        .bind(endpoint)
        .bind(&keys.p256dh)
        .bind(&keys.auth)
        .fetch_one(&self.pool)
        .await?;

        Ok(subscription)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<PushSubscription>> {
        let subscriptions = sqlx::query_as::<_, PushSubscription>(
            "SELECT * FROM push_subscriptions WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(subscriptions)
    }

    async fn delete(&self, id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_by_endpoint(&self, user_id: Uuid, endpoint: &str) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM push_subscriptions WHERE user_id = $1 AND endpoint = $2")
                .bind(user_id)
                .bind(endpoint)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}
