use anyhow::{bail, Context};
use std::{str::FromStr, sync::Arc, time::Duration};

use crate::{
    auth::IdentityVerifier,
    db::DbPool,
    message::{InMemoryMessageStore, MessageRepository, MessageService, MessageStore},
    notification::{
        InMemoryNotificationStore, NotificationRepository, NotificationService, NotificationStore,
    },
    push::{InMemorySubscriptionStore, PushSubscriptionRepository, SubscriptionStore, VapidConfig},
    queue::{InMemoryJobQueue, JobQueue, PgJobQueue},
    websocket::PresenceRegistry,
};

#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<dyn IdentityVerifier>,
    pub presence: PresenceRegistry,
    pub message_service: MessageService,
    pub notification_service: NotificationService,
    pub subscriptions: Arc<dyn SubscriptionStore>,
}

impl AppState {
    pub fn new(config: &Config, identity: Arc<dyn IdentityVerifier>, stores: &Stores) -> Self {
        let presence = PresenceRegistry::new();
        let notification_service = NotificationService::new(
            stores.notifications.clone(),
            presence.clone(),
            stores.queue.clone(),
        );
        let message_service = MessageService::new(
            stores.messages.clone(),
            presence.clone(),
            notification_service.clone(),
            config.conversation_max_limit,
        );

        Self {
            identity,
            presence,
            message_service,
            notification_service,
            subscriptions: stores.subscriptions.clone(),
        }
    }
}

/// Backing stores, Postgres or process-local
#[derive(Clone)]
pub struct Stores {
    pub messages: Arc<dyn MessageStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub queue: Arc<dyn JobQueue>,
}

impl Stores {
    pub fn postgres(pool: DbPool, job_max_attempts: i32) -> Self {
        Self {
            messages: Arc::new(MessageRepository::new(pool.clone())),
            notifications: Arc::new(NotificationRepository::new(pool.clone())),
            subscriptions: Arc::new(PushSubscriptionRepository::new(pool.clone())),
            queue: Arc::new(PgJobQueue::new(pool, job_max_attempts)),
        }
    }

    pub fn in_memory(job_max_attempts: i32) -> Self {
        Self {
            messages: Arc::new(InMemoryMessageStore::new()),
            notifications: Arc::new(InMemoryNotificationStore::new()),
            subscriptions: Arc::new(InMemorySubscriptionStore::new()),
            queue: Arc::new(InMemoryJobQueue::new(job_max_attempts)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    /// Push delivery is disabled without a complete key pair and subject
    pub vapid: Option<VapidConfig>,
    pub push_ttl_seconds: u64,
    pub worker_concurrency: usize,
    pub worker_poll_interval: Duration,
    pub job_max_attempts: i32,
    pub job_stale_after: Duration,
    /// How long completed and failed jobs are kept
    pub job_retention: Duration,
    pub conversation_max_limit: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = var("JWT_SECRET").context("JWT_SECRET must be set")?;

        let vapid = match (
            var("VAPID_PUBLIC_KEY"),
            var("VAPID_PRIVATE_KEY"),
            var("VAPID_SUBJECT"),
        ) {
            (Some(public_key), Some(private_key), Some(subject)) => Some(VapidConfig {
                public_key,
                private_key,
                subject,
            }),
            _ => None,
        };

        let worker_concurrency: usize = parse_or(&var, "WORKER_CONCURRENCY", 4)?;
        if worker_concurrency == 0 {
            bail!("WORKER_CONCURRENCY must be at least 1");
        }
        let job_max_attempts: i32 = parse_or(&var, "JOB_MAX_ATTEMPTS", 3)?;
        if job_max_attempts < 1 {
            bail!("JOB_MAX_ATTEMPTS must be at least 1");
        }
        let conversation_max_limit: i64 = parse_or(&var, "CONVERSATION_MAX_LIMIT", 100)?;
        if conversation_max_limit < 1 {
            bail!("CONVERSATION_MAX_LIMIT must be at least 1");
        }

        Ok(Self {
            jwt_secret,
            database_url: var("DATABASE_URL"),
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&var, "PORT", 3000)?,
            vapid,
            push_ttl_seconds: parse_or(&var, "PUSH_TTL_SECONDS", 2_419_200)?,
            worker_concurrency,
            worker_poll_interval: Duration::from_millis(parse_or(
                &var,
                "WORKER_POLL_INTERVAL_MS",
                1000,
            )?),
            job_max_attempts,
            job_stale_after: Duration::from_secs(parse_or(&var, "JOB_STALE_AFTER_SECONDS", 300)?),
            job_retention: Duration::from_secs(parse_or(&var, "JOB_RETENTION_SECONDS", 604_800)?),
            conversation_max_limit,
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} must be a number: {}", key, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::JwtIdentityVerifier;
    use std::collections::HashMap;

    pub(crate) const TEST_SECRET: &str = "test-secret";

    pub(crate) fn test_config() -> Config {
        Config::from_lookup(|key| (key == "JWT_SECRET").then(|| TEST_SECRET.to_string())).unwrap()
    }

    pub(crate) fn in_memory_state() -> AppState {
        let config = test_config();
        let identity = Arc::new(JwtIdentityVerifier::new(config.jwt_secret.clone()));
        AppState::new(&config, identity, &Stores::in_memory(3))
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = test_config();

        assert_eq!(config.database_url, None);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert!(config.vapid.is_none());
        assert_eq!(config.push_ttl_seconds, 2_419_200);
        assert_eq!(config.worker_concurrency, 4);
        assert_eq!(config.worker_poll_interval, Duration::from_millis(1000));
        assert_eq!(config.job_max_attempts, 3);
        assert_eq!(config.job_stale_after, Duration::from_secs(300));
        assert_eq!(config.job_retention, Duration::from_secs(604_800));
        assert_eq!(config.conversation_max_limit, 100);
    }

    #[test]
    fn test_jwt_secret_is_required() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("JWT_SECRET", "  ")])).is_err());
    }

    #[test]
    fn test_vapid_needs_all_three_values() {
        let partial = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s"),
            ("VAPID_PUBLIC_KEY", "pub"),
            ("VAPID_PRIVATE_KEY", "priv"),
        ]))
        .unwrap();
        assert!(partial.vapid.is_none());

        let full = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s"),
            ("VAPID_PUBLIC_KEY", "pub"),
            ("VAPID_PRIVATE_KEY", "priv"),
            ("VAPID_SUBJECT", "mailto:ops@example.com"),
        ]))
        .unwrap();
        assert_eq!(full.vapid.unwrap().subject, "mailto:ops@example.com");
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        assert!(Config::from_lookup(lookup(&[("JWT_SECRET", "s"), ("PORT", "http")])).is_err());
        assert!(
            Config::from_lookup(lookup(&[("JWT_SECRET", "s"), ("WORKER_CONCURRENCY", "0")]))
                .is_err()
        );
    }
}
