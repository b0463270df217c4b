mod auth;
mod db;
mod error;
mod message;
mod middleware;
mod notification;
mod push;
mod queue;
mod routes;
mod state;
mod websocket;

use anyhow::Context;
use auth::JwtIdentityVerifier;
use db::{create_pool, run_migrations};
use push::{start_job_reaper, PushWorker, WebPushSender, WorkerSettings};
use routes::create_router;
use state::{AppState, Config, Stores};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,social_gateway=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let stores = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let db = create_pool(database_url)
                .await
                .context("connecting to database")?;

            tracing::info!("Running migrations...");
            run_migrations(&db).await.context("running migrations")?;

            Stores::postgres(db, config.job_max_attempts)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory stores, nothing survives a restart");
            Stores::in_memory(config.job_max_attempts)
        }
    };

    let identity = Arc::new(JwtIdentityVerifier::new(config.jwt_secret.clone()));
    let state = AppState::new(&config, identity, &stores);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start push delivery
    let worker_handle = match &config.vapid {
        Some(vapid) => {
            let sender = WebPushSender::new(vapid, config.push_ttl_seconds)
                .context("loading VAPID keys")?;
            let worker = Arc::new(PushWorker::new(
                stores.queue.clone(),
                stores.subscriptions.clone(),
                Arc::new(sender),
                WorkerSettings {
                    concurrency: config.worker_concurrency,
                    poll_interval: config.worker_poll_interval,
                },
            ));
            Some(tokio::spawn(worker.run(shutdown_rx.clone())))
        }
        None => {
            tracing::warn!("VAPID keys not configured; push worker disabled, jobs stay queued");
            None
        }
    };

    let mut reaper = start_job_reaper(
        stores.queue.clone(),
        config.job_stale_after,
        config.job_retention,
    )
    .await
    .context("starting job reaper")?;

    // Create router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            tracing::error!("Push worker task failed: {}", e);
        }
    }
    if let Err(e) = reaper.shutdown().await {
        tracing::error!("Failed to stop job reaper: {:?}", e);
    }

    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down...");
    let _ = shutdown_tx.send(true);
}
