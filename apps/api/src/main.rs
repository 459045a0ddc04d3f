//! JIT credential broker API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod api_services;
mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use std::sync::Arc;
use std::time::Instant;

use jitbroker_application::DeferredTasks;
use jitbroker_core::AppError;
use tracing::{info, warn};

use crate::api_config::{ApiConfig, CLEANUP_INTERVAL, CLEANUP_MAX_AGE, init_tracing};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = ApiConfig::load()?;
    init_tracing();

    let tasks = DeferredTasks::new();
    let services = api_services::build_services(&config, &tasks)?;

    services.vault.authenticate().await?;

    if let Some(webhook_url) = &config.telegram_webhook_url
        && let Err(error) = services
            .notifier
            .set_webhook(webhook_url, &config.telegram_webhook_secret)
            .await
    {
        warn!(error = %error, "telegram webhook registration failed");
    }

    let maintenance = services.approval_service.clone();
    tasks.spawn_every("store_cleanup", CLEANUP_INTERVAL, move || {
        let maintenance = maintenance.clone();
        async move {
            if let Err(error) = maintenance.run_maintenance(CLEANUP_MAX_AGE).await {
                warn!(error = %error, "store cleanup failed");
            }
        }
    });

    let app = api_router::build_router(AppState {
        approval_service: services.approval_service,
        api_key: Arc::from(config.api_key.as_str()),
        webhook_secret: Arc::from(config.telegram_webhook_secret.as_str()),
        approver_chat_id: config.telegram_chat_id,
        started_at: Instant::now(),
    });

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(
        address = %config.listen_addr,
        allowed_requesters = ?config.allowed_requesters,
        request_timeout_seconds = config.request_timeout.as_secs(),
        "jitbroker-api listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(tasks))
        .await
        .map_err(|error| AppError::Internal(format!("api server error: {error}")))?;

    info!("jitbroker-api stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM and cancels every background timer.
async fn shutdown_signal(tasks: DeferredTasks) {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(error = %error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                warn!(error = %error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received");
    tasks.shutdown();
}
