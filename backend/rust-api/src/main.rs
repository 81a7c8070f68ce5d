use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;

use studytrack_notifier::{
    config::Config,
    create_router,
    services::{
        connect_mongo,
        email_service::{EmailTransport, SmtpEmailTransport},
        notification_dispatcher::NotificationDispatcher,
        scheduler::{ScheduleTable, Scheduler},
        user_store::{MongoUserStore, UserStore},
        AppState,
    },
    telemetry,
    utils::clock::{Clock, SystemClock},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let telemetry = telemetry::init("studytrack-notifier")?;

    let config = Config::load().context("Failed to load configuration")?;
    tracing::info!(
        "Configuration loaded for environment: {:?}",
        std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string())
    );

    let offset = config
        .scheduler
        .utc_offset()
        .context("Invalid scheduler.utc_offset_minutes")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(offset));

    let mongo_client = connect_mongo(&config).await?;
    let store: Arc<dyn UserStore> = Arc::new(MongoUserStore::new(
        mongo_client.database(&config.database.mongo_database),
    ));

    if SmtpEmailTransport::sending_disabled() {
        tracing::warn!("EMAIL_SEND_DISABLED is set, every delivery will be refused");
    }
    let transport: Arc<dyn EmailTransport> = Arc::new(SmtpEmailTransport::new(&config.email)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher = Arc::new(
        NotificationDispatcher::new(
            store,
            transport,
            Arc::clone(&clock),
            config.email.from_email.clone(),
            config.email.admin_email.clone(),
        )?
        .with_shutdown(shutdown_rx.clone()),
    );

    if let Some(addr) = config.metrics.listen_addr {
        let app_state = Arc::new(AppState::new(config.clone(), mongo_client.clone()));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind operations endpoint on {addr}"))?;
        tracing::info!("Operations endpoint listening on {}", addr);

        let mut server_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let server = axum::serve(listener, create_router(app_state)).with_graceful_shutdown(
                async move {
                    let _ = server_shutdown.wait_for(|stop| *stop).await;
                },
            );
            if let Err(e) = server.await {
                tracing::error!(error = %e, "Operations endpoint failed");
            }
        });
    }

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                // a dropped sender would stop the scheduler
                let _sender = shutdown_tx;
                std::future::pending::<()>().await
            }
        }
    });

    let mut scheduler = Scheduler::new(
        ScheduleTable::standard(&config.scheduler),
        dispatcher,
        clock,
        &config.scheduler,
    );
    scheduler.run(shutdown_rx).await;

    telemetry.shutdown();
    Ok(())
}
