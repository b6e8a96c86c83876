use identity_service::{
    build_router,
    config::{Environment, IdentityConfig},
    db,
    services::{LogNotifier, Notifier, PendingAccountSweeper, PgAccountStore, PgPolicyStore, SmtpNotifier},
    AppState,
};
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let store = Arc::new(PgAccountStore::new(pool.clone()));
    let policy_store = Arc::new(PgPolicyStore::new(pool));

    let notifier: Arc<dyn Notifier> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpNotifier::new(smtp, config.frontend.clone())?),
        None => {
            tracing::warn!("SMTP not configured; notifications will only be logged");
            Arc::new(LogNotifier::new(
                config.frontend.clone(),
                config.environment == Environment::Dev,
            ))
        }
    };

    let sweeper = Arc::new(PendingAccountSweeper::new(
        store.clone(),
        config.lifecycle.cleanup_interval,
        config.lifecycle.confirmation_ttl(),
    ));
    let sweeper_handle = sweeper.start();

    let state = AppState::new(config.clone(), store, policy_store, notifier);
    let app = build_router(state);

    let addr = config.common.socket_addr();
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.shutdown();
    if tokio::time::timeout(config.common.shutdown_grace(), sweeper_handle)
        .await
        .is_err()
    {
        tracing::warn!("Pending account sweeper did not stop within the grace period");
    }

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
