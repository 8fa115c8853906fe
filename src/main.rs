use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use voguevault_payments::api::{self, AppState};
use voguevault_payments::auth::JwtVerifier;
use voguevault_payments::config::AppConfig;
use voguevault_payments::database::{
    init_pool_from_config, order_repository::OrderRepository,
    payment_method_repository::PaymentMethodRepository, payment_repository::PaymentRepository,
    webhook_repository::WebhookRepository,
};
use voguevault_payments::health::{DatabaseProbe, HealthChecker};
use voguevault_payments::logging::init_tracing;
use voguevault_payments::payments::{PaymentGateway, PaystackProvider};
use voguevault_payments::services::notification::NotificationService;
use voguevault_payments::services::{OrchestratorConfig, PaymentOrchestrator, WebhookProcessor};
use voguevault_payments::workers::webhook_retry::WebhookRetryWorker;

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        "Starting VogueVault payments service"
    );

    let db_pool = init_pool_from_config(&config.database).await?;
    info!(
        max_connections = db_pool.options().get_max_connections(),
        "Database connection pool initialized"
    );

    let gateway: Arc<dyn PaymentGateway> = Arc::new(PaystackProvider::new(config.paystack.clone())?);
    let payments = Arc::new(PaymentRepository::new(db_pool.clone()));
    let methods = Arc::new(PaymentMethodRepository::new(db_pool.clone()));
    let orders = Arc::new(OrderRepository::new(db_pool.clone()));
    let webhook_logs = Arc::new(WebhookRepository::new(db_pool.clone()));

    let orchestrator = Arc::new(PaymentOrchestrator::new(
        gateway.clone(),
        payments.clone(),
        methods,
        orders,
        Arc::new(NotificationService::new()),
        OrchestratorConfig::new(config.server.default_callback_url()),
    ));
    let webhook_processor = Arc::new(WebhookProcessor::new(
        gateway,
        webhook_logs,
        payments,
        orchestrator.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let retry_handle = if config.webhooks.retry_enabled {
        let worker = WebhookRetryWorker::new(webhook_processor.clone(), &config.webhooks);
        info!("Webhook retry worker enabled");
        Some(tokio::spawn(worker.run(shutdown_rx)))
    } else {
        warn!("Webhook retry worker disabled (WEBHOOK_RETRY_ENABLED=false)");
        None
    };

    let state = AppState {
        orchestrator,
        webhooks: webhook_processor,
        jwt: JwtVerifier::new(&config.auth.jwt_secret),
        health: HealthChecker::new(vec![Arc::new(DatabaseProbe::new(db_pool.clone()))]),
        max_webhook_retries: config.webhooks.max_retries,
    };
    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(shutdown_tx.clone()))
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = retry_handle {
        if tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .is_err()
        {
            error!("Timed out waiting for webhook retry worker shutdown");
        }
    }

    db_pool.close().await;
    info!("Server shutdown complete");

    Ok(())
}
