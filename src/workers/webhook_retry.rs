use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::WebhookConfig;
use crate::services::webhook_processor::{RetrySummary, WebhookProcessor};

/// Periodically re-dispatches webhook events whose processing failed.
pub struct WebhookRetryWorker {
    processor: Arc<WebhookProcessor>,
    interval: Duration,
    batch_size: i64,
    max_retries: i32,
}

impl WebhookRetryWorker {
    pub fn new(processor: Arc<WebhookProcessor>, config: &WebhookConfig) -> Self {
        Self {
            processor,
            interval: Duration::from_secs(config.retry_interval_secs),
            batch_size: config.batch_size,
            max_retries: config.max_retries,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            max_retries = self.max_retries,
            "Webhook retry worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Webhook retry worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {
                    self.run_cycle().await;
                }
            }
        }

        info!("Webhook retry worker stopped");
    }

    pub async fn run_cycle(&self) -> Option<RetrySummary> {
        match self
            .processor
            .retry_pending(self.batch_size, self.max_retries)
            .await
        {
            Ok(summary) => {
                if summary.attempted > 0 {
                    info!(
                        attempted = summary.attempted,
                        succeeded = summary.succeeded,
                        failed = summary.failed,
                        "Retried pending webhooks"
                    );
                }
                Some(summary)
            }
            Err(e) => {
                error!(error = %e, "Failed to retry pending webhooks");
                None
            }
        }
    }
}
