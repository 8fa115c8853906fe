use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::payment_repository::Refund;
use crate::database::repository::{NewWebhookLog, PaymentStore, WebhookLogStore};
use crate::database::webhook_repository::WebhookLog;
use crate::error::{AppError, AuthError, DomainError, ValidationError};
use crate::payments::provider::PaymentGateway;
use crate::services::payment_orchestrator::PaymentOrchestrator;
use crate::services::webhook_events::{GatewayEvent, RawWebhookEvent, RefundNotice};

#[derive(Debug, Error)]
pub enum WebhookProcessorError {
    #[error("Webhook signature is missing")]
    MissingSignature,
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Webhook log not found: {0}")]
    LogNotFound(Uuid),
    #[error("Webhook log {log_id} already retried {retry_count} times")]
    MaxRetriesExceeded { log_id: Uuid, retry_count: i32 },
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Processing error: {0}")]
    Processing(AppError),
}

impl From<WebhookProcessorError> for AppError {
    fn from(err: WebhookProcessorError) -> Self {
        match err {
            WebhookProcessorError::MissingSignature => {
                AppError::validation(ValidationError::MissingField {
                    field: "x-paystack-signature".to_string(),
                })
            }
            WebhookProcessorError::InvalidSignature(reason) => {
                AppError::auth(AuthError::InvalidSignature { reason })
            }
            WebhookProcessorError::MalformedPayload(reason) => {
                AppError::validation(ValidationError::InvalidField {
                    field: "body".to_string(),
                    reason,
                })
            }
            WebhookProcessorError::LogNotFound(id) => {
                AppError::domain(DomainError::WebhookLogNotFound {
                    log_id: id.to_string(),
                })
            }
            WebhookProcessorError::MaxRetriesExceeded {
                log_id,
                retry_count,
            } => AppError::domain(DomainError::MaxRetriesExceeded {
                log_id: log_id.to_string(),
                retry_count,
            }),
            WebhookProcessorError::Database(e) => e.into(),
            WebhookProcessorError::Processing(e) => e,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookOutcome {
    pub log_id: Uuid,
    pub event_type: String,
    /// Redelivery of an event that had already been handled
    pub duplicate: bool,
    pub payment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RetrySummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Single entry point for gateway notifications: verify, log, dispatch.
pub struct WebhookProcessor {
    gateway: Arc<dyn PaymentGateway>,
    webhooks: Arc<dyn WebhookLogStore>,
    payments: Arc<dyn PaymentStore>,
    orchestrator: Arc<PaymentOrchestrator>,
}

impl WebhookProcessor {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        webhooks: Arc<dyn WebhookLogStore>,
        payments: Arc<dyn PaymentStore>,
        orchestrator: Arc<PaymentOrchestrator>,
    ) -> Self {
        Self {
            gateway,
            webhooks,
            payments,
            orchestrator,
        }
    }

    /// `raw_body` must be the exact bytes the gateway signed.
    pub async fn process_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookProcessorError> {
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(WebhookProcessorError::MissingSignature)?;

        let verification = self
            .gateway
            .verify_webhook(raw_body, signature)
            .map_err(|e| WebhookProcessorError::InvalidSignature(e.to_string()))?;
        if !verification.valid {
            warn!(provider = self.gateway.name(), "Invalid webhook signature");
            return Err(WebhookProcessorError::InvalidSignature(
                verification
                    .reason
                    .unwrap_or_else(|| "signature mismatch".to_string()),
            ));
        }

        let raw = RawWebhookEvent::parse(raw_body)
            .map_err(|e| WebhookProcessorError::MalformedPayload(e.to_string()))?;
        let gateway_event_id = raw.gateway_event_id();

        let (log, inserted) = self
            .webhooks
            .log_event(NewWebhookLog {
                event_type: raw.event.clone(),
                gateway_event_id: gateway_event_id.clone(),
                payment_id: None,
                payload: raw.to_payload(),
            })
            .await?;

        if !inserted && log.processed {
            info!(
                event_type = %raw.event,
                gateway_event_id = gateway_event_id.as_deref().unwrap_or("-"),
                "Webhook already processed"
            );
            return Ok(WebhookOutcome {
                log_id: log.id,
                event_type: raw.event,
                duplicate: true,
                payment_id: log.payment_id,
            });
        }

        match self.dispatch(&raw).await {
            Ok(payment_id) => {
                self.webhooks.mark_processed(log.id, payment_id).await?;
                info!(log_id = %log.id, event_type = %raw.event, "Webhook processed successfully");
                Ok(WebhookOutcome {
                    log_id: log.id,
                    event_type: raw.event,
                    duplicate: false,
                    payment_id,
                })
            }
            Err(e) => {
                warn!(log_id = %log.id, event_type = %raw.event, error = %e, "Webhook processing failed");
                self.webhooks.record_failure(log.id, &e.to_string()).await?;
                Err(WebhookProcessorError::Processing(e))
            }
        }
    }

    /// Re-dispatches a logged event. `Ok(false)` when it was already processed.
    pub async fn retry_event(
        &self,
        log_id: Uuid,
        max_retries: i32,
    ) -> Result<bool, WebhookProcessorError> {
        let log = self
            .webhooks
            .find_log(log_id)
            .await?
            .ok_or(WebhookProcessorError::LogNotFound(log_id))?;

        self.retry_log(log, max_retries).await
    }

    /// Retries every failed event still under the retry ceiling.
    pub async fn retry_pending(
        &self,
        limit: i64,
        max_retries: i32,
    ) -> Result<RetrySummary, WebhookProcessorError> {
        let pending = self.webhooks.list_unprocessed(limit, max_retries).await?;
        let mut summary = RetrySummary::default();

        for log in pending {
            let log_id = log.id;
            summary.attempted += 1;
            match self.retry_log(log, max_retries).await {
                Ok(true) => summary.succeeded += 1,
                Ok(false) => {}
                Err(e) => {
                    summary.failed += 1;
                    debug!(log_id = %log_id, error = %e, "Webhook retry failed");
                }
            }
        }

        Ok(summary)
    }

    async fn retry_log(&self, log: WebhookLog, max_retries: i32) -> Result<bool, WebhookProcessorError> {
        if log.processed {
            return Ok(false);
        }
        if log.retry_count >= max_retries {
            return Err(WebhookProcessorError::MaxRetriesExceeded {
                log_id: log.id,
                retry_count: log.retry_count,
            });
        }

        let result = match serde_json::from_value::<RawWebhookEvent>(log.payload.clone()) {
            Ok(raw) => self.dispatch(&raw).await,
            Err(e) => Err(AppError::validation(ValidationError::InvalidField {
                field: "payload".to_string(),
                reason: e.to_string(),
            })),
        };

        match result {
            Ok(payment_id) => {
                self.webhooks.mark_processed(log.id, payment_id).await?;
                info!(log_id = %log.id, event_type = %log.event_type, attempt = log.retry_count + 1, "Webhook retry succeeded");
                Ok(true)
            }
            Err(e) => {
                let updated = self
                    .webhooks
                    .record_retry_failure(log.id, &e.to_string())
                    .await?;
                warn!(
                    log_id = %log.id,
                    retry_count = updated.retry_count,
                    error = %e,
                    "Webhook retry failed"
                );
                Err(WebhookProcessorError::Processing(e))
            }
        }
    }

    /// One handler per event; returns the local payment the event touched.
    async fn dispatch(&self, raw: &RawWebhookEvent) -> Result<Option<Uuid>, AppError> {
        let event = GatewayEvent::from_raw(raw)?;

        match event {
            GatewayEvent::ChargeSuccess { reference } => {
                info!(reference = %reference, "Processing payment success webhook");
                let confirmation = self.orchestrator.handle_successful_payment(&reference).await?;
                Ok(Some(confirmation.payment.id))
            }
            GatewayEvent::ChargeFailed { reference, reason } => {
                info!(reference = %reference, "Processing payment failure webhook");
                let payment = self
                    .orchestrator
                    .handle_failed_payment(&reference, &reason)
                    .await?;
                Ok(Some(payment.id))
            }
            GatewayEvent::ChargeDispute { reference, reason } => {
                let payment = self.orchestrator.find_payment_by_reference(&reference).await?;
                let disputed = self
                    .payments
                    .mark_payment_disputed(payment.id, reason.as_deref())
                    .await?;
                warn!(payment_id = %disputed.id, reference = %reference, "Payment disputed");
                Ok(Some(disputed.id))
            }
            GatewayEvent::RefundProcessed(notice) => self.settle_refund(&notice, true).await,
            GatewayEvent::RefundFailed(notice) => self.settle_refund(&notice, false).await,
            GatewayEvent::RefundPending(notice) => {
                let payment = self
                    .orchestrator
                    .find_payment_by_reference(&notice.transaction_reference)
                    .await?;
                info!(payment_id = %payment.id, "Refund pending at gateway");
                Ok(Some(payment.id))
            }
            GatewayEvent::Unhandled { event_type } => {
                warn!(event_type = %event_type, "Unknown webhook event type");
                Ok(None)
            }
            other => {
                info!(event = ?other, "Webhook acknowledged");
                Ok(None)
            }
        }
    }

    /// Settles the still-pending refund the notice refers to, if any.
    async fn settle_refund(
        &self,
        notice: &RefundNotice,
        processed: bool,
    ) -> Result<Option<Uuid>, AppError> {
        let payment = self
            .orchestrator
            .find_payment_by_reference(&notice.transaction_reference)
            .await?;
        let refunds = self.payments.list_refunds(payment.id).await?;

        let refund = match match_refund_notice(&refunds, notice) {
            RefundMatch::Pending(refund) => refund,
            RefundMatch::AlreadySettled(refund) => {
                info!(
                    refund_id = %refund.id,
                    status = %refund.status,
                    "Refund notice for an already settled refund"
                );
                return Ok(Some(payment.id));
            }
            RefundMatch::None => {
                info!(payment_id = %payment.id, "No pending refund to settle");
                return Ok(Some(payment.id));
            }
        };

        if processed {
            let settlement = self
                .payments
                .complete_refund(refund.id, notice.gateway_refund_id.as_deref())
                .await?;
            info!(
                refund_id = %refund.id,
                status = %settlement.payment.status,
                "Refund settled from webhook"
            );
        } else {
            let reason = notice.reason.as_deref().unwrap_or("Refund failed at gateway");
            self.payments.fail_refund(refund.id, reason).await?;
            warn!(refund_id = %refund.id, reason, "Refund failed from webhook");
        }

        Ok(Some(payment.id))
    }
}

enum RefundMatch<'a> {
    Pending(&'a Refund),
    AlreadySettled(&'a Refund),
    None,
}

/// Picks the refund a gateway notice refers to.
///
/// A known gateway refund id wins outright, even when that refund is already
/// settled. An unknown id or an amount only matches a pending refund the
/// gateway has not yet given an id. With neither, the sole pending refund is
/// the only acceptable match.
fn match_refund_notice<'a>(refunds: &'a [Refund], notice: &RefundNotice) -> RefundMatch<'a> {
    if let Some(gateway_id) = notice.gateway_refund_id.as_deref() {
        if let Some(refund) = refunds
            .iter()
            .find(|r| r.paystack_refund_id.as_deref() == Some(gateway_id))
        {
            return if refund.is_pending() {
                RefundMatch::Pending(refund)
            } else {
                RefundMatch::AlreadySettled(refund)
            };
        }
    }

    let unassigned: Vec<&Refund> = refunds
        .iter()
        .filter(|r| r.is_pending() && r.paystack_refund_id.is_none())
        .collect();

    match notice.amount.as_ref() {
        Some(amount) => unassigned
            .into_iter()
            .find(|r| &r.amount == amount)
            .map_or(RefundMatch::None, RefundMatch::Pending),
        None if notice.gateway_refund_id.is_none() && unassigned.len() == 1 => {
            RefundMatch::Pending(unassigned[0])
        }
        None => RefundMatch::None,
    }
}
