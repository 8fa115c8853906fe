use crate::database::error::DatabaseError;
use crate::database::repository::{NewWebhookLog, WebhookLogStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

macro_rules! log_columns {
    () => {
        "id, event_type, gateway_event_id, payment_id, payload, processed, processing_error, \
         retry_count, last_retry_at, processed_at, created_at"
    };
}

/// Raw gateway notification plus its processing bookkeeping
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookLog {
    pub id: Uuid,
    pub event_type: String,
    pub gateway_event_id: Option<String>,
    pub payment_id: Option<Uuid>,
    pub payload: JsonValue,
    pub processed: bool,
    pub processing_error: Option<String>,
    pub retry_count: i32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub struct WebhookRepository {
    pool: PgPool,
}

impl WebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_event(
        &self,
        event_type: &str,
        gateway_event_id: &str,
    ) -> Result<Option<WebhookLog>, DatabaseError> {
        sqlx::query_as::<_, WebhookLog>(concat!(
            "SELECT ",
            log_columns!(),
            " FROM payment_webhook_logs WHERE event_type = $1 AND gateway_event_id = $2"
        ))
        .bind(event_type)
        .bind(gateway_event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[async_trait]
impl WebhookLogStore for WebhookRepository {
    async fn log_event(&self, event: NewWebhookLog) -> Result<(WebhookLog, bool), DatabaseError> {
        let inserted = sqlx::query_as::<_, WebhookLog>(concat!(
            "INSERT INTO payment_webhook_logs (event_type, gateway_event_id, payment_id, payload)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (event_type, gateway_event_id) DO NOTHING
             RETURNING ",
            log_columns!()
        ))
        .bind(&event.event_type)
        .bind(&event.gateway_event_id)
        .bind(event.payment_id)
        .bind(&event.payload)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if let Some(log) = inserted {
            return Ok((log, true));
        }

        // Conflict only happens when the gateway id is present
        let gateway_event_id = event.gateway_event_id.as_deref().unwrap_or_default();
        debug!(event_type = %event.event_type, gateway_event_id, "webhook redelivered");
        let existing = self
            .find_by_event(&event.event_type, gateway_event_id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("WebhookLog", gateway_event_id))?;
        Ok((existing, false))
    }

    async fn find_log(&self, id: Uuid) -> Result<Option<WebhookLog>, DatabaseError> {
        sqlx::query_as::<_, WebhookLog>(concat!(
            "SELECT ",
            log_columns!(),
            " FROM payment_webhook_logs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn mark_processed(
        &self,
        id: Uuid,
        payment_id: Option<Uuid>,
    ) -> Result<WebhookLog, DatabaseError> {
        sqlx::query_as::<_, WebhookLog>(concat!(
            "UPDATE payment_webhook_logs
             SET processed = true, processed_at = NOW(), processing_error = NULL,
                 payment_id = COALESCE($2, payment_id)
             WHERE id = $1
             RETURNING ",
            log_columns!()
        ))
        .bind(id)
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or_else(|| DatabaseError::not_found("WebhookLog", id))
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> Result<WebhookLog, DatabaseError> {
        sqlx::query_as::<_, WebhookLog>(concat!(
            "UPDATE payment_webhook_logs SET processing_error = $2 WHERE id = $1 RETURNING ",
            log_columns!()
        ))
        .bind(id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or_else(|| DatabaseError::not_found("WebhookLog", id))
    }

    async fn record_retry_failure(
        &self,
        id: Uuid,
        error: &str,
    ) -> Result<WebhookLog, DatabaseError> {
        sqlx::query_as::<_, WebhookLog>(concat!(
            "UPDATE payment_webhook_logs
             SET processing_error = $2, retry_count = retry_count + 1, last_retry_at = NOW()
             WHERE id = $1
             RETURNING ",
            log_columns!()
        ))
        .bind(id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or_else(|| DatabaseError::not_found("WebhookLog", id))
    }

    async fn list_unprocessed(
        &self,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<WebhookLog>, DatabaseError> {
        sqlx::query_as::<_, WebhookLog>(concat!(
            "SELECT ",
            log_columns!(),
            " FROM payment_webhook_logs
             WHERE processed = false AND processing_error IS NOT NULL AND retry_count < $2
             ORDER BY created_at ASC
             LIMIT $1"
        ))
        .bind(limit)
        .bind(max_retries)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
