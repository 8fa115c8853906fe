//! Store traits consumed by the payment services.
//!
//! The Postgres repositories implement these; every multi-row state change
//! is a single method so implementations can make it atomic.

use crate::database::error::DatabaseError;
use crate::database::order_repository::{Customer, Order};
use crate::database::payment_method_repository::CustomerPaymentMethod;
use crate::database::payment_repository::{Payment, Refund};
use crate::database::webhook_repository::WebhookLog;
use crate::error::AppResult;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub payment_reference: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub payment_method: String,
    pub metadata: Option<JsonValue>,
}

/// Gateway facts recorded when a payment settles.
#[derive(Debug, Clone, Default)]
pub struct CaptureDetails {
    pub transaction_id: Option<String>,
    pub authorization_code: Option<String>,
    pub customer_code: Option<String>,
    pub channel: Option<String>,
    pub card_last4: Option<String>,
    pub card_type: Option<String>,
    pub card_bank: Option<String>,
    pub gateway_response: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub refund_reference: String,
    pub amount: BigDecimal,
    pub reason: Option<String>,
    pub processed_by: Option<Uuid>,
}

/// Result of settling a refund: the refund row, the payment after the
/// balance moved, and whether the order flipped to refunded.
#[derive(Debug, Clone)]
pub struct RefundSettlement {
    pub refund: Refund,
    pub payment: Payment,
    pub order_refunded: bool,
}

#[derive(Debug, Clone)]
pub struct NewPaymentMethod {
    pub customer_id: Uuid,
    pub authorization_code: String,
    pub customer_code: Option<String>,
    pub card_last4: Option<String>,
    pub card_type: Option<String>,
    pub card_exp_month: Option<String>,
    pub card_exp_year: Option<String>,
    pub card_bank: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewWebhookLog {
    pub event_type: String,
    pub gateway_event_id: Option<String>,
    pub payment_id: Option<Uuid>,
    pub payload: JsonValue,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create_payment(&self, payment: NewPayment) -> Result<Payment, DatabaseError>;

    async fn attach_gateway_session(
        &self,
        payment_id: Uuid,
        access_code: &str,
        authorization_url: &str,
    ) -> Result<Payment, DatabaseError>;

    async fn find_payment(&self, id: Uuid) -> Result<Option<Payment>, DatabaseError>;

    async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, DatabaseError>;

    async fn list_payments_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>, DatabaseError>;

    /// Moves a pending (or failed) payment to captured and marks its order
    /// paid, atomically. `None` when the payment was not in a capturable state.
    async fn capture_payment(
        &self,
        payment_id: Uuid,
        details: &CaptureDetails,
    ) -> Result<Option<Payment>, DatabaseError>;

    /// `None` unless the payment was still pending.
    async fn mark_payment_failed(
        &self,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<Option<Payment>, DatabaseError>;

    async fn mark_payment_disputed(
        &self,
        payment_id: Uuid,
        reason: Option<&str>,
    ) -> Result<Payment, DatabaseError>;

    /// Validates the refund against the locked payment balance and inserts it
    /// as pending, atomically.
    async fn reserve_refund(&self, payment_id: Uuid, request: &RefundRequest) -> AppResult<Refund>;

    async fn complete_refund(
        &self,
        refund_id: Uuid,
        gateway_refund_id: Option<&str>,
    ) -> Result<RefundSettlement, DatabaseError>;

    async fn fail_refund(&self, refund_id: Uuid, error: &str) -> Result<Refund, DatabaseError>;

    async fn list_refunds(&self, payment_id: Uuid) -> Result<Vec<Refund>, DatabaseError>;
}

#[async_trait]
pub trait PaymentMethodStore: Send + Sync {
    /// Insert or refresh a saved card; the first card becomes the default.
    async fn save_payment_method(
        &self,
        method: NewPaymentMethod,
    ) -> Result<CustomerPaymentMethod, DatabaseError>;

    async fn list_payment_methods(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<CustomerPaymentMethod>, DatabaseError>;

    async fn find_active_by_authorization(
        &self,
        customer_id: Uuid,
        authorization_code: &str,
    ) -> Result<Option<CustomerPaymentMethod>, DatabaseError>;

    async fn set_default_payment_method(
        &self,
        customer_id: Uuid,
        method_id: Uuid,
    ) -> Result<CustomerPaymentMethod, DatabaseError>;
}

#[async_trait]
pub trait WebhookLogStore: Send + Sync {
    /// Appends the event unless `(event_type, gateway_event_id)` is already
    /// logged. The flag is `true` when a new row was written.
    async fn log_event(&self, event: NewWebhookLog) -> Result<(WebhookLog, bool), DatabaseError>;

    async fn find_log(&self, id: Uuid) -> Result<Option<WebhookLog>, DatabaseError>;

    async fn mark_processed(
        &self,
        id: Uuid,
        payment_id: Option<Uuid>,
    ) -> Result<WebhookLog, DatabaseError>;

    async fn record_failure(&self, id: Uuid, error: &str) -> Result<WebhookLog, DatabaseError>;

    /// Same as `record_failure` but also counts the attempt.
    async fn record_retry_failure(&self, id: Uuid, error: &str)
        -> Result<WebhookLog, DatabaseError>;

    async fn list_unprocessed(
        &self,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<WebhookLog>, DatabaseError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, DatabaseError>;

    async fn find_customer(&self, id: Uuid) -> Result<Option<Customer>, DatabaseError>;
}
