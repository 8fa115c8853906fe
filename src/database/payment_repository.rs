use crate::database::error::DatabaseError;
use crate::database::query::{self, SqlValue};
use crate::database::repository::{
    CaptureDetails, NewPayment, PaymentStore, RefundRequest, RefundSettlement,
};
use crate::error::{AppError, AppResult};
use crate::payments::refund::{assess_refund, settle_refund, RefundLedger};
use crate::payments::types::{PaymentStatus, RefundStatus};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

macro_rules! payment_columns {
    () => {
        "id, order_id, customer_id, payment_reference, amount, currency, payment_method, status, \
         refunded_amount, paystack_access_code, paystack_authorization_url, paystack_transaction_id, \
         paystack_authorization_code, paystack_customer_code, channel, card_last4, card_type, \
         card_bank, gateway_response, failure_reason, metadata, paid_at, created_at, updated_at"
    };
}

macro_rules! refund_columns {
    () => {
        "id, payment_id, refund_reference, amount, reason, status, processed_by, \
         paystack_refund_id, error_message, created_at, updated_at"
    };
}

/// Payment entity
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub payment_reference: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub payment_method: String,
    pub status: String,
    pub refunded_amount: BigDecimal,
    #[serde(skip_serializing)]
    pub paystack_access_code: Option<String>,
    pub paystack_authorization_url: Option<String>,
    pub paystack_transaction_id: Option<String>,
    #[serde(skip_serializing)]
    pub paystack_authorization_code: Option<String>,
    pub paystack_customer_code: Option<String>,
    pub channel: Option<String>,
    pub card_last4: Option<String>,
    pub card_type: Option<String>,
    pub card_bank: Option<String>,
    pub gateway_response: Option<String>,
    pub failure_reason: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn payment_status(&self) -> AppResult<PaymentStatus> {
        self.status.parse::<PaymentStatus>().map_err(AppError::from)
    }

    /// Identifier the gateway expects for refunds.
    pub fn gateway_transaction(&self) -> &str {
        self.paystack_transaction_id
            .as_deref()
            .unwrap_or(&self.payment_reference)
    }
}

/// Refund entity
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Refund {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub refund_reference: String,
    pub amount: BigDecimal,
    pub reason: Option<String>,
    pub status: String,
    pub processed_by: Option<Uuid>,
    pub paystack_refund_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Refund {
    pub fn is_pending(&self) -> bool {
        self.status == RefundStatus::Pending.as_str()
    }
}

/// Repository for payments and their refunds
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn create_payment(&self, payment: NewPayment) -> Result<Payment, DatabaseError> {
        query::insert_row(
            &self.pool,
            "payments",
            &[
                ("order_id", payment.order_id.into()),
                ("customer_id", payment.customer_id.into()),
                ("payment_reference", payment.payment_reference.into()),
                ("amount", payment.amount.into()),
                ("currency", payment.currency.into()),
                ("payment_method", payment.payment_method.into()),
                ("status", PaymentStatus::Pending.as_str().into()),
                ("metadata", payment.metadata.into()),
            ],
        )
        .await
    }

    async fn attach_gateway_session(
        &self,
        payment_id: Uuid,
        access_code: &str,
        authorization_url: &str,
    ) -> Result<Payment, DatabaseError> {
        let rows: Vec<Payment> = query::update_rows(
            &self.pool,
            "payments",
            &[
                ("paystack_access_code", access_code.into()),
                ("paystack_authorization_url", authorization_url.into()),
                ("updated_at", SqlValue::Now),
            ],
            &[("id", payment_id.into())],
        )
        .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| DatabaseError::not_found("Payment", payment_id))
    }

    async fn find_payment(&self, id: Uuid) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(concat!(
            "SELECT ",
            payment_columns!(),
            " FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(concat!(
            "SELECT ",
            payment_columns!(),
            " FROM payments WHERE payment_reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn list_payments_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>, DatabaseError> {
        query::fetch_many(
            &self.pool,
            "payments",
            &[("order_id", order_id.into())],
            Some("created_at"),
        )
        .await
    }

    async fn capture_payment(
        &self,
        payment_id: Uuid,
        details: &CaptureDetails,
    ) -> Result<Option<Payment>, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let captured = sqlx::query_as::<_, Payment>(concat!(
            "UPDATE payments
             SET status = 'captured',
                 paystack_transaction_id = COALESCE($2, paystack_transaction_id),
                 paystack_authorization_code = COALESCE($3, paystack_authorization_code),
                 paystack_customer_code = COALESCE($4, paystack_customer_code),
                 channel = COALESCE($5, channel),
                 card_last4 = COALESCE($6, card_last4),
                 card_type = COALESCE($7, card_type),
                 card_bank = COALESCE($8, card_bank),
                 gateway_response = COALESCE($9, gateway_response),
                 failure_reason = NULL,
                 paid_at = COALESCE($10, NOW()),
                 updated_at = NOW()
             WHERE id = $1 AND status IN ('pending', 'failed')
             RETURNING ",
            payment_columns!()
        ))
        .bind(payment_id)
        .bind(&details.transaction_id)
        .bind(&details.authorization_code)
        .bind(&details.customer_code)
        .bind(&details.channel)
        .bind(&details.card_last4)
        .bind(&details.card_type)
        .bind(&details.card_bank)
        .bind(&details.gateway_response)
        .bind(details.paid_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let payment = match captured {
            Some(payment) => payment,
            None => {
                tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
                return Ok(None);
            }
        };

        sqlx::query(
            "UPDATE orders
             SET payment_status = 'paid', status = 'confirmed', paid_at = $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(payment.order_id)
        .bind(payment.paid_at)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        info!(payment_id = %payment.id, order_id = %payment.order_id, "payment captured");
        Ok(Some(payment))
    }

    async fn mark_payment_failed(
        &self,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(concat!(
            "UPDATE payments
             SET status = 'failed', failure_reason = $2, updated_at = NOW()
             WHERE id = $1 AND status = 'pending'
             RETURNING ",
            payment_columns!()
        ))
        .bind(payment_id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn mark_payment_disputed(
        &self,
        payment_id: Uuid,
        reason: Option<&str>,
    ) -> Result<Payment, DatabaseError> {
        let rows: Vec<Payment> = query::update_rows(
            &self.pool,
            "payments",
            &[
                ("status", PaymentStatus::Disputed.as_str().into()),
                ("failure_reason", reason.into()),
                ("updated_at", SqlValue::Now),
            ],
            &[("id", payment_id.into())],
        )
        .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| DatabaseError::not_found("Payment", payment_id))
    }

    async fn reserve_refund(&self, payment_id: Uuid, request: &RefundRequest) -> AppResult<Refund> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        // Row lock serializes concurrent refunds of the same payment
        let payment = sqlx::query_as::<_, Payment>(concat!(
            "SELECT ",
            payment_columns!(),
            " FROM payments WHERE id = $1 FOR UPDATE"
        ))
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or_else(|| DatabaseError::not_found("Payment", payment_id))?;

        let pending_refunds: BigDecimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)
             FROM payment_refunds
             WHERE payment_id = $1 AND status = 'pending'",
        )
        .bind(payment_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let payment_key = payment.id.to_string();
        assess_refund(
            &RefundLedger {
                payment_id: &payment_key,
                status: payment.payment_status()?,
                amount: &payment.amount,
                refunded_amount: &payment.refunded_amount,
                pending_refunds: &pending_refunds,
            },
            &request.amount,
        )?;

        let refund = sqlx::query_as::<_, Refund>(concat!(
            "INSERT INTO payment_refunds
             (payment_id, refund_reference, amount, reason, status, processed_by)
             VALUES ($1, $2, $3, $4, 'pending', $5)
             RETURNING ",
            refund_columns!()
        ))
        .bind(payment_id)
        .bind(&request.refund_reference)
        .bind(&request.amount)
        .bind(&request.reason)
        .bind(request.processed_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(refund)
    }

    async fn complete_refund(
        &self,
        refund_id: Uuid,
        gateway_refund_id: Option<&str>,
    ) -> Result<RefundSettlement, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let refund = sqlx::query_as::<_, Refund>(concat!(
            "UPDATE payment_refunds
             SET status = 'processed',
                 paystack_refund_id = COALESCE($2, paystack_refund_id),
                 updated_at = NOW()
             WHERE id = $1 AND status = 'pending'
             RETURNING ",
            refund_columns!()
        ))
        .bind(refund_id)
        .bind(gateway_refund_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let refund = match refund {
            Some(refund) => refund,
            None => {
                tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
                return Err(DatabaseError::not_found("Refund", refund_id));
            }
        };

        let payment = sqlx::query_as::<_, Payment>(concat!(
            "SELECT ",
            payment_columns!(),
            " FROM payments WHERE id = $1 FOR UPDATE"
        ))
        .bind(refund.payment_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let (refunded_amount, status) =
            settle_refund(&payment.amount, &payment.refunded_amount, &refund.amount);

        let payment = sqlx::query_as::<_, Payment>(concat!(
            "UPDATE payments
             SET refunded_amount = $2, status = $3, updated_at = NOW()
             WHERE id = $1
             RETURNING ",
            payment_columns!()
        ))
        .bind(payment.id)
        .bind(&refunded_amount)
        .bind(status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let order_refunded = status == PaymentStatus::Refunded;
        if order_refunded {
            sqlx::query(
                "UPDATE orders
                 SET payment_status = 'refunded', status = 'refunded', updated_at = NOW()
                 WHERE id = $1",
            )
            .bind(payment.order_id)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        }

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        Ok(RefundSettlement {
            refund,
            payment,
            order_refunded,
        })
    }

    async fn fail_refund(&self, refund_id: Uuid, error: &str) -> Result<Refund, DatabaseError> {
        sqlx::query_as::<_, Refund>(concat!(
            "UPDATE payment_refunds
             SET status = 'failed', error_message = $2, updated_at = NOW()
             WHERE id = $1 AND status = 'pending'
             RETURNING ",
            refund_columns!()
        ))
        .bind(refund_id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or_else(|| DatabaseError::not_found("Refund", refund_id))
    }

    async fn list_refunds(&self, payment_id: Uuid) -> Result<Vec<Refund>, DatabaseError> {
        sqlx::query_as::<_, Refund>(concat!(
            "SELECT ",
            refund_columns!(),
            " FROM payment_refunds WHERE payment_id = $1 ORDER BY created_at ASC"
        ))
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
