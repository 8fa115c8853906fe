use crate::database::error::DatabaseError;
use crate::database::repository::{NewPaymentMethod, PaymentMethodStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

macro_rules! method_columns {
    () => {
        "id, customer_id, paystack_authorization_code, paystack_customer_code, card_last4, \
         card_type, card_exp_month, card_exp_year, card_bank, channel, is_default, is_active, \
         created_at"
    };
}

/// Saved card a customer can be charged against without re-entering details
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CustomerPaymentMethod {
    pub id: Uuid,
    pub customer_id: Uuid,
    #[serde(skip_serializing)]
    pub paystack_authorization_code: String,
    pub paystack_customer_code: Option<String>,
    pub card_last4: Option<String>,
    pub card_type: Option<String>,
    pub card_exp_month: Option<String>,
    pub card_exp_year: Option<String>,
    pub card_bank: Option<String>,
    pub channel: Option<String>,
    pub is_default: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Repository for customers' saved cards
pub struct PaymentMethodRepository {
    pool: PgPool,
}

impl PaymentMethodRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentMethodStore for PaymentMethodRepository {
    async fn save_payment_method(
        &self,
        method: NewPaymentMethod,
    ) -> Result<CustomerPaymentMethod, DatabaseError> {
        sqlx::query_as::<_, CustomerPaymentMethod>(concat!(
            "INSERT INTO customer_payment_methods
             (customer_id, paystack_authorization_code, paystack_customer_code, card_last4,
              card_type, card_exp_month, card_exp_year, card_bank, channel, is_default, is_active)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9,
                     NOT EXISTS (SELECT 1 FROM customer_payment_methods
                                 WHERE customer_id = $1 AND is_default = true AND is_active = true),
                     true)
             ON CONFLICT (customer_id, paystack_authorization_code) DO UPDATE
             SET paystack_customer_code = EXCLUDED.paystack_customer_code,
                 card_exp_month = EXCLUDED.card_exp_month,
                 card_exp_year = EXCLUDED.card_exp_year,
                 is_active = true
             RETURNING ",
            method_columns!()
        ))
        .bind(method.customer_id)
        .bind(&method.authorization_code)
        .bind(&method.customer_code)
        .bind(&method.card_last4)
        .bind(&method.card_type)
        .bind(&method.card_exp_month)
        .bind(&method.card_exp_year)
        .bind(&method.card_bank)
        .bind(&method.channel)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn list_payment_methods(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<CustomerPaymentMethod>, DatabaseError> {
        sqlx::query_as::<_, CustomerPaymentMethod>(concat!(
            "SELECT ",
            method_columns!(),
            " FROM customer_payment_methods
             WHERE customer_id = $1 AND is_active = true
             ORDER BY is_default DESC, created_at DESC"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_active_by_authorization(
        &self,
        customer_id: Uuid,
        authorization_code: &str,
    ) -> Result<Option<CustomerPaymentMethod>, DatabaseError> {
        sqlx::query_as::<_, CustomerPaymentMethod>(concat!(
            "SELECT ",
            method_columns!(),
            " FROM customer_payment_methods
             WHERE customer_id = $1 AND paystack_authorization_code = $2 AND is_active = true"
        ))
        .bind(customer_id)
        .bind(authorization_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn set_default_payment_method(
        &self,
        customer_id: Uuid,
        method_id: Uuid,
    ) -> Result<CustomerPaymentMethod, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        sqlx::query(
            "UPDATE customer_payment_methods
             SET is_default = false
             WHERE customer_id = $1 AND is_default = true",
        )
        .bind(customer_id)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let updated = sqlx::query_as::<_, CustomerPaymentMethod>(concat!(
            "UPDATE customer_payment_methods
             SET is_default = true
             WHERE id = $1 AND customer_id = $2 AND is_active = true
             RETURNING ",
            method_columns!()
        ))
        .bind(method_id)
        .bind(customer_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let method = match updated {
            Some(method) => method,
            None => {
                tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
                return Err(DatabaseError::not_found("PaymentMethod", method_id));
            }
        };

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(method)
    }
}
