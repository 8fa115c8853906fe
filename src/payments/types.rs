use crate::payments::error::PaymentError;
use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

/// Channels offered on the hosted checkout when the caller does not pick any.
pub const DEFAULT_CHANNELS: [&str; 4] = ["card", "bank_transfer", "ussd", "qr"];

pub const DEFAULT_CURRENCY: &str = "NGN";

/// Lifecycle of a payment row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Captured,
    PartiallyCaptured,
    Refunded,
    PartiallyRefunded,
    Failed,
    Cancelled,
    Disputed,
    Chargeback,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Captured => "captured",
            PaymentStatus::PartiallyCaptured => "partially_captured",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::PartiallyRefunded => "partially_refunded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Disputed => "disputed",
            PaymentStatus::Chargeback => "chargeback",
        }
    }

    /// Refunds are only issued against settled money.
    pub fn is_refundable(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Captured | PaymentStatus::PartiallyRefunded
        )
    }

    /// A success notification may still settle these.
    pub fn is_capturable(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Failed)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "pending" => Ok(PaymentStatus::Pending),
            "authorized" => Ok(PaymentStatus::Authorized),
            "captured" => Ok(PaymentStatus::Captured),
            "partially_captured" => Ok(PaymentStatus::PartiallyCaptured),
            "refunded" => Ok(PaymentStatus::Refunded),
            "partially_refunded" => Ok(PaymentStatus::PartiallyRefunded),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "disputed" => Ok(PaymentStatus::Disputed),
            "chargeback" => Ok(PaymentStatus::Chargeback),
            _ => Err(PaymentError::ValidationError {
                message: format!("unknown payment status: {}", value),
                field: Some("status".to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Processed,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Processed => "processed",
            RefundStatus::Failed => "failed",
        }
    }
}

impl FromStr for RefundStatus {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "pending" => Ok(RefundStatus::Pending),
            "processed" => Ok(RefundStatus::Processed),
            "failed" => Ok(RefundStatus::Failed),
            _ => Err(PaymentError::ValidationError {
                message: format!("unknown refund status: {}", value),
                field: Some("status".to_string()),
            }),
        }
    }
}

/// Transaction status as reported by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Success,
    Failed,
    Abandoned,
    Pending,
    Ongoing,
    Reversed,
    Unknown,
}

impl GatewayStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "success" => GatewayStatus::Success,
            "failed" => GatewayStatus::Failed,
            "abandoned" => GatewayStatus::Abandoned,
            "pending" => GatewayStatus::Pending,
            "ongoing" | "processing" | "queued" => GatewayStatus::Ongoing,
            "reversed" => GatewayStatus::Reversed,
            _ => GatewayStatus::Unknown,
        }
    }
}

/// Rejects zero, negative and sub-kobo amounts.
pub fn validate_positive_amount(amount: &BigDecimal, field: &str) -> Result<(), PaymentError> {
    if amount <= &BigDecimal::zero() {
        return Err(PaymentError::ValidationError {
            message: "amount must be greater than zero".to_string(),
            field: Some(field.to_string()),
        });
    }
    if amount.clone().with_scale(2) != *amount {
        return Err(PaymentError::ValidationError {
            message: format!("amount {} has more than two decimal places", amount),
            field: Some(field.to_string()),
        });
    }
    Ok(())
}

/// Major units (naira) to the integral minor units (kobo) the gateway expects.
pub fn to_minor_units(amount: &BigDecimal) -> Result<i64, PaymentError> {
    (amount.clone() * BigDecimal::from(100))
        .round(0)
        .to_i64()
        .ok_or_else(|| PaymentError::ValidationError {
            message: format!("amount {} is out of range", amount),
            field: Some("amount".to_string()),
        })
}

pub fn from_minor_units(minor: i64) -> BigDecimal {
    (BigDecimal::from(minor) / BigDecimal::from(100)).with_scale(2)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeTransactionRequest {
    pub email: String,
    pub amount: BigDecimal,
    pub currency: Option<String>,
    pub reference: String,
    pub callback_url: Option<String>,
    pub channels: Option<Vec<String>>,
    pub metadata: Option<JsonValue>,
}

/// Hosted checkout session opened by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionSession {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// Reusable card token returned with a successful charge.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CardAuthorization {
    pub authorization_code: String,
    #[serde(default)]
    pub last4: Option<String>,
    #[serde(default)]
    pub exp_month: Option<String>,
    #[serde(default)]
    pub exp_year: Option<String>,
    #[serde(default)]
    pub card_type: Option<String>,
    #[serde(default)]
    pub bank: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub reusable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct GatewayCustomer {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub customer_code: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Outcome of verifying, fetching or charging a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionVerification {
    pub id: i64,
    pub reference: String,
    pub status: GatewayStatus,
    pub amount: BigDecimal,
    pub currency: String,
    pub channel: Option<String>,
    pub gateway_response: Option<String>,
    pub paid_at: Option<String>,
    pub authorization: Option<CardAuthorization>,
    pub customer: Option<GatewayCustomer>,
    pub metadata: Option<JsonValue>,
}

impl TransactionVerification {
    pub fn is_success(&self) -> bool {
        self.status == GatewayStatus::Success
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub id: i64,
    pub status: String,
    pub amount: BigDecimal,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeAuthorizationRequest {
    pub authorization_code: String,
    pub email: String,
    pub amount: BigDecimal,
    pub reference: Option<String>,
    pub currency: Option<String>,
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bank {
    pub id: i64,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedAccount {
    pub account_number: String,
    pub account_name: String,
    #[serde(default)]
    pub bank_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerProfile {
    pub id: i64,
    pub customer_code: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookVerificationResult {
    pub valid: bool,
    pub reason: Option<String>,
}
