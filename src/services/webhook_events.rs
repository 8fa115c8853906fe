//! Gateway notifications as a closed set of events.
//!
//! Local payments are always resolved by the merchant reference we generated,
//! never by the gateway's own transaction id.

use crate::payments::types::from_minor_units;
use crate::payments::PaymentError;
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::Value as JsonValue;

/// Envelope every gateway notification arrives in
#[derive(Debug, Clone, Deserialize)]
pub struct RawWebhookEvent {
    pub event: String,
    #[serde(default)]
    pub data: JsonValue,
}

impl RawWebhookEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, PaymentError> {
        serde_json::from_slice(payload).map_err(|e| PaymentError::ValidationError {
            message: format!("malformed webhook payload: {}", e),
            field: Some("body".to_string()),
        })
    }

    /// Gateway-side id used to de-duplicate redeliveries.
    pub fn gateway_event_id(&self) -> Option<String> {
        match self.data.get("id") {
            Some(JsonValue::Number(n)) => Some(n.to_string()),
            Some(JsonValue::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    pub fn to_payload(&self) -> JsonValue {
        serde_json::json!({ "event": self.event, "data": self.data })
    }
}

/// Refund notification details
#[derive(Debug, Clone, PartialEq)]
pub struct RefundNotice {
    /// Reference of the refunded payment
    pub transaction_reference: String,
    pub gateway_refund_id: Option<String>,
    pub amount: Option<BigDecimal>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    ChargeSuccess { reference: String },
    ChargeFailed { reference: String, reason: String },
    ChargeDispute { reference: String, reason: Option<String> },
    RefundProcessed(RefundNotice),
    RefundFailed(RefundNotice),
    RefundPending(RefundNotice),
    TransferSuccess { reference: Option<String> },
    TransferFailed { reference: Option<String>, reason: Option<String> },
    SubscriptionCreated { subscription_code: Option<String> },
    SubscriptionDisabled { subscription_code: Option<String> },
    InvoiceCreated { invoice_code: Option<String> },
    InvoiceUpdated { invoice_code: Option<String> },
    InvoicePaymentFailed { invoice_code: Option<String> },
    CustomerCreated { customer_code: Option<String> },
    CustomerUpdated { customer_code: Option<String> },
    Unhandled { event_type: String },
}

fn text(data: &JsonValue, key: &str) -> Option<String> {
    match data.get(key) {
        Some(JsonValue::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// `data.reference`, `data.transaction_reference` or `data.transaction.reference`
fn merchant_reference(data: &JsonValue) -> Option<String> {
    text(data, "reference")
        .or_else(|| text(data, "transaction_reference"))
        .or_else(|| data.get("transaction").and_then(|t| text(t, "reference")))
}

fn require_reference(event: &str, data: &JsonValue) -> Result<String, PaymentError> {
    merchant_reference(data).ok_or_else(|| PaymentError::ValidationError {
        message: format!("{} notification carries no transaction reference", event),
        field: Some("data.reference".to_string()),
    })
}

fn refund_notice(event: &str, data: &JsonValue) -> Result<RefundNotice, PaymentError> {
    let transaction_reference = text(data, "transaction_reference")
        .or_else(|| data.get("transaction").and_then(|t| text(t, "reference")))
        .or_else(|| text(data, "reference"))
        .ok_or_else(|| PaymentError::ValidationError {
            message: format!("{} notification carries no transaction reference", event),
            field: Some("data.transaction_reference".to_string()),
        })?;

    Ok(RefundNotice {
        transaction_reference,
        gateway_refund_id: text(data, "id"),
        amount: data.get("amount").and_then(JsonValue::as_i64).map(from_minor_units),
        reason: text(data, "reason").or_else(|| text(data, "customer_note")),
    })
}

impl GatewayEvent {
    pub fn from_raw(raw: &RawWebhookEvent) -> Result<Self, PaymentError> {
        let data = &raw.data;
        let event = raw.event.as_str();

        Ok(match event {
            "charge.success" => GatewayEvent::ChargeSuccess {
                reference: require_reference(event, data)?,
            },
            "charge.failed" => GatewayEvent::ChargeFailed {
                reference: require_reference(event, data)?,
                reason: text(data, "gateway_response")
                    .unwrap_or_else(|| "Payment failed".to_string()),
            },
            "charge.dispute.create" => GatewayEvent::ChargeDispute {
                reference: require_reference(event, data)?,
                reason: text(data, "reason").or_else(|| text(data, "category")),
            },
            "refund.processed" => GatewayEvent::RefundProcessed(refund_notice(event, data)?),
            "refund.failed" => GatewayEvent::RefundFailed(refund_notice(event, data)?),
            "refund.pending" => GatewayEvent::RefundPending(refund_notice(event, data)?),
            "transfer.success" => GatewayEvent::TransferSuccess {
                reference: text(data, "reference"),
            },
            "transfer.failed" => GatewayEvent::TransferFailed {
                reference: text(data, "reference"),
                reason: text(data, "reason"),
            },
            "subscription.create" => GatewayEvent::SubscriptionCreated {
                subscription_code: text(data, "subscription_code"),
            },
            "subscription.disable" => GatewayEvent::SubscriptionDisabled {
                subscription_code: text(data, "subscription_code"),
            },
            "invoice.create" => GatewayEvent::InvoiceCreated {
                invoice_code: text(data, "invoice_code"),
            },
            "invoice.update" => GatewayEvent::InvoiceUpdated {
                invoice_code: text(data, "invoice_code"),
            },
            "invoice.payment_failed" => GatewayEvent::InvoicePaymentFailed {
                invoice_code: text(data, "invoice_code"),
            },
            "customer.create" => GatewayEvent::CustomerCreated {
                customer_code: text(data, "customer_code"),
            },
            "customer.update" => GatewayEvent::CustomerUpdated {
                customer_code: text(data, "customer_code"),
            },
            other => GatewayEvent::Unhandled {
                event_type: other.to_string(),
            },
        })
    }

    /// Reference of the local payment this event is about, if any.
    pub fn payment_reference(&self) -> Option<&str> {
        match self {
            GatewayEvent::ChargeSuccess { reference }
            | GatewayEvent::ChargeFailed { reference, .. }
            | GatewayEvent::ChargeDispute { reference, .. } => Some(reference),
            GatewayEvent::RefundProcessed(notice)
            | GatewayEvent::RefundFailed(notice)
            | GatewayEvent::RefundPending(notice) => Some(&notice.transaction_reference),
            _ => None,
        }
    }
}
