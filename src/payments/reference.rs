//! Merchant-side references sent to the gateway.
//!
//! The payment reference is the key every webhook is resolved by, so it is
//! globally unique (also enforced by a UNIQUE column).

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub fn payment_reference(order_number: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}", order_number, at.timestamp_millis())
}

/// Refunds of one payment can be requested within the same millisecond, so
/// the timestamp alone does not keep the reference unique.
pub fn refund_reference(payment_id: Uuid, at: DateTime<Utc>) -> String {
    format!("REF_{}_{}_{}", payment_id, at.timestamp_millis(), nonce())
}

pub fn charge_reference(customer_id: Uuid, at: DateTime<Utc>) -> String {
    format!("charge_{}_{}_{}", customer_id, at.timestamp_millis(), nonce())
}

fn nonce() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}
