use crate::logging::mask_email;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationType {
    PaymentConfirmation,
    PaymentFailed,
    RefundProcessed,
}

impl NotificationType {
    pub fn subject(&self, order_number: &str) -> String {
        match self {
            NotificationType::PaymentConfirmation => {
                format!("Payment received for order {}", order_number)
            }
            NotificationType::PaymentFailed => {
                format!("Payment for order {} was not completed", order_number)
            }
            NotificationType::RefundProcessed => {
                format!("Refund processed for order {}", order_number)
            }
        }
    }
}

/// Customer-facing payment email
#[derive(Debug, Clone, Serialize)]
pub struct PaymentNotification {
    pub notification_type: NotificationType,
    pub email: String,
    pub customer_name: String,
    pub order_number: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub reference: String,
    pub reason: Option<String>,
}

/// Outbound customer messaging. Delivery failures never fail a payment.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &PaymentNotification);
}

/// Writes notifications to the structured log; the mail relay tails it.
#[derive(Debug, Default, Clone)]
pub struct NotificationService;

impl NotificationService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for NotificationService {
    async fn send(&self, notification: &PaymentNotification) {
        let recipient = mask_email(&notification.email);
        let subject = notification
            .notification_type
            .subject(&notification.order_number);

        match notification.notification_type {
            NotificationType::PaymentConfirmation | NotificationType::RefundProcessed => {
                info!(
                    recipient = %recipient,
                    reference = %notification.reference,
                    amount = %notification.amount,
                    currency = %notification.currency,
                    subject = %subject,
                    "payment email queued"
                );
            }
            NotificationType::PaymentFailed => {
                warn!(
                    recipient = %recipient,
                    reference = %notification.reference,
                    reason = notification.reason.as_deref().unwrap_or("unknown"),
                    subject = %subject,
                    "payment failure email queued"
                );
            }
        }
    }
}
