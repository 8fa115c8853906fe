//! Payment Orchestrator Service
//!
//! Sequences the gateway client and the stores through the payment lifecycle:
//!
//! ```text
//! pending --initiate_payment--> pending (gateway session created)
//! pending --handle_successful_payment--> captured (+ order paid)
//! pending --handle_failed_payment--> failed
//! captured --process_refund(partial)--> partially_refunded
//! captured/partially_refunded --process_refund(rest)--> refunded (+ order refunded)
//! ```
//!
//! Every step persists its result before returning; the service itself holds
//! no state between calls.

use crate::database::order_repository::{Customer, Order};
use crate::database::payment_method_repository::CustomerPaymentMethod;
use crate::database::payment_repository::{Payment, Refund};
use crate::database::repository::{
    CaptureDetails, NewPayment, NewPaymentMethod, OrderStore, PaymentMethodStore, PaymentStore,
    RefundRequest, RefundSettlement,
};
use crate::error::{AppError, AppResult, AuthError, DomainError, ValidationError};
use crate::logging::mask_authorization_code;
use crate::payments::provider::PaymentGateway;
use crate::payments::reference::{charge_reference, payment_reference, refund_reference};
use crate::payments::types::{
    validate_positive_amount, Bank, ChargeAuthorizationRequest, GatewayStatus,
    InitializeTransactionRequest, ResolvedAccount, TransactionVerification,
    DEFAULT_CURRENCY,
};
use crate::payments::PaymentError;
use crate::services::notification::{NotificationType, Notifier, PaymentNotification};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Configuration for the payment orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Where the hosted checkout sends the customer when the caller gives no URL
    pub default_callback_url: String,
    /// Informational lifetime of a checkout session
    pub session_ttl: Duration,
    pub currency: String,
}

impl OrchestratorConfig {
    pub fn new(default_callback_url: impl Into<String>) -> Self {
        Self {
            default_callback_url: default_callback_url.into(),
            session_ttl: Duration::minutes(30),
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InitiatePaymentOptions {
    pub callback_url: Option<String>,
    pub channels: Option<Vec<String>>,
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentSession {
    pub payment_id: Uuid,
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentConfirmation {
    pub payment: Payment,
    /// The payment was already settled before this call; nothing changed.
    pub already_captured: bool,
    pub payment_method_saved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedCardCharge {
    pub reference: String,
    pub status: GatewayStatus,
    pub amount: BigDecimal,
    pub gateway_response: Option<String>,
    /// Recorded only when the charge was made for an order
    pub payment: Option<Payment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentDetails {
    pub payment: Payment,
    pub refunds: Vec<Refund>,
}

fn capture_details(verification: &TransactionVerification) -> CaptureDetails {
    let authorization = verification.authorization.as_ref();
    CaptureDetails {
        transaction_id: Some(verification.id.to_string()),
        authorization_code: authorization.map(|a| a.authorization_code.clone()),
        customer_code: verification
            .customer
            .as_ref()
            .and_then(|c| c.customer_code.clone()),
        channel: verification
            .channel
            .clone()
            .or_else(|| authorization.and_then(|a| a.channel.clone())),
        card_last4: authorization.and_then(|a| a.last4.clone()),
        card_type: authorization.and_then(|a| a.card_type.clone()),
        card_bank: authorization.and_then(|a| a.bank.clone()),
        gateway_response: verification.gateway_response.clone(),
        paid_at: verification
            .paid_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc)),
    }
}

fn not_successful(verification: &TransactionVerification) -> AppError {
    PaymentError::provider(format!(
        "transaction {} is not successful: {}",
        verification.reference,
        verification
            .gateway_response
            .as_deref()
            .unwrap_or("no gateway response")
    ))
    .into()
}

pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    payments: Arc<dyn PaymentStore>,
    methods: Arc<dyn PaymentMethodStore>,
    orders: Arc<dyn OrderStore>,
    notifier: Arc<dyn Notifier>,
    config: OrchestratorConfig,
}

impl PaymentOrchestrator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        payments: Arc<dyn PaymentStore>,
        methods: Arc<dyn PaymentMethodStore>,
        orders: Arc<dyn OrderStore>,
        notifier: Arc<dyn Notifier>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            gateway,
            payments,
            methods,
            orders,
            notifier,
            config,
        }
    }

    /// Loads an order and its owner, refusing orders of other customers.
    pub async fn load_checkout(
        &self,
        order_id: Uuid,
        customer_id: Uuid,
    ) -> AppResult<(Order, Customer)> {
        let order = self.find_order(order_id).await?;
        if order.user_id != customer_id {
            return Err(AppError::auth(AuthError::Forbidden {
                reason: format!("order {} belongs to another customer", order_id),
            }));
        }

        let customer = self
            .orders
            .find_customer(customer_id)
            .await?
            .ok_or_else(|| {
                AppError::domain(DomainError::CustomerNotFound {
                    customer_id: customer_id.to_string(),
                })
            })?;

        Ok((order, customer))
    }

    pub async fn initiate_payment(
        &self,
        order: &Order,
        customer: &Customer,
        options: InitiatePaymentOptions,
    ) -> AppResult<PaymentSession> {
        if order.is_paid() {
            return Err(AppError::domain(DomainError::OrderAlreadyPaid {
                order_id: order.id.to_string(),
            }));
        }
        validate_positive_amount(&order.total_amount, "total_amount")?;

        let reference = payment_reference(&order.order_number, Utc::now());
        let currency = if order.currency.is_empty() {
            self.config.currency.clone()
        } else {
            order.currency.clone()
        };

        let payment = self
            .payments
            .create_payment(NewPayment {
                order_id: order.id,
                customer_id: customer.id,
                payment_reference: reference.clone(),
                amount: order.total_amount.clone(),
                currency: currency.clone(),
                payment_method: "paystack".to_string(),
                metadata: options.metadata.clone(),
            })
            .await?;

        let metadata = json!({
            "order_id": order.id,
            "order_number": order.order_number,
            "customer_id": customer.id,
            "customer_name": customer.full_name(),
            "payment_id": payment.id,
        });

        let session = match self
            .gateway
            .initialize_transaction(InitializeTransactionRequest {
                email: customer.email.clone(),
                amount: order.total_amount.clone(),
                currency: Some(currency),
                reference: reference.clone(),
                callback_url: Some(
                    options
                        .callback_url
                        .unwrap_or_else(|| self.config.default_callback_url.clone()),
                ),
                channels: options.channels,
                metadata: Some(metadata),
            })
            .await
        {
            Ok(session) => session,
            Err(e) => {
                error!(reference = %reference, error = %e, "gateway refused to open checkout");
                if let Err(mark_err) = self
                    .payments
                    .mark_payment_failed(payment.id, &e.user_message())
                    .await
                {
                    warn!(payment_id = %payment.id, error = %mark_err, "could not mark payment failed");
                }
                return Err(e.into());
            }
        };

        self.payments
            .attach_gateway_session(payment.id, &session.access_code, &session.authorization_url)
            .await?;

        info!(
            payment_id = %payment.id,
            order_id = %order.id,
            reference = %reference,
            amount = %order.total_amount,
            "payment initiated"
        );

        Ok(PaymentSession {
            payment_id: payment.id,
            authorization_url: session.authorization_url,
            access_code: session.access_code,
            reference,
            expires_at: Utc::now() + self.config.session_ttl,
        })
    }

    /// Confirms a payment with the gateway and settles it. Safe to call again
    /// for a payment that is already captured.
    pub async fn handle_successful_payment(&self, reference: &str) -> AppResult<PaymentConfirmation> {
        let verification = self.gateway.verify_transaction(reference).await?;
        if !verification.is_success() {
            warn!(reference, status = ?verification.status, "verification did not report success");
            return Err(not_successful(&verification));
        }

        let payment = self.find_payment_by_reference(reference).await?;
        let status = payment.payment_status()?;
        if !status.is_capturable() {
            info!(payment_id = %payment.id, %status, "payment already settled");
            return Ok(PaymentConfirmation {
                payment,
                already_captured: true,
                payment_method_saved: false,
            });
        }

        if verification.amount < payment.amount {
            return Err(AppError::domain(DomainError::AmountMismatch {
                expected: payment.amount.to_string(),
                received: verification.amount.to_string(),
            }));
        }

        let captured = match self
            .payments
            .capture_payment(payment.id, &capture_details(&verification))
            .await?
        {
            Some(captured) => captured,
            None => {
                // lost a race with a concurrent confirmation
                let current = self.find_payment(payment.id).await?;
                return Ok(PaymentConfirmation {
                    payment: current,
                    already_captured: true,
                    payment_method_saved: false,
                });
            }
        };

        self.notify(
            NotificationType::PaymentConfirmation,
            &captured,
            &captured.amount,
            None,
        )
        .await;

        let payment_method_saved = self.save_card(&captured, &verification).await;

        Ok(PaymentConfirmation {
            payment: captured,
            already_captured: false,
            payment_method_saved,
        })
    }

    pub async fn handle_failed_payment(&self, reference: &str, reason: &str) -> AppResult<Payment> {
        let payment = self.find_payment_by_reference(reference).await?;

        match self.payments.mark_payment_failed(payment.id, reason).await? {
            Some(failed) => {
                info!(payment_id = %failed.id, reference, reason, "payment failed");
                self.notify(
                    NotificationType::PaymentFailed,
                    &failed,
                    &failed.amount,
                    Some(reason.to_string()),
                )
                .await;
                Ok(failed)
            }
            None => {
                info!(
                    payment_id = %payment.id,
                    status = %payment.status,
                    "failure notice for a payment that is no longer pending"
                );
                Ok(payment)
            }
        }
    }

    pub async fn process_refund(
        &self,
        payment_id: Uuid,
        amount: BigDecimal,
        reason: Option<String>,
        processed_by: Option<Uuid>,
    ) -> AppResult<RefundSettlement> {
        validate_positive_amount(&amount, "amount")?;
        let payment = self.find_payment(payment_id).await?;

        let refund = self
            .payments
            .reserve_refund(
                payment_id,
                &RefundRequest {
                    refund_reference: refund_reference(payment_id, Utc::now()),
                    amount: amount.clone(),
                    reason,
                    processed_by,
                },
            )
            .await?;

        let receipt = match self
            .gateway
            .refund_transaction(payment.gateway_transaction(), Some(&amount))
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(payment_id = %payment_id, refund_id = %refund.id, error = %e, "gateway refund failed");
                if let Err(fail_err) = self.payments.fail_refund(refund.id, &e.user_message()).await {
                    warn!(refund_id = %refund.id, error = %fail_err, "could not mark refund failed");
                }
                return Err(e.into());
            }
        };

        let settlement = self
            .payments
            .complete_refund(refund.id, Some(&receipt.id.to_string()))
            .await?;

        info!(
            payment_id = %payment_id,
            refund_id = %settlement.refund.id,
            amount = %amount,
            refunded_amount = %settlement.payment.refunded_amount,
            status = %settlement.payment.status,
            "refund processed"
        );

        self.notify(
            NotificationType::RefundProcessed,
            &settlement.payment,
            &amount,
            settlement.refund.reason.clone(),
        )
        .await;

        Ok(settlement)
    }

    pub async fn charge_saved_card(
        &self,
        customer_id: Uuid,
        authorization_code: &str,
        amount: BigDecimal,
        order_id: Option<Uuid>,
    ) -> AppResult<SavedCardCharge> {
        validate_positive_amount(&amount, "amount")?;

        let method = self
            .methods
            .find_active_by_authorization(customer_id, authorization_code)
            .await?
            .ok_or_else(|| {
                AppError::domain(DomainError::PaymentMethodNotFound {
                    method_id: mask_authorization_code(authorization_code),
                })
            })?;

        let customer = self
            .orders
            .find_customer(customer_id)
            .await?
            .ok_or_else(|| {
                AppError::domain(DomainError::CustomerNotFound {
                    customer_id: customer_id.to_string(),
                })
            })?;

        let reference = charge_reference(customer_id, Utc::now());

        let payment = match order_id {
            Some(order_id) => {
                let (order, _) = self.load_checkout(order_id, customer_id).await?;
                if order.is_paid() {
                    return Err(AppError::domain(DomainError::OrderAlreadyPaid {
                        order_id: order_id.to_string(),
                    }));
                }
                if amount != order.total_amount {
                    return Err(AppError::validation(ValidationError::InvalidAmount {
                        amount: amount.to_string(),
                        reason: format!("must equal the order total of {}", order.total_amount),
                    }));
                }
                Some(
                    self.payments
                        .create_payment(NewPayment {
                            order_id,
                            customer_id,
                            payment_reference: reference.clone(),
                            amount: amount.clone(),
                            currency: self.config.currency.clone(),
                            payment_method: "saved_card".to_string(),
                            metadata: Some(json!({ "payment_method_id": method.id })),
                        })
                        .await?,
                )
            }
            None => None,
        };

        let charged = self
            .gateway
            .charge_authorization(ChargeAuthorizationRequest {
                authorization_code: method.paystack_authorization_code.clone(),
                email: customer.email.clone(),
                amount: amount.clone(),
                reference: Some(reference.clone()),
                currency: Some(self.config.currency.clone()),
                metadata: Some(json!({
                    "customer_id": customer_id,
                    "order_id": order_id,
                    "payment_method_id": method.id,
                })),
            })
            .await;

        let verification = match charged {
            Ok(verification) => verification,
            Err(e) => {
                if let Some(payment) = &payment {
                    if let Err(mark_err) = self
                        .payments
                        .mark_payment_failed(payment.id, &e.user_message())
                        .await
                    {
                        warn!(payment_id = %payment.id, error = %mark_err, "could not mark payment failed");
                    }
                }
                return Err(e.into());
            }
        };

        let payment = match payment {
            Some(payment) if verification.is_success() => self
                .payments
                .capture_payment(payment.id, &capture_details(&verification))
                .await?
                .or(Some(payment)),
            Some(payment) if verification.status == GatewayStatus::Failed => self
                .payments
                .mark_payment_failed(
                    payment.id,
                    verification
                        .gateway_response
                        .as_deref()
                        .unwrap_or("charge declined"),
                )
                .await?
                .or(Some(payment)),
            other => other,
        };

        if !verification.is_success() {
            let message = verification
                .gateway_response
                .clone()
                .unwrap_or_else(|| format!("charge ended {:?}", verification.status));
            warn!(
                customer_id = %customer_id,
                reference = %reference,
                status = ?verification.status,
                card = %mask_authorization_code(authorization_code),
                "saved card charge not successful"
            );
            return Err(PaymentError::PaymentDeclinedError {
                message: format!("Authorization charge failed: {}", message),
                provider_code: None,
            }
            .into());
        }

        info!(
            customer_id = %customer_id,
            reference = %reference,
            card = %mask_authorization_code(authorization_code),
            "saved card charged"
        );

        Ok(SavedCardCharge {
            reference,
            status: verification.status,
            amount,
            gateway_response: verification.gateway_response,
            payment,
        })
    }

    pub async fn payment_methods(&self, customer_id: Uuid) -> AppResult<Vec<CustomerPaymentMethod>> {
        Ok(self.methods.list_payment_methods(customer_id).await?)
    }

    pub async fn set_default_payment_method(
        &self,
        customer_id: Uuid,
        method_id: Uuid,
    ) -> AppResult<CustomerPaymentMethod> {
        Ok(self
            .methods
            .set_default_payment_method(customer_id, method_id)
            .await?)
    }

    pub async fn payment(&self, payment_id: Uuid) -> AppResult<PaymentDetails> {
        let payment = self.find_payment(payment_id).await?;
        let refunds = self.payments.list_refunds(payment_id).await?;
        Ok(PaymentDetails { payment, refunds })
    }

    pub async fn payments_for_order(&self, order_id: Uuid) -> AppResult<Vec<Payment>> {
        Ok(self.payments.list_payments_for_order(order_id).await?)
    }

    pub async fn refunds_for_payment(&self, payment_id: Uuid) -> AppResult<Vec<Refund>> {
        Ok(self.payments.list_refunds(payment_id).await?)
    }

    pub async fn find_order(&self, order_id: Uuid) -> AppResult<Order> {
        self.orders.find_order(order_id).await?.ok_or_else(|| {
            AppError::domain(DomainError::OrderNotFound {
                order_id: order_id.to_string(),
            })
        })
    }

    pub async fn list_banks(&self) -> AppResult<Vec<Bank>> {
        Ok(self.gateway.list_banks().await?)
    }

    pub async fn resolve_account(
        &self,
        account_number: &str,
        bank_code: &str,
    ) -> AppResult<ResolvedAccount> {
        Ok(self.gateway.resolve_account(account_number, bank_code).await?)
    }

    pub async fn find_payment_by_reference(&self, reference: &str) -> AppResult<Payment> {
        self.payments
            .find_payment_by_reference(reference)
            .await?
            .ok_or_else(|| {
                AppError::domain(DomainError::PaymentNotFound {
                    reference: reference.to_string(),
                })
            })
    }

    async fn find_payment(&self, payment_id: Uuid) -> AppResult<Payment> {
        self.payments.find_payment(payment_id).await?.ok_or_else(|| {
            AppError::domain(DomainError::PaymentNotFound {
                reference: payment_id.to_string(),
            })
        })
    }

    /// Stores a reusable card; failures are logged and do not undo the capture.
    async fn save_card(&self, payment: &Payment, verification: &TransactionVerification) -> bool {
        let authorization = match &verification.authorization {
            Some(authorization) if authorization.reusable => authorization,
            _ => return false,
        };

        let saved = self
            .methods
            .save_payment_method(NewPaymentMethod {
                customer_id: payment.customer_id,
                authorization_code: authorization.authorization_code.clone(),
                customer_code: verification
                    .customer
                    .as_ref()
                    .and_then(|c| c.customer_code.clone()),
                card_last4: authorization.last4.clone(),
                card_type: authorization.card_type.clone(),
                card_exp_month: authorization.exp_month.clone(),
                card_exp_year: authorization.exp_year.clone(),
                card_bank: authorization.bank.clone(),
                channel: authorization.channel.clone(),
            })
            .await;

        match saved {
            Ok(method) => {
                info!(
                    customer_id = %payment.customer_id,
                    method_id = %method.id,
                    card = %mask_authorization_code(&authorization.authorization_code),
                    "payment method saved"
                );
                true
            }
            Err(e) => {
                warn!(customer_id = %payment.customer_id, error = %e, "could not save payment method");
                false
            }
        }
    }

    async fn notify(
        &self,
        notification_type: NotificationType,
        payment: &Payment,
        amount: &BigDecimal,
        reason: Option<String>,
    ) {
        let order = self.orders.find_order(payment.order_id).await;
        let customer = self.orders.find_customer(payment.customer_id).await;

        match (order, customer) {
            (Ok(Some(order)), Ok(Some(customer))) => {
                self.notifier
                    .send(&PaymentNotification {
                        notification_type,
                        email: customer.email.clone(),
                        customer_name: customer.full_name(),
                        order_number: order.order_number,
                        amount: amount.clone(),
                        currency: payment.currency.clone(),
                        reference: payment.payment_reference.clone(),
                        reason,
                    })
                    .await;
            }
            _ => warn!(
                payment_id = %payment.id,
                ?notification_type,
                "notification skipped, order or customer unavailable"
            ),
        }
    }
}

