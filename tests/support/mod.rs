//! In-memory stores and a scripted gateway for exercising the payment
//! services without Postgres or network access.

#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use voguevault_payments::api::AppState;
use voguevault_payments::auth::{Claims, JwtVerifier};
use voguevault_payments::database::error::DatabaseError;
use voguevault_payments::database::order_repository::{Customer, Order};
use voguevault_payments::database::payment_method_repository::CustomerPaymentMethod;
use voguevault_payments::database::payment_repository::{Payment, Refund};
use voguevault_payments::database::repository::{
    CaptureDetails, NewPayment, NewPaymentMethod, NewWebhookLog, OrderStore, PaymentMethodStore,
    PaymentStore, RefundRequest, RefundSettlement, WebhookLogStore,
};
use voguevault_payments::database::webhook_repository::WebhookLog;
use voguevault_payments::error::AppResult;
use voguevault_payments::health::HealthChecker;
use voguevault_payments::payments::error::{PaymentError, PaymentResult};
use voguevault_payments::payments::refund::{assess_refund, settle_refund, RefundLedger};
use voguevault_payments::payments::types::{
    Bank, CardAuthorization, ChargeAuthorizationRequest, CreateCustomerRequest, CustomerProfile,
    GatewayCustomer, GatewayStatus, InitializeTransactionRequest, PaymentStatus, RefundReceipt,
    RefundStatus, ResolvedAccount, TransactionSession, TransactionVerification,
    WebhookVerificationResult,
};
use voguevault_payments::payments::utils::{sign_hmac_sha512_hex, verify_hmac_sha512_hex};
use voguevault_payments::payments::PaymentGateway;
use voguevault_payments::services::notification::{Notifier, PaymentNotification};
use voguevault_payments::services::{OrchestratorConfig, PaymentOrchestrator, WebhookProcessor};

pub const WEBHOOK_SECRET: &str = "sk_test_webhook_secret";
pub const JWT_SECRET: &str = "test-jwt-secret-0123456789";
pub const CARD_AUTHORIZATION: &str = "AUTH_test4081";

pub fn dec(value: i64) -> BigDecimal {
    BigDecimal::from(value)
}

pub fn sign(body: &[u8]) -> String {
    sign_hmac_sha512_hex(body, WEBHOOK_SECRET).expect("hmac accepts any key length")
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    customers: HashMap<Uuid, Customer>,
    orders: HashMap<Uuid, Order>,
    payments: HashMap<Uuid, Payment>,
    refunds: Vec<Refund>,
    methods: Vec<CustomerPaymentMethod>,
    logs: Vec<WebhookLog>,
}

/// One lock over every table, so each trait method is atomic like its SQL
/// counterpart.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_customer(&self, email: &str) -> Customer {
        let customer = Customer {
            id: Uuid::new_v4(),
            email: email.to_string(),
            first_name: Some("Ada".to_string()),
            last_name: Some("Obi".to_string()),
        };
        self.state
            .lock()
            .unwrap()
            .customers
            .insert(customer.id, customer.clone());
        customer
    }

    pub fn seed_order(&self, customer: &Customer, order_number: &str, total: BigDecimal) -> Order {
        let order = Order {
            id: Uuid::new_v4(),
            order_number: order_number.to_string(),
            user_id: customer.id,
            total_amount: total,
            currency: "NGN".to_string(),
            status: "pending".to_string(),
            payment_status: "pending".to_string(),
            paid_at: None,
        };
        self.state
            .lock()
            .unwrap()
            .orders
            .insert(order.id, order.clone());
        order
    }

    pub fn order(&self, id: Uuid) -> Order {
        self.state.lock().unwrap().orders[&id].clone()
    }

    pub fn payment(&self, id: Uuid) -> Payment {
        self.state.lock().unwrap().payments[&id].clone()
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.state.lock().unwrap().payments.values().cloned().collect()
    }

    pub fn refunds(&self) -> Vec<Refund> {
        self.state.lock().unwrap().refunds.clone()
    }

    pub fn methods(&self) -> Vec<CustomerPaymentMethod> {
        self.state.lock().unwrap().methods.clone()
    }

    pub fn logs(&self) -> Vec<WebhookLog> {
        self.state.lock().unwrap().logs.clone()
    }

    pub fn log(&self, id: Uuid) -> WebhookLog {
        self.logs()
            .into_iter()
            .find(|l| l.id == id)
            .expect("webhook log exists")
    }

    /// Stores a failed log entry directly, as if an earlier delivery had failed.
    pub fn seed_failed_log(&self, payload: JsonValue, retry_count: i32) -> WebhookLog {
        let log = WebhookLog {
            id: Uuid::new_v4(),
            event_type: payload["event"].as_str().unwrap_or_default().to_string(),
            gateway_event_id: payload["data"]["id"].as_i64().map(|id| id.to_string()),
            payment_id: None,
            payload,
            processed: false,
            processing_error: Some("earlier failure".to_string()),
            retry_count,
            last_retry_at: None,
            processed_at: None,
            created_at: Utc::now(),
        };
        self.state.lock().unwrap().logs.push(log.clone());
        log
    }
}

fn update_payment(
    state: &mut StoreState,
    id: Uuid,
    f: impl FnOnce(&mut Payment),
) -> Result<Payment, DatabaseError> {
    let payment = state
        .payments
        .get_mut(&id)
        .ok_or_else(|| DatabaseError::not_found("Payment", id))?;
    f(payment);
    payment.updated_at = Utc::now();
    Ok(payment.clone())
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn create_payment(&self, payment: NewPayment) -> Result<Payment, DatabaseError> {
        let now = Utc::now();
        let created = Payment {
            id: Uuid::new_v4(),
            order_id: payment.order_id,
            customer_id: payment.customer_id,
            payment_reference: payment.payment_reference,
            amount: payment.amount,
            currency: payment.currency,
            payment_method: payment.payment_method,
            status: PaymentStatus::Pending.as_str().to_string(),
            refunded_amount: BigDecimal::zero(),
            paystack_access_code: None,
            paystack_authorization_url: None,
            paystack_transaction_id: None,
            paystack_authorization_code: None,
            paystack_customer_code: None,
            channel: None,
            card_last4: None,
            card_type: None,
            card_bank: None,
            gateway_response: None,
            failure_reason: None,
            metadata: payment.metadata,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        self.state
            .lock()
            .unwrap()
            .payments
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn attach_gateway_session(
        &self,
        payment_id: Uuid,
        access_code: &str,
        authorization_url: &str,
    ) -> Result<Payment, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        update_payment(&mut state, payment_id, |p| {
            p.paystack_access_code = Some(access_code.to_string());
            p.paystack_authorization_url = Some(authorization_url.to_string());
        })
    }

    async fn find_payment(&self, id: Uuid) -> Result<Option<Payment>, DatabaseError> {
        Ok(self.state.lock().unwrap().payments.get(&id).cloned())
    }

    async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .payments
            .values()
            .find(|p| p.payment_reference == reference)
            .cloned())
    }

    async fn list_payments_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>, DatabaseError> {
        let mut payments: Vec<Payment> = self
            .state
            .lock()
            .unwrap()
            .payments
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    async fn capture_payment(
        &self,
        payment_id: Uuid,
        details: &CaptureDetails,
    ) -> Result<Option<Payment>, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        let capturable = state
            .payments
            .get(&payment_id)
            .map(|p| p.status == "pending" || p.status == "failed")
            .unwrap_or(false);
        if !capturable {
            return Ok(None);
        }

        let paid_at = details.paid_at.unwrap_or_else(Utc::now);
        let payment = update_payment(&mut state, payment_id, |p| {
            p.status = PaymentStatus::Captured.as_str().to_string();
            p.paystack_transaction_id = details.transaction_id.clone();
            p.paystack_authorization_code = details.authorization_code.clone();
            p.paystack_customer_code = details.customer_code.clone();
            p.channel = details.channel.clone();
            p.card_last4 = details.card_last4.clone();
            p.card_type = details.card_type.clone();
            p.card_bank = details.card_bank.clone();
            p.gateway_response = details.gateway_response.clone();
            p.failure_reason = None;
            p.paid_at = Some(paid_at);
        })?;

        if let Some(order) = state.orders.get_mut(&payment.order_id) {
            order.payment_status = "paid".to_string();
            order.status = "confirmed".to_string();
            order.paid_at = Some(paid_at);
        }
        Ok(Some(payment))
    }

    async fn mark_payment_failed(
        &self,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        match state.payments.get(&payment_id) {
            Some(p) if p.status == "pending" => {}
            _ => return Ok(None),
        }
        update_payment(&mut state, payment_id, |p| {
            p.status = PaymentStatus::Failed.as_str().to_string();
            p.failure_reason = Some(reason.to_string());
        })
        .map(Some)
    }

    async fn mark_payment_disputed(
        &self,
        payment_id: Uuid,
        reason: Option<&str>,
    ) -> Result<Payment, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        update_payment(&mut state, payment_id, |p| {
            p.status = PaymentStatus::Disputed.as_str().to_string();
            p.failure_reason = reason.map(str::to_string);
        })
    }

    async fn reserve_refund(&self, payment_id: Uuid, request: &RefundRequest) -> AppResult<Refund> {
        let mut state = self.state.lock().unwrap();
        let payment = state
            .payments
            .get(&payment_id)
            .cloned()
            .ok_or_else(|| DatabaseError::not_found("Payment", payment_id))?;

        let pending: BigDecimal = state
            .refunds
            .iter()
            .filter(|r| r.payment_id == payment_id && r.is_pending())
            .fold(BigDecimal::zero(), |acc, r| acc + &r.amount);

        let payment_key = payment.id.to_string();
        assess_refund(
            &RefundLedger {
                payment_id: &payment_key,
                status: payment.payment_status()?,
                amount: &payment.amount,
                refunded_amount: &payment.refunded_amount,
                pending_refunds: &pending,
            },
            &request.amount,
        )?;

        let now = Utc::now();
        let refund = Refund {
            id: Uuid::new_v4(),
            payment_id,
            refund_reference: request.refund_reference.clone(),
            amount: request.amount.clone(),
            reason: request.reason.clone(),
            status: RefundStatus::Pending.as_str().to_string(),
            processed_by: request.processed_by,
            paystack_refund_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        state.refunds.push(refund.clone());
        Ok(refund)
    }

    async fn complete_refund(
        &self,
        refund_id: Uuid,
        gateway_refund_id: Option<&str>,
    ) -> Result<RefundSettlement, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        let refund = state
            .refunds
            .iter_mut()
            .find(|r| r.id == refund_id && r.is_pending())
            .ok_or_else(|| DatabaseError::not_found("Refund", refund_id))?;
        refund.status = RefundStatus::Processed.as_str().to_string();
        if let Some(id) = gateway_refund_id {
            refund.paystack_refund_id = Some(id.to_string());
        }
        refund.updated_at = Utc::now();
        let refund = refund.clone();

        let current = state.payments[&refund.payment_id].clone();
        let (refunded_amount, status) =
            settle_refund(&current.amount, &current.refunded_amount, &refund.amount);
        let payment = update_payment(&mut state, refund.payment_id, |p| {
            p.refunded_amount = refunded_amount;
            p.status = status.as_str().to_string();
        })?;

        let order_refunded = status == PaymentStatus::Refunded;
        if order_refunded {
            if let Some(order) = state.orders.get_mut(&payment.order_id) {
                order.payment_status = "refunded".to_string();
                order.status = "refunded".to_string();
            }
        }

        Ok(RefundSettlement {
            refund,
            payment,
            order_refunded,
        })
    }

    async fn fail_refund(&self, refund_id: Uuid, error: &str) -> Result<Refund, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        let refund = state
            .refunds
            .iter_mut()
            .find(|r| r.id == refund_id && r.is_pending())
            .ok_or_else(|| DatabaseError::not_found("Refund", refund_id))?;
        refund.status = RefundStatus::Failed.as_str().to_string();
        refund.error_message = Some(error.to_string());
        Ok(refund.clone())
    }

    async fn list_refunds(&self, payment_id: Uuid) -> Result<Vec<Refund>, DatabaseError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .refunds
            .iter()
            .filter(|r| r.payment_id == payment_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PaymentMethodStore for MemoryStore {
    async fn save_payment_method(
        &self,
        method: NewPaymentMethod,
    ) -> Result<CustomerPaymentMethod, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.methods.iter_mut().find(|m| {
            m.customer_id == method.customer_id
                && m.paystack_authorization_code == method.authorization_code
        }) {
            existing.paystack_customer_code = method.customer_code;
            existing.card_exp_month = method.card_exp_month;
            existing.card_exp_year = method.card_exp_year;
            existing.is_active = true;
            return Ok(existing.clone());
        }

        let has_default = state
            .methods
            .iter()
            .any(|m| m.customer_id == method.customer_id && m.is_default && m.is_active);
        let saved = CustomerPaymentMethod {
            id: Uuid::new_v4(),
            customer_id: method.customer_id,
            paystack_authorization_code: method.authorization_code,
            paystack_customer_code: method.customer_code,
            card_last4: method.card_last4,
            card_type: method.card_type,
            card_exp_month: method.card_exp_month,
            card_exp_year: method.card_exp_year,
            card_bank: method.card_bank,
            channel: method.channel,
            is_default: !has_default,
            is_active: true,
            created_at: Utc::now(),
        };
        state.methods.push(saved.clone());
        Ok(saved)
    }

    async fn list_payment_methods(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<CustomerPaymentMethod>, DatabaseError> {
        let mut methods: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .methods
            .iter()
            .filter(|m| m.customer_id == customer_id && m.is_active)
            .cloned()
            .collect();
        methods.sort_by(|a, b| b.is_default.cmp(&a.is_default));
        Ok(methods)
    }

    async fn find_active_by_authorization(
        &self,
        customer_id: Uuid,
        authorization_code: &str,
    ) -> Result<Option<CustomerPaymentMethod>, DatabaseError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .methods
            .iter()
            .find(|m| {
                m.customer_id == customer_id
                    && m.paystack_authorization_code == authorization_code
                    && m.is_active
            })
            .cloned())
    }

    async fn set_default_payment_method(
        &self,
        customer_id: Uuid,
        method_id: Uuid,
    ) -> Result<CustomerPaymentMethod, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        let exists = state
            .methods
            .iter()
            .any(|m| m.id == method_id && m.customer_id == customer_id && m.is_active);
        if !exists {
            return Err(DatabaseError::not_found("PaymentMethod", method_id));
        }

        let mut updated = None;
        for method in state.methods.iter_mut().filter(|m| m.customer_id == customer_id) {
            method.is_default = method.id == method_id;
            if method.is_default {
                updated = Some(method.clone());
            }
        }
        updated.ok_or_else(|| DatabaseError::not_found("PaymentMethod", method_id))
    }
}

#[async_trait]
impl WebhookLogStore for MemoryStore {
    async fn log_event(&self, event: NewWebhookLog) -> Result<(WebhookLog, bool), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        if let Some(gateway_event_id) = &event.gateway_event_id {
            if let Some(existing) = state.logs.iter().find(|l| {
                l.event_type == event.event_type
                    && l.gateway_event_id.as_ref() == Some(gateway_event_id)
            }) {
                return Ok((existing.clone(), false));
            }
        }

        let log = WebhookLog {
            id: Uuid::new_v4(),
            event_type: event.event_type,
            gateway_event_id: event.gateway_event_id,
            payment_id: event.payment_id,
            payload: event.payload,
            processed: false,
            processing_error: None,
            retry_count: 0,
            last_retry_at: None,
            processed_at: None,
            created_at: Utc::now(),
        };
        state.logs.push(log.clone());
        Ok((log, true))
    }

    async fn find_log(&self, id: Uuid) -> Result<Option<WebhookLog>, DatabaseError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .logs
            .iter()
            .find(|l| l.id == id)
            .cloned())
    }

    async fn mark_processed(
        &self,
        id: Uuid,
        payment_id: Option<Uuid>,
    ) -> Result<WebhookLog, DatabaseError> {
        self.update_log(id, |log| {
            log.processed = true;
            log.processed_at = Some(Utc::now());
            log.processing_error = None;
            if payment_id.is_some() {
                log.payment_id = payment_id;
            }
        })
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> Result<WebhookLog, DatabaseError> {
        self.update_log(id, |log| log.processing_error = Some(error.to_string()))
    }

    async fn record_retry_failure(
        &self,
        id: Uuid,
        error: &str,
    ) -> Result<WebhookLog, DatabaseError> {
        self.update_log(id, |log| {
            log.processing_error = Some(error.to_string());
            log.retry_count += 1;
            log.last_retry_at = Some(Utc::now());
        })
    }

    async fn list_unprocessed(
        &self,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<WebhookLog>, DatabaseError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .logs
            .iter()
            .filter(|l| {
                !l.processed && l.processing_error.is_some() && l.retry_count < max_retries
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

impl MemoryStore {
    fn update_log(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut WebhookLog),
    ) -> Result<WebhookLog, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        let log = state
            .logs
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| DatabaseError::not_found("WebhookLog", id))?;
        f(log);
        Ok(log.clone())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, DatabaseError> {
        Ok(self.state.lock().unwrap().orders.get(&id).cloned())
    }

    async fn find_customer(&self, id: Uuid) -> Result<Option<Customer>, DatabaseError> {
        Ok(self.state.lock().unwrap().customers.get(&id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

#[derive(Default)]
struct GatewayScript {
    /// reference -> amount the checkout was opened for
    sessions: HashMap<String, BigDecimal>,
    verify_status: Option<GatewayStatus>,
    verified_amount: Option<BigDecimal>,
    charge_status: Option<GatewayStatus>,
    fail_refunds: bool,
    fail_initialize: bool,
    next_refund_id: i64,
    refund_calls: Vec<(String, Option<BigDecimal>)>,
    verify_calls: usize,
}

/// Paystack stand-in. Webhook signatures use the real HMAC-SHA512 check.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<GatewayScript>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verify_reports(&self, status: GatewayStatus) {
        self.script.lock().unwrap().verify_status = Some(status);
    }

    pub fn verify_amount(&self, amount: BigDecimal) {
        self.script.lock().unwrap().verified_amount = Some(amount);
    }

    pub fn charge_reports(&self, status: GatewayStatus) {
        self.script.lock().unwrap().charge_status = Some(status);
    }

    pub fn fail_refunds(&self) {
        self.script.lock().unwrap().fail_refunds = true;
    }

    pub fn fail_initialize(&self) {
        self.script.lock().unwrap().fail_initialize = true;
    }

    pub fn refund_calls(&self) -> Vec<(String, Option<BigDecimal>)> {
        self.script.lock().unwrap().refund_calls.clone()
    }

    pub fn verify_calls(&self) -> usize {
        self.script.lock().unwrap().verify_calls
    }

    fn verification(reference: &str, status: GatewayStatus, amount: BigDecimal) -> TransactionVerification {
        TransactionVerification {
            id: 4_099_260_516,
            reference: reference.to_string(),
            status,
            amount,
            currency: "NGN".to_string(),
            channel: Some("card".to_string()),
            gateway_response: Some("Approved".to_string()),
            paid_at: Some("2024-01-15T10:30:00.000Z".to_string()),
            authorization: Some(CardAuthorization {
                authorization_code: CARD_AUTHORIZATION.to_string(),
                last4: Some("4081".to_string()),
                exp_month: Some("12".to_string()),
                exp_year: Some("2030".to_string()),
                card_type: Some("visa".to_string()),
                bank: Some("TEST BANK".to_string()),
                channel: Some("card".to_string()),
                reusable: true,
            }),
            customer: Some(GatewayCustomer {
                id: Some(1),
                customer_code: Some("CUS_test".to_string()),
                email: None,
            }),
            metadata: None,
        }
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initialize_transaction(
        &self,
        request: InitializeTransactionRequest,
    ) -> PaymentResult<TransactionSession> {
        let mut script = self.script.lock().unwrap();
        if script.fail_initialize {
            return Err(PaymentError::provider("Invalid key"));
        }
        script
            .sessions
            .insert(request.reference.clone(), request.amount.clone());
        Ok(TransactionSession {
            authorization_url: format!("https://checkout.paystack.com/{}", request.reference),
            access_code: format!("access_{}", request.reference),
            reference: request.reference,
        })
    }

    async fn verify_transaction(&self, reference: &str) -> PaymentResult<TransactionVerification> {
        let mut script = self.script.lock().unwrap();
        script.verify_calls += 1;
        let amount = script
            .verified_amount
            .clone()
            .or_else(|| script.sessions.get(reference).cloned())
            .ok_or_else(|| PaymentError::provider("Transaction reference not found"))?;
        let status = script.verify_status.clone().unwrap_or(GatewayStatus::Success);
        Ok(Self::verification(reference, status, amount))
    }

    async fn get_transaction(&self, transaction_id: i64) -> PaymentResult<TransactionVerification> {
        Err(PaymentError::provider(format!(
            "transaction {} not scripted",
            transaction_id
        )))
    }

    async fn refund_transaction(
        &self,
        transaction: &str,
        amount: Option<&BigDecimal>,
    ) -> PaymentResult<RefundReceipt> {
        let mut script = self.script.lock().unwrap();
        script
            .refund_calls
            .push((transaction.to_string(), amount.cloned()));
        if script.fail_refunds {
            return Err(PaymentError::provider("Transaction has been fully reversed"));
        }
        script.next_refund_id += 1;
        Ok(RefundReceipt {
            id: script.next_refund_id,
            status: "pending".to_string(),
            amount: amount.cloned().unwrap_or_else(BigDecimal::zero),
            currency: Some("NGN".to_string()),
        })
    }

    async fn charge_authorization(
        &self,
        request: ChargeAuthorizationRequest,
    ) -> PaymentResult<TransactionVerification> {
        let status = self
            .script
            .lock()
            .unwrap()
            .charge_status
            .clone()
            .unwrap_or(GatewayStatus::Success);
        let reference = request.reference.unwrap_or_default();
        let mut verification = Self::verification(&reference, status, request.amount);
        if verification.status == GatewayStatus::Failed {
            verification.gateway_response = Some("Declined".to_string());
        }
        Ok(verification)
    }

    async fn resolve_account(
        &self,
        account_number: &str,
        _bank_code: &str,
    ) -> PaymentResult<ResolvedAccount> {
        Ok(ResolvedAccount {
            account_number: account_number.to_string(),
            account_name: "ADA OBI".to_string(),
            bank_id: Some(9),
        })
    }

    async fn list_banks(&self) -> PaymentResult<Vec<Bank>> {
        Ok(vec![Bank {
            id: 9,
            name: "Test Bank".to_string(),
            code: "058".to_string(),
            slug: Some("test-bank".to_string()),
            country: Some("Nigeria".to_string()),
            currency: Some("NGN".to_string()),
            active: Some(true),
        }])
    }

    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> PaymentResult<CustomerProfile> {
        Ok(CustomerProfile {
            id: 1,
            customer_code: "CUS_test".to_string(),
            email: request.email,
            first_name: request.first_name,
            last_name: request.last_name,
        })
    }

    async fn submit_otp(&self, reference: &str, _otp: &str) -> PaymentResult<TransactionVerification> {
        self.verify_transaction(reference).await
    }

    fn name(&self) -> &'static str {
        "paystack"
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult> {
        let valid = verify_hmac_sha512_hex(payload, WEBHOOK_SECRET, signature);
        Ok(WebhookVerificationResult {
            valid,
            reason: if valid {
                None
            } else {
                Some("signature mismatch".to_string())
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<PaymentNotification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<PaymentNotification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &PaymentNotification) {
        self.sent.lock().unwrap().push(notification.clone());
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<ScriptedGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub processor: Arc<WebhookProcessor>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(ScriptedGateway::new());
        let notifier = Arc::new(RecordingNotifier::default());

        let orchestrator = Arc::new(PaymentOrchestrator::new(
            gateway.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            notifier.clone(),
            OrchestratorConfig::new("https://shop.test/payment/callback"),
        ));
        let processor = Arc::new(WebhookProcessor::new(
            gateway.clone(),
            store.clone(),
            store.clone(),
            orchestrator.clone(),
        ));

        Self {
            store,
            gateway,
            notifier,
            orchestrator,
            processor,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            orchestrator: self.orchestrator.clone(),
            webhooks: self.processor.clone(),
            jwt: JwtVerifier::new(JWT_SECRET),
            health: HealthChecker::new(vec![]),
            max_webhook_retries: 5,
        }
    }
}

pub fn charge_success_body(reference: &str, event_id: i64, amount_kobo: i64) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": "charge.success",
        "data": {
            "id": event_id,
            "reference": reference,
            "status": "success",
            "amount": amount_kobo,
            "currency": "NGN"
        }
    }))
    .expect("json serializes")
}

pub fn bearer_token(user_id: Uuid, role: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        email: Some("ada@example.com".to_string()),
        role: role.to_string(),
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("token encodes");
    format!("Bearer {}", token)
}
