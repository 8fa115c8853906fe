use crate::payments::error::PaymentResult;
use crate::payments::types::{
    Bank, ChargeAuthorizationRequest, CreateCustomerRequest, CustomerProfile,
    InitializeTransactionRequest, RefundReceipt, ResolvedAccount, TransactionSession,
    TransactionVerification, WebhookVerificationResult,
};
use async_trait::async_trait;
use bigdecimal::BigDecimal;

/// Card/bank payment gateway used by the orchestrator.
///
/// Amounts crossing this boundary are in major units; implementations
/// convert to whatever the wire format wants.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize_transaction(
        &self,
        request: InitializeTransactionRequest,
    ) -> PaymentResult<TransactionSession>;

    async fn verify_transaction(&self, reference: &str) -> PaymentResult<TransactionVerification>;

    async fn get_transaction(&self, transaction_id: i64) -> PaymentResult<TransactionVerification>;

    /// Full refund when `amount` is `None`.
    async fn refund_transaction(
        &self,
        transaction: &str,
        amount: Option<&BigDecimal>,
    ) -> PaymentResult<RefundReceipt>;

    async fn charge_authorization(
        &self,
        request: ChargeAuthorizationRequest,
    ) -> PaymentResult<TransactionVerification>;

    async fn resolve_account(
        &self,
        account_number: &str,
        bank_code: &str,
    ) -> PaymentResult<ResolvedAccount>;

    async fn list_banks(&self) -> PaymentResult<Vec<Bank>>;

    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> PaymentResult<CustomerProfile>;

    async fn submit_otp(&self, reference: &str, otp: &str)
        -> PaymentResult<TransactionVerification>;

    fn name(&self) -> &'static str;

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult>;
}
