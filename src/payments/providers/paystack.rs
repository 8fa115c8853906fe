use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{
    from_minor_units, to_minor_units, validate_positive_amount, Bank, CardAuthorization,
    ChargeAuthorizationRequest, CreateCustomerRequest, CustomerProfile, GatewayCustomer,
    GatewayStatus, InitializeTransactionRequest, RefundReceipt, ResolvedAccount,
    TransactionSession, TransactionVerification, WebhookVerificationResult, DEFAULT_CHANNELS,
    DEFAULT_CURRENCY,
};
use crate::payments::utils::{verify_hmac_sha512_hex, PaymentHttpClient};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{info, warn};

const PROVIDER: &str = "paystack";
/// Upper bound on `PAYSTACK_MAX_RETRIES`.
const MAX_RETRIES_CAP: u32 = 10;

#[derive(Clone)]
pub struct PaystackConfig {
    pub public_key: Option<String>,
    pub secret_key: String,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl std::fmt::Debug for PaystackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaystackConfig")
            .field("public_key", &self.public_key)
            .field("secret_key", &"<redacted>")
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Default for PaystackConfig {
    fn default() -> Self {
        Self {
            public_key: None,
            secret_key: String::new(),
            webhook_secret: None,
            base_url: "https://api.paystack.co".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl PaystackConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let secret_key =
            std::env::var("PAYSTACK_SECRET_KEY").map_err(|_| PaymentError::ValidationError {
                message: "PAYSTACK_SECRET_KEY environment variable is required".to_string(),
                field: Some("PAYSTACK_SECRET_KEY".to_string()),
            })?;

        Ok(Self {
            public_key: std::env::var("PAYSTACK_PUBLIC_KEY").ok(),
            webhook_secret: std::env::var("PAYSTACK_WEBHOOK_SECRET")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            base_url: std::env::var("PAYSTACK_BASE_URL")
                .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
            timeout_secs: std::env::var("PAYSTACK_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("PAYSTACK_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3)
                .min(MAX_RETRIES_CAP),
            secret_key,
        })
    }

    /// Webhooks are signed with the dedicated secret when one is configured.
    fn signing_secret(&self) -> &str {
        self.webhook_secret
            .as_deref()
            .unwrap_or(&self.secret_key)
    }
}

pub struct PaystackProvider {
    config: PaystackConfig,
    http: PaymentHttpClient,
}

impl PaystackProvider {
    pub fn new(config: PaystackConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(
            PROVIDER,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(PaystackConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&JsonValue>,
        query: &[(&str, &str)],
    ) -> PaymentResult<T> {
        let raw: PaystackEnvelope<T> = self
            .http
            .request_json(
                method,
                &self.endpoint(path),
                Some(&self.config.secret_key),
                body,
                query,
            )
            .await?;
        raw.into_data()
    }
}

#[async_trait]
impl PaymentGateway for PaystackProvider {
    async fn initialize_transaction(
        &self,
        request: InitializeTransactionRequest,
    ) -> PaymentResult<TransactionSession> {
        validate_positive_amount(&request.amount, "amount")?;
        if request.email.trim().is_empty() {
            return Err(PaymentError::ValidationError {
                message: "customer email is required for paystack initialization".to_string(),
                field: Some("email".to_string()),
            });
        }

        let channels = request
            .channels
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect());

        let payload = serde_json::json!({
            "email": request.email,
            "amount": to_minor_units(&request.amount)?,
            "currency": request.currency.as_deref().unwrap_or(DEFAULT_CURRENCY),
            "reference": request.reference,
            "callback_url": request.callback_url,
            "metadata": request.metadata,
            "channels": channels,
        });

        let data: PaystackInitializeData = self
            .call(Method::POST, "/transaction/initialize", Some(&payload), &[])
            .await?;
        info!(reference = %data.reference, "paystack transaction initialized");

        Ok(TransactionSession {
            authorization_url: data.authorization_url,
            access_code: data.access_code,
            reference: data.reference,
        })
    }

    async fn verify_transaction(&self, reference: &str) -> PaymentResult<TransactionVerification> {
        if reference.trim().is_empty() {
            return Err(PaymentError::ValidationError {
                message: "reference is required".to_string(),
                field: Some("reference".to_string()),
            });
        }
        let data: PaystackTransactionData = self
            .call(
                Method::GET,
                &format!("/transaction/verify/{}", reference),
                None,
                &[],
            )
            .await?;
        Ok(data.into())
    }

    async fn get_transaction(&self, transaction_id: i64) -> PaymentResult<TransactionVerification> {
        let data: PaystackTransactionData = self
            .call(
                Method::GET,
                &format!("/transaction/{}", transaction_id),
                None,
                &[],
            )
            .await?;
        Ok(data.into())
    }

    async fn refund_transaction(
        &self,
        transaction: &str,
        amount: Option<&BigDecimal>,
    ) -> PaymentResult<RefundReceipt> {
        let mut payload = serde_json::json!({ "transaction": transaction });
        if let Some(amount) = amount {
            validate_positive_amount(amount, "amount")?;
            payload["amount"] = serde_json::json!(to_minor_units(amount)?);
        }

        let data: PaystackRefundData = self
            .call(Method::POST, "/refund", Some(&payload), &[])
            .await?;
        info!(transaction = %transaction, refund_id = data.id, status = %data.status, "paystack refund created");

        Ok(RefundReceipt {
            id: data.id,
            status: data.status,
            amount: from_minor_units(data.amount),
            currency: data.currency,
        })
    }

    async fn charge_authorization(
        &self,
        request: ChargeAuthorizationRequest,
    ) -> PaymentResult<TransactionVerification> {
        validate_positive_amount(&request.amount, "amount")?;
        let payload = serde_json::json!({
            "authorization_code": request.authorization_code,
            "email": request.email,
            "amount": to_minor_units(&request.amount)?,
            "reference": request.reference,
            "currency": request.currency.as_deref().unwrap_or(DEFAULT_CURRENCY),
            "metadata": request.metadata,
        });

        let data: PaystackTransactionData = self
            .call(
                Method::POST,
                "/transaction/charge_authorization",
                Some(&payload),
                &[],
            )
            .await?;
        Ok(data.into())
    }

    async fn resolve_account(
        &self,
        account_number: &str,
        bank_code: &str,
    ) -> PaymentResult<ResolvedAccount> {
        self.call(
            Method::GET,
            "/bank/resolve",
            None,
            &[("account_number", account_number), ("bank_code", bank_code)],
        )
        .await
    }

    async fn list_banks(&self) -> PaymentResult<Vec<Bank>> {
        self.call(Method::GET, "/bank", None, &[]).await
    }

    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> PaymentResult<CustomerProfile> {
        let payload = serde_json::json!({
            "email": request.email,
            "first_name": request.first_name,
            "last_name": request.last_name,
            "phone": request.phone,
        });
        self.call(Method::POST, "/customer", Some(&payload), &[])
            .await
    }

    async fn submit_otp(
        &self,
        reference: &str,
        otp: &str,
    ) -> PaymentResult<TransactionVerification> {
        let payload = serde_json::json!({ "otp": otp, "reference": reference });
        let data: PaystackTransactionData = self
            .call(Method::POST, "/charge/submit_otp", Some(&payload), &[])
            .await?;
        Ok(data.into())
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult> {
        let valid = verify_hmac_sha512_hex(payload, self.config.signing_secret(), signature);
        if !valid {
            warn!("paystack webhook signature mismatch");
        }
        Ok(WebhookVerificationResult {
            valid,
            reason: if valid {
                None
            } else {
                Some("invalid paystack signature".to_string())
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct PaystackEnvelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

impl<T> PaystackEnvelope<T> {
    fn into_data(self) -> PaymentResult<T> {
        if !self.status {
            return Err(PaymentError::provider(self.message));
        }
        self.data
            .ok_or_else(|| PaymentError::provider(format!("{} (response had no data)", self.message)))
    }
}

#[derive(Debug, Deserialize)]
struct PaystackInitializeData {
    authorization_url: String,
    access_code: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct PaystackTransactionData {
    #[serde(default)]
    id: i64,
    reference: String,
    status: String,
    amount: i64,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    gateway_response: Option<String>,
    #[serde(default, alias = "paidAt")]
    paid_at: Option<String>,
    // `{}` on abandoned transactions, so parsed leniently
    #[serde(default)]
    authorization: Option<JsonValue>,
    #[serde(default)]
    customer: Option<GatewayCustomer>,
    #[serde(default)]
    metadata: Option<JsonValue>,
}

impl From<PaystackTransactionData> for TransactionVerification {
    fn from(data: PaystackTransactionData) -> Self {
        let authorization = data
            .authorization
            .and_then(|v| serde_json::from_value::<CardAuthorization>(v).ok())
            .filter(|a| !a.authorization_code.is_empty());

        TransactionVerification {
            id: data.id,
            reference: data.reference,
            status: GatewayStatus::parse(&data.status),
            amount: from_minor_units(data.amount),
            currency: data
                .currency
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            channel: data.channel,
            gateway_response: data.gateway_response,
            paid_at: data.paid_at,
            authorization,
            customer: data.customer,
            metadata: data.metadata.filter(|m| m.is_object()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PaystackRefundData {
    id: i64,
    status: String,
    amount: i64,
    #[serde(default)]
    currency: Option<String>,
}
