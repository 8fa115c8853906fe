//! Unified error handling for the payments service
//!
//! Every failure surfaced by the service is one tagged variant of [`AppError`],
//! which carries the HTTP status, a machine-readable [`ErrorCode`] and a
//! client-safe message. Persistence driver messages never reach clients.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling by API clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "PAYMENT_NOT_FOUND")]
    PaymentNotFound,
    #[serde(rename = "ORDER_NOT_FOUND")]
    OrderNotFound,
    #[serde(rename = "REFUND_NOT_FOUND")]
    RefundNotFound,
    #[serde(rename = "CUSTOMER_NOT_FOUND")]
    CustomerNotFound,
    #[serde(rename = "PAYMENT_METHOD_NOT_FOUND")]
    PaymentMethodNotFound,
    #[serde(rename = "WEBHOOK_LOG_NOT_FOUND")]
    WebhookLogNotFound,
    #[serde(rename = "INVALID_PAYMENT_STATE")]
    InvalidPaymentState,
    #[serde(rename = "ORDER_ALREADY_PAID")]
    OrderAlreadyPaid,
    #[serde(rename = "AMOUNT_MISMATCH")]
    AmountMismatch,
    #[serde(rename = "MAX_RETRIES_EXCEEDED")]
    MaxRetriesExceeded,
    #[serde(rename = "REFUND_EXCEEDS_BALANCE")]
    RefundExceedsBalance,

    // Authentication errors
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,
    #[serde(rename = "FORBIDDEN")]
    Forbidden,
    #[serde(rename = "INVALID_SIGNATURE")]
    InvalidSignature,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (502, 429, 504)
    #[serde(rename = "PAYMENT_PROVIDER_ERROR")]
    PaymentProviderError,
    #[serde(rename = "RATE_LIMIT_ERROR")]
    RateLimitError,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Business rule violations and missing entities
#[derive(Debug, Clone)]
pub enum DomainError {
    /// No payment matches the id or gateway reference
    PaymentNotFound { reference: String },
    OrderNotFound { order_id: String },
    RefundNotFound { refund_id: String },
    CustomerNotFound { customer_id: String },
    /// Saved card missing, inactive or owned by another customer
    PaymentMethodNotFound { method_id: String },
    WebhookLogNotFound { log_id: String },
    /// Operation not allowed from the payment's current status
    InvalidPaymentState {
        payment_id: String,
        status: String,
        operation: String,
    },
    OrderAlreadyPaid { order_id: String },
    /// Gateway settled a different amount than the one recorded locally
    AmountMismatch { expected: String, received: String },
    MaxRetriesExceeded { log_id: String, retry_count: i32 },
}

/// Authentication and request authenticity failures
#[derive(Debug, Clone)]
pub enum AuthError {
    Unauthorized { reason: String },
    Forbidden { reason: String },
    /// Webhook signature missing or not matching the body
    InvalidSignature { reason: String },
}

/// Infrastructure-level errors (database, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    /// Database connection or query failure
    Database { message: String, is_retryable: bool },
    /// Missing or invalid configuration
    Configuration { message: String },
}

/// External service errors
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Payment gateway refused the call or returned a malformed response
    PaymentGateway {
        provider: String,
        message: String,
        is_retryable: bool,
    },
    /// Rate limit exceeded
    RateLimit {
        service: String,
        retry_after: Option<u64>,
    },
    /// External service timeout
    Timeout { service: String, timeout_secs: u64 },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Invalid amount (format or value)
    InvalidAmount { amount: String, reason: String },
    /// Required field missing
    MissingField { field: String },
    /// Field present but unusable
    InvalidField { field: String, reason: String },
    /// Refund larger than what is left on the payment
    RefundExceedsBalance { requested: String, available: String },
    /// Table or column name rejected by the query builder
    InvalidIdentifier { identifier: String },
    /// Field value out of acceptable range
    OutOfRange {
        field: String,
        min: Option<String>,
        max: Option<String>,
    },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Auth(AuthError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn domain(err: DomainError) -> Self {
        Self::new(AppErrorKind::Domain(err))
    }

    pub fn validation(err: ValidationError) -> Self {
        Self::new(AppErrorKind::Validation(err))
    }

    pub fn auth(err: AuthError) -> Self {
        Self::new(AppErrorKind::Auth(err))
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::PaymentNotFound { .. }
                | DomainError::OrderNotFound { .. }
                | DomainError::RefundNotFound { .. }
                | DomainError::CustomerNotFound { .. }
                | DomainError::PaymentMethodNotFound { .. }
                | DomainError::WebhookLogNotFound { .. } => 404,
                DomainError::InvalidPaymentState { .. } => 409,
                DomainError::OrderAlreadyPaid { .. } => 409,
                DomainError::AmountMismatch { .. } => 409,
                DomainError::MaxRetriesExceeded { .. } => 409,
            },
            AppErrorKind::Auth(err) => match err {
                AuthError::Unauthorized { .. } => 401,
                AuthError::Forbidden { .. } => 403,
                AuthError::InvalidSignature { .. } => 401,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway { .. } => 502, // Bad Gateway
                ExternalError::RateLimit { .. } => 429,
                ExternalError::Timeout { .. } => 504,
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::PaymentNotFound { .. } => ErrorCode::PaymentNotFound,
                DomainError::OrderNotFound { .. } => ErrorCode::OrderNotFound,
                DomainError::RefundNotFound { .. } => ErrorCode::RefundNotFound,
                DomainError::CustomerNotFound { .. } => ErrorCode::CustomerNotFound,
                DomainError::PaymentMethodNotFound { .. } => ErrorCode::PaymentMethodNotFound,
                DomainError::WebhookLogNotFound { .. } => ErrorCode::WebhookLogNotFound,
                DomainError::InvalidPaymentState { .. } => ErrorCode::InvalidPaymentState,
                DomainError::OrderAlreadyPaid { .. } => ErrorCode::OrderAlreadyPaid,
                DomainError::AmountMismatch { .. } => ErrorCode::AmountMismatch,
                DomainError::MaxRetriesExceeded { .. } => ErrorCode::MaxRetriesExceeded,
            },
            AppErrorKind::Auth(err) => match err {
                AuthError::Unauthorized { .. } => ErrorCode::Unauthorized,
                AuthError::Forbidden { .. } => ErrorCode::Forbidden,
                AuthError::InvalidSignature { .. } => ErrorCode::InvalidSignature,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway { .. } => ErrorCode::PaymentProviderError,
                ExternalError::RateLimit { .. } => ErrorCode::RateLimitError,
                ExternalError::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::RefundExceedsBalance { .. } => ErrorCode::RefundExceedsBalance,
                _ => ErrorCode::ValidationError,
            },
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::PaymentNotFound { reference } => {
                    format!("Payment '{}' not found", reference)
                }
                DomainError::OrderNotFound { order_id } => {
                    format!("Order '{}' not found", order_id)
                }
                DomainError::RefundNotFound { refund_id } => {
                    format!("Refund '{}' not found", refund_id)
                }
                DomainError::CustomerNotFound { customer_id } => {
                    format!("Customer '{}' not found", customer_id)
                }
                DomainError::PaymentMethodNotFound { method_id } => {
                    format!("Payment method '{}' not found", method_id)
                }
                DomainError::WebhookLogNotFound { log_id } => {
                    format!("Webhook event '{}' not found", log_id)
                }
                DomainError::InvalidPaymentState {
                    status, operation, ..
                } => {
                    format!("Cannot {} a payment with status '{}'", operation, status)
                }
                DomainError::OrderAlreadyPaid { order_id } => {
                    format!("Order '{}' has already been paid", order_id)
                }
                DomainError::AmountMismatch { expected, received } => {
                    format!(
                        "Paid amount {} does not match the expected amount {}",
                        received, expected
                    )
                }
                DomainError::MaxRetriesExceeded { retry_count, .. } => {
                    format!("Webhook event already retried {} times", retry_count)
                }
            },
            AppErrorKind::Auth(err) => match err {
                AuthError::Unauthorized { .. } => "Authentication required".to_string(),
                AuthError::Forbidden { .. } => {
                    "You do not have permission to perform this action".to_string()
                }
                AuthError::InvalidSignature { reason } => {
                    format!("Invalid webhook signature: {}", reason)
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway {
                    provider,
                    message,
                    is_retryable,
                } => {
                    if *is_retryable {
                        format!(
                            "Payment provider ({}) is temporarily unavailable. Please try again",
                            provider
                        )
                    } else {
                        format!("Payment provider ({}) rejected the request: {}", provider, message)
                    }
                }
                ExternalError::RateLimit {
                    service,
                    retry_after,
                } => match retry_after {
                    Some(secs) => format!(
                        "Rate limit exceeded for {}. Please try again in {} seconds",
                        service, secs
                    ),
                    None => format!(
                        "Rate limit exceeded for {}. Please try again later",
                        service
                    ),
                },
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => {
                    format!(
                        "{} request timed out after {} seconds. Please try again",
                        service, timeout_secs
                    )
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
                ValidationError::RefundExceedsBalance {
                    requested,
                    available,
                } => {
                    format!(
                        "Refund amount {} exceeds the refundable balance {}",
                        requested, available
                    )
                }
                ValidationError::InvalidIdentifier { identifier } => {
                    format!("Invalid identifier '{}'", identifier)
                }
                ValidationError::OutOfRange { field, min, max } => match (min, max) {
                    (Some(min), Some(max)) => {
                        format!("Field '{}' must be between {} and {}", field, min, max)
                    }
                    (Some(min), None) => format!("Field '{}' must be at least {}", field, min),
                    (None, Some(max)) => format!("Field '{}' must be at most {}", field, max),
                    (None, None) => format!("Field '{}' is out of acceptable range", field),
                },
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) | AppErrorKind::Auth(_) | AppErrorKind::Validation(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway { is_retryable, .. } => *is_retryable,
                ExternalError::RateLimit { .. } => true,
                ExternalError::Timeout { .. } => true,
            },
        }
    }

    /// True for the not-found family of domain errors
    pub fn is_not_found(&self) -> bool {
        self.status_code() == 404
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            // keep the driver detail in logs, not in user_message
            AppErrorKind::Infrastructure(InfrastructureError::Database { message, .. }) => {
                write!(f, "database error: {}", message)
            }
            AppErrorKind::Infrastructure(InfrastructureError::Configuration { message }) => {
                write!(f, "configuration error: {}", message)
            }
            _ => write!(f, "{}", self.user_message()),
        }
    }
}

impl std::error::Error for AppError {}

// From<DatabaseError> lives in database/error.rs, From<PaymentError> in payments/error.rs

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
