use crate::error::{AppError, AppErrorKind, DomainError, InfrastructureError, ValidationError};
use std::fmt;

/// Postgres error codes we branch on.
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

#[derive(Debug, Clone)]
pub enum DatabaseErrorKind {
    NotFound { entity: String, id: String },
    UniqueViolation { constraint: Option<String> },
    ForeignKeyViolation { constraint: Option<String> },
    CheckViolation { constraint: Option<String> },
    /// Serialization failure or deadlock; safe to run the transaction again
    TransactionConflict { message: String },
    ConnectionError { message: String },
    PoolExhausted,
    InvalidIdentifier { identifier: String },
    Unknown { message: String },
}

#[derive(Debug, Clone)]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::new(DatabaseErrorKind::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        })
    }

    pub fn from_sqlx(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => DatabaseErrorKind::NotFound {
                entity: "row".to_string(),
                id: "unknown".to_string(),
            },
            sqlx::Error::PoolTimedOut => DatabaseErrorKind::PoolExhausted,
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                DatabaseErrorKind::ConnectionError {
                    message: err.to_string(),
                }
            }
            sqlx::Error::Database(db_err) => {
                let constraint = db_err.constraint().map(|c| c.to_string());
                match db_err.code().as_deref() {
                    Some(UNIQUE_VIOLATION) => DatabaseErrorKind::UniqueViolation { constraint },
                    Some(FOREIGN_KEY_VIOLATION) => {
                        DatabaseErrorKind::ForeignKeyViolation { constraint }
                    }
                    Some(CHECK_VIOLATION) => DatabaseErrorKind::CheckViolation { constraint },
                    Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                        DatabaseErrorKind::TransactionConflict {
                            message: db_err.message().to_string(),
                        }
                    }
                    _ => DatabaseErrorKind::Unknown {
                        message: db_err.message().to_string(),
                    },
                }
            }
            _ => DatabaseErrorKind::Unknown {
                message: err.to_string(),
            },
        };
        Self { kind }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            DatabaseErrorKind::ConnectionError { .. }
                | DatabaseErrorKind::PoolExhausted
                | DatabaseErrorKind::TransactionConflict { .. }
        )
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::UniqueViolation { .. })
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DatabaseErrorKind::NotFound { entity, id } => write!(f, "{} '{}' not found", entity, id),
            DatabaseErrorKind::UniqueViolation { constraint } => {
                write!(f, "unique constraint violated: {:?}", constraint)
            }
            DatabaseErrorKind::ForeignKeyViolation { constraint } => {
                write!(f, "foreign key constraint violated: {:?}", constraint)
            }
            DatabaseErrorKind::CheckViolation { constraint } => {
                write!(f, "check constraint violated: {:?}", constraint)
            }
            DatabaseErrorKind::TransactionConflict { message } => {
                write!(f, "transaction conflict: {}", message)
            }
            DatabaseErrorKind::ConnectionError { message } => {
                write!(f, "connection error: {}", message)
            }
            DatabaseErrorKind::PoolExhausted => write!(f, "connection pool exhausted"),
            DatabaseErrorKind::InvalidIdentifier { identifier } => {
                write!(f, "invalid SQL identifier: {}", identifier)
            }
            DatabaseErrorKind::Unknown { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for DatabaseError {}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        let kind = match &err.kind {
            DatabaseErrorKind::NotFound { entity, id } => {
                let id = id.clone();
                AppErrorKind::Domain(match entity.as_str() {
                    "Order" => DomainError::OrderNotFound { order_id: id },
                    "Refund" => DomainError::RefundNotFound { refund_id: id },
                    "Customer" => DomainError::CustomerNotFound { customer_id: id },
                    "PaymentMethod" => DomainError::PaymentMethodNotFound { method_id: id },
                    "WebhookLog" => DomainError::WebhookLogNotFound { log_id: id },
                    _ => DomainError::PaymentNotFound { reference: id },
                })
            }
            DatabaseErrorKind::InvalidIdentifier { identifier } => {
                AppErrorKind::Validation(ValidationError::InvalidIdentifier {
                    identifier: identifier.clone(),
                })
            }
            _ => AppErrorKind::Infrastructure(InfrastructureError::Database {
                message: err.to_string(),
                is_retryable: err.is_retryable(),
            }),
        };
        AppError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = DatabaseError::from_sqlx(sqlx::Error::RowNotFound);
        assert!(matches!(err.kind, DatabaseErrorKind::NotFound { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn pool_timeout_is_retryable() {
        let err = DatabaseError::from_sqlx(sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
        let app: AppError = err.into();
        assert_eq!(app.status_code(), 500);
        assert!(app.is_retryable());
    }

    #[test]
    fn entity_not_found_maps_to_domain_error() {
        let app: AppError = DatabaseError::not_found("Order", "o-1").into();
        assert_eq!(app.error_code(), ErrorCode::OrderNotFound);
        assert_eq!(app.status_code(), 404);

        let app: AppError = DatabaseError::not_found("WebhookLog", "w-1").into();
        assert_eq!(app.error_code(), ErrorCode::WebhookLogNotFound);
    }
}
