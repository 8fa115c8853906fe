//! Refund arithmetic shared by every payment store.
//!
//! Stores call [`assess_refund`] while holding the payment row lock and
//! [`settle_refund`] when the gateway confirms, so the bound
//! `refunded_amount <= amount` holds no matter which store backs the service.

use crate::error::{AppError, AppResult, DomainError, ValidationError};
use crate::payments::types::PaymentStatus;
use bigdecimal::{BigDecimal, Zero};

/// Snapshot of a payment's money at the time a refund is requested.
#[derive(Debug, Clone)]
pub struct RefundLedger<'a> {
    pub payment_id: &'a str,
    pub status: PaymentStatus,
    pub amount: &'a BigDecimal,
    pub refunded_amount: &'a BigDecimal,
    /// Sum of refunds sent to the gateway but not yet settled.
    pub pending_refunds: &'a BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundAssessment {
    pub available: BigDecimal,
    /// The refund would return the whole remaining balance.
    pub is_full: bool,
}

pub fn assess_refund(ledger: &RefundLedger<'_>, requested: &BigDecimal) -> AppResult<RefundAssessment> {
    if requested <= &BigDecimal::zero() {
        return Err(AppError::validation(ValidationError::InvalidAmount {
            amount: requested.to_string(),
            reason: "refund amount must be greater than zero".to_string(),
        }));
    }

    if !ledger.status.is_refundable() {
        return Err(AppError::domain(DomainError::InvalidPaymentState {
            payment_id: ledger.payment_id.to_string(),
            status: ledger.status.to_string(),
            operation: "refund".to_string(),
        }));
    }

    let available = ledger.amount - ledger.refunded_amount - ledger.pending_refunds;
    if requested > &available {
        return Err(AppError::validation(ValidationError::RefundExceedsBalance {
            requested: requested.with_scale(2).to_string(),
            available: available.with_scale(2).to_string(),
        }));
    }

    Ok(RefundAssessment {
        is_full: requested == &available,
        available,
    })
}

/// New `refunded_amount` and status once a refund of `refund_amount` settles.
pub fn settle_refund(
    amount: &BigDecimal,
    refunded_amount: &BigDecimal,
    refund_amount: &BigDecimal,
) -> (BigDecimal, PaymentStatus) {
    let total = refunded_amount + refund_amount;
    let status = if &total >= amount {
        PaymentStatus::Refunded
    } else {
        PaymentStatus::PartiallyRefunded
    };
    (total, status)
}
