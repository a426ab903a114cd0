use crate::core::ids::{InstallmentId, MerchantId, TransactionId};
use crate::core::transaction::{InstallmentStatus, TransactionStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The only failure reasons ever shown to an end customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerReason {
    QuoteExpired,
    PaymentDeclined,
    SelectionInvalid,
    TemporarilyUnavailable,
}

impl fmt::Display for CustomerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CustomerReason::QuoteExpired => "quote expired or altered",
            CustomerReason::PaymentDeclined => "payment declined",
            CustomerReason::SelectionInvalid => "selection invalid",
            CustomerReason::TemporarilyUnavailable => "temporarily unavailable",
        };
        f.write_str(text)
    }
}

/// Merchant configuration is missing or unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("no configuration for merchant {0}")]
    UnknownMerchant(MerchantId),
    #[error("configuration source unavailable: {0}")]
    Unavailable(String),
}

/// A customer's installment selection cannot be validated against the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("no installments selected")]
    Empty,
    #[error("installment {0} is not part of this transaction")]
    UnknownInstallment(InstallmentId),
    #[error("installment {installment} belongs to transaction {owner}")]
    WrongTransaction {
        installment: InstallmentId,
        owner: TransactionId,
    },
    #[error("installment {0} is already settled")]
    AlreadySettled(InstallmentId),
    #[error("installment {id} cannot be paid early while {status:?}")]
    NotPayable {
        id: InstallmentId,
        status: InstallmentStatus,
    },
    #[error("installment {0} selected more than once")]
    Duplicate(InstallmentId),
}

/// A request is malformed or stale. Always raised before any side effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),
    #[error("transaction {id} is {status:?}")]
    TransactionNotActive {
        id: TransactionId,
        status: TransactionStatus,
    },
    #[error("transaction has nothing left to pay early")]
    NothingOutstanding,
    #[error("merchant {0} does not allow partial early payments")]
    PartialNotAllowed(MerchantId),
    #[error("a full payment cannot name individual installments")]
    UnexpectedSelection,
    #[error("declared amount {declared} does not match {expected}")]
    AmountMismatch { declared: Decimal, expected: Decimal },
    #[error("quoted final amount {quoted} no longer matches {current}")]
    QuoteMismatch { quoted: Decimal, current: Decimal },
    #[error(transparent)]
    Selection(#[from] SelectionError),
}

/// The payment gateway did not capture the charge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("payment declined: {reason}")]
    Declined { reason: String },
    #[error("capture temporarily failed: {reason}")]
    Retryable { reason: String, retry_after: Duration },
    #[error("capture timed out")]
    TimedOut,
    #[error("capture cancelled")]
    Cancelled,
}

impl CaptureError {
    /// How long the gateway asks us to wait before retrying, if at all.
    pub fn retry_hint(&self) -> Option<Duration> {
        match self {
            CaptureError::Retryable { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

/// The installment ledger rejected or failed a read or write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("transaction {0} not found in ledger")]
    TransactionNotFound(TransactionId),
    #[error("installments already settled on {transaction_id}: {installments:?}")]
    AlreadySettled {
        transaction_id: TransactionId,
        installments: Vec<InstallmentId>,
    },
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// The audit sink could not accept a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Every error the engine can surface to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

impl From<SelectionError> for EngineError {
    fn from(err: SelectionError) -> Self {
        EngineError::Validation(ValidationError::Selection(err))
    }
}

impl EngineError {
    /// The stable, customer-safe reason for this failure.
    pub fn customer_reason(&self) -> CustomerReason {
        match self {
            EngineError::Validation(err) => err.customer_reason(),
            EngineError::Capture(err) => err.customer_reason(),
            EngineError::Configuration(_)
            | EngineError::Ledger(_)
            | EngineError::Audit(_)
            | EngineError::Unavailable(_) => CustomerReason::TemporarilyUnavailable,
        }
    }
}

impl ValidationError {
    pub fn customer_reason(&self) -> CustomerReason {
        match self {
            ValidationError::AmountMismatch { .. }
            | ValidationError::QuoteMismatch { .. }
            | ValidationError::TransactionNotActive { .. }
            | ValidationError::NothingOutstanding => CustomerReason::QuoteExpired,
            ValidationError::Selection(SelectionError::AlreadySettled(_))
            | ValidationError::Selection(SelectionError::NotPayable { .. }) => {
                CustomerReason::QuoteExpired
            }
            ValidationError::TransactionNotFound(_)
            | ValidationError::PartialNotAllowed(_)
            | ValidationError::UnexpectedSelection
            | ValidationError::Selection(_) => CustomerReason::SelectionInvalid,
        }
    }
}

impl CaptureError {
    pub fn customer_reason(&self) -> CustomerReason {
        match self {
            CaptureError::Declined { .. } => CustomerReason::PaymentDeclined,
            CaptureError::Retryable { .. } | CaptureError::TimedOut | CaptureError::Cancelled => {
                CustomerReason::TemporarilyUnavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_customer_reason_text_is_stable() {
        assert_eq!(CustomerReason::QuoteExpired.to_string(), "quote expired or altered");
        assert_eq!(CustomerReason::PaymentDeclined.to_string(), "payment declined");
        assert_eq!(CustomerReason::SelectionInvalid.to_string(), "selection invalid");
        assert_eq!(
            CustomerReason::TemporarilyUnavailable.to_string(),
            "temporarily unavailable"
        );
    }

    #[test]
    fn test_amount_mismatch_reads_as_expired_quote() {
        let err: EngineError = ValidationError::AmountMismatch {
            declared: dec!(100),
            expected: dec!(90),
        }
        .into();
        assert_eq!(err.customer_reason(), CustomerReason::QuoteExpired);
    }

    #[test]
    fn test_selection_error_converts() {
        let err: EngineError = SelectionError::Empty.into();
        assert_eq!(err.customer_reason(), CustomerReason::SelectionInvalid);
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::Selection(SelectionError::Empty))
        ));
    }

    #[test]
    fn test_internal_detail_is_hidden() {
        let err: EngineError = LedgerError::Unavailable("db shard 3 down".into()).into();
        assert_eq!(err.customer_reason(), CustomerReason::TemporarilyUnavailable);
        assert!(!err.customer_reason().to_string().contains("shard"));
    }

    #[test]
    fn test_retry_hint() {
        let err = CaptureError::Retryable {
            reason: "rate limited".into(),
            retry_after: Duration::from_millis(50),
        };
        assert_eq!(err.retry_hint(), Some(Duration::from_millis(50)));
        assert_eq!(CaptureError::TimedOut.retry_hint(), None);
    }
}
