use crate::core::currency::CurrencyCode;
use crate::core::error::CustomerReason;
use crate::core::idempotency::IdempotencyKey;
use crate::core::ids::{InstallmentId, TransactionId};
use crate::core::option::{EarlyPaymentOption, PaymentType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// States of a single commit attempt.
///
/// ```text
/// received -> validating -> capturing -> settling -> completed
///                 |             |
///                 |             +-> capture_failed
///                 +-> rejected
///                 +-> pending_approval
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitState {
    Received,
    Validating,
    Capturing,
    Settling,
    Completed,
    Rejected,
    CaptureFailed,
    PendingApproval,
}

impl CommitState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CommitState::Completed
                | CommitState::Rejected
                | CommitState::CaptureFailed
                | CommitState::PendingApproval
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: CommitState) -> bool {
        use CommitState::*;
        matches!(
            (self, next),
            (Received, Validating)
                | (Validating, Capturing)
                | (Validating, Rejected)
                | (Validating, PendingApproval)
                | (Capturing, Settling)
                | (Capturing, CaptureFailed)
                | (Settling, Completed)
        )
    }

    /// The caller-visible status for a commit that stopped in this state.
    pub fn status(self) -> EarlyPaymentStatus {
        match self {
            CommitState::Completed => EarlyPaymentStatus::Completed,
            CommitState::Rejected | CommitState::CaptureFailed => EarlyPaymentStatus::Failed,
            CommitState::PendingApproval => EarlyPaymentStatus::PendingApproval,
            CommitState::Received
            | CommitState::Validating
            | CommitState::Capturing
            | CommitState::Settling => EarlyPaymentStatus::Processing,
        }
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CommitState::Received => "received",
            CommitState::Validating => "validating",
            CommitState::Capturing => "capturing",
            CommitState::Settling => "settling",
            CommitState::Completed => "completed",
            CommitState::Rejected => "rejected",
            CommitState::CaptureFailed => "capture_failed",
            CommitState::PendingApproval => "pending_approval",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarlyPaymentStatus {
    Processing,
    Completed,
    Failed,
    PendingApproval,
}

/// Durable, append-only audit artifact for one commit attempt.
///
/// A snapshot is appended to the audit sink at every state transition, so
/// the sink holds the full history of the attempt under one `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyPaymentRecord {
    pub id: Uuid,
    pub idempotency_key: IdempotencyKey,
    pub transaction_id: TransactionId,
    pub payment_type: PaymentType,
    pub currency: CurrencyCode,
    pub state: CommitState,
    pub status: EarlyPaymentStatus,
    pub original_amount: Decimal,
    pub discount_amount: Decimal,
    pub processing_fee: Decimal,
    pub amount_charged: Decimal,
    /// Installments settled by this attempt; empty unless completed.
    pub settled_installments: Vec<InstallmentId>,
    pub capture_reference: Option<String>,
    pub customer_reason: Option<CustomerReason>,
    /// Internal failure detail; never shown to the customer.
    pub detail: Option<String>,
    /// Money was captured but the ledger write did not go through.
    pub reconciliation_required: bool,
    pub recorded_at: DateTime<Utc>,
}

impl EarlyPaymentRecord {
    pub fn received(
        idempotency_key: IdempotencyKey,
        transaction_id: TransactionId,
        payment_type: PaymentType,
        declared_amount: Decimal,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            idempotency_key,
            transaction_id,
            payment_type,
            currency: CurrencyCode::default(),
            state: CommitState::Received,
            status: EarlyPaymentStatus::Processing,
            original_amount: declared_amount,
            discount_amount: Decimal::ZERO,
            processing_fee: Decimal::ZERO,
            amount_charged: Decimal::ZERO,
            settled_installments: Vec::new(),
            capture_reference: None,
            customer_reason: None,
            detail: None,
            reconciliation_required: false,
            recorded_at: at,
        }
    }

    /// Copy the re-derived quote's amounts onto the record.
    pub fn apply_quote(&mut self, option: &EarlyPaymentOption) {
        self.currency = option.currency.clone();
        self.original_amount = option.original_amount;
        self.discount_amount = option.discount_amount;
        self.processing_fee = option.processing_fee;
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Synchronous answer to a quote or commit call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyPaymentResult {
    /// Present for commits; quotes have no record.
    pub record_id: Option<Uuid>,
    pub transaction_id: TransactionId,
    pub state: CommitState,
    pub status: EarlyPaymentStatus,
    pub original_amount: Decimal,
    pub discount_amount: Decimal,
    pub processing_fee: Decimal,
    pub final_amount: Decimal,
    pub amount_charged: Decimal,
    pub settled_installments: Vec<InstallmentId>,
    pub customer_reason: Option<CustomerReason>,
    /// True when this answer is a replay of an earlier identical commit.
    pub replayed: bool,
}

impl EarlyPaymentResult {
    /// A side-effect-free quote built from a freshly derived option.
    pub fn quote(option: &EarlyPaymentOption) -> Self {
        Self {
            record_id: None,
            transaction_id: option.transaction_id.clone(),
            state: CommitState::Validating,
            status: EarlyPaymentStatus::Processing,
            original_amount: option.original_amount,
            discount_amount: option.discount_amount,
            processing_fee: option.processing_fee,
            final_amount: option.final_amount,
            amount_charged: Decimal::ZERO,
            settled_installments: Vec::new(),
            customer_reason: None,
            replayed: false,
        }
    }

    pub fn from_record(record: &EarlyPaymentRecord, replayed: bool) -> Self {
        Self {
            record_id: Some(record.id),
            transaction_id: record.transaction_id.clone(),
            state: record.state,
            status: record.status,
            original_amount: record.original_amount,
            discount_amount: record.discount_amount,
            processing_fee: record.processing_fee,
            final_amount: record.original_amount - record.discount_amount,
            amount_charged: record.amount_charged,
            settled_installments: record.settled_installments.clone(),
            customer_reason: record.customer_reason,
            replayed,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == EarlyPaymentStatus::Completed
    }
}
