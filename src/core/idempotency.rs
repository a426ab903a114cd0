use crate::core::currency::round_money;
use crate::core::ids::{InstallmentId, TransactionId};
use crate::core::option::{EarlyPaymentOption, EarlyPaymentRequest};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Deterministic key identifying one logical early payment.
///
/// Derived from the transaction, the selected installments (order-insensitive)
/// and the declared amount. Two submissions of the same intent always produce
/// the same key, so the gateway and the committer can recognise a retry.
///
/// ```
/// use early_payment_engine::core::idempotency::IdempotencyKey;
/// use early_payment_engine::core::ids::{InstallmentId, TransactionId};
/// use rust_decimal_macros::dec;
///
/// let txn = TransactionId::new("TXN-1");
/// let a = IdempotencyKey::derive(&txn, &[InstallmentId::new("I-2"), InstallmentId::new("I-1")], dec!(100));
/// let b = IdempotencyKey::derive(&txn, &[InstallmentId::new("I-1"), InstallmentId::new("I-2")], dec!(100.00));
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn derive(
        transaction_id: &TransactionId,
        installment_ids: &[InstallmentId],
        amount: Decimal,
    ) -> Self {
        let mut ids: Vec<&str> = installment_ids.iter().map(|id| id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();

        let mut hasher = Sha256::new();
        hasher.update(transaction_id.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(ids.join(",").as_bytes());
        hasher.update(b"\n");
        hasher.update(format!("{:.2}", round_money(amount)).as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Key of the request as submitted.
    ///
    /// A full payoff names no installments, so this identifies the intent
    /// only; it is not safe as a capture key.
    pub fn for_request(request: &EarlyPaymentRequest) -> Self {
        Self::derive(
            &request.transaction_id,
            &request.installment_ids,
            request.declared_amount,
        )
    }

    /// Key of the commit `request` resolves to: the installments the
    /// re-derived `option` actually targets, plus the declared amount.
    pub fn for_commit(request: &EarlyPaymentRequest, option: &EarlyPaymentOption) -> Self {
        Self::derive(
            &request.transaction_id,
            &option.installment_ids,
            request.declared_amount,
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
