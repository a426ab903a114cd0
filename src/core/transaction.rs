use crate::core::currency::CurrencyCode;
use crate::core::ids::{InstallmentId, MerchantId, TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Lifecycle of one scheduled installment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Scheduled,
    Processing,
    Completed,
    Failed,
}

impl InstallmentStatus {
    /// Whether this installment still has money owed on it.
    pub fn is_outstanding(self) -> bool {
        !matches!(self, InstallmentStatus::Completed)
    }

    /// Whether an early payment may target this installment right now.
    ///
    /// `Processing` installments are mid-flight with the regular collection
    /// run and must not be paid twice.
    pub fn is_payable(self) -> bool {
        matches!(self, InstallmentStatus::Scheduled | InstallmentStatus::Failed)
    }
}

/// One scheduled payment within a transaction.
///
/// # Examples
///
/// ```
/// use early_payment_engine::core::transaction::{Installment, InstallmentStatus};
/// use chrono::{TimeZone, Utc};
/// use rust_decimal_macros::dec;
///
/// let due = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
/// let installment = Installment::new("INST-1", 1, dec!(62.50), due);
///
/// assert_eq!(installment.status(), InstallmentStatus::Scheduled);
/// assert!(installment.status().is_payable());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    id: InstallmentId,
    /// 1-based position in the repayment schedule.
    sequence: u32,
    amount: Decimal,
    due_date: DateTime<Utc>,
    status: InstallmentStatus,
}

impl Installment {
    /// Create a scheduled installment.
    ///
    /// # Panics
    ///
    /// Panics if `amount` is not positive.
    pub fn new(
        id: impl Into<InstallmentId>,
        sequence: u32,
        amount: Decimal,
        due_date: DateTime<Utc>,
    ) -> Self {
        assert!(
            amount > Decimal::ZERO,
            "Installment amount must be positive, got {}",
            amount
        );
        Self {
            id: id.into(),
            sequence,
            amount,
            due_date,
            status: InstallmentStatus::Scheduled,
        }
    }

    /// Set the status.
    pub fn with_status(mut self, status: InstallmentStatus) -> Self {
        self.status = status;
        self
    }

    pub(crate) fn set_status(&mut self, status: InstallmentStatus) {
        self.status = status;
    }

    // --- Accessors ---

    pub fn id(&self) -> &InstallmentId {
        &self.id
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn due_date(&self) -> DateTime<Utc> {
        self.due_date
    }

    pub fn status(&self) -> InstallmentStatus {
        self.status
    }
}

/// Lifecycle of the purchase as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Active,
    Completed,
    Cancelled,
}

/// An installment purchase: the unit early payments are quoted and settled against.
///
/// The outstanding amount is always derived from the installment list, so it
/// cannot drift from the schedule. Installments are kept ordered by due date
/// (then sequence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    id: TransactionId,
    merchant_id: MerchantId,
    currency: CurrencyCode,
    total_amount: Decimal,
    status: TransactionStatus,
    installments: Vec<Installment>,
}

impl Transaction {
    /// Create an active transaction. The total is the sum of the installments.
    pub fn new(
        id: impl Into<TransactionId>,
        merchant_id: impl Into<MerchantId>,
        currency: CurrencyCode,
        mut installments: Vec<Installment>,
    ) -> Self {
        installments.sort_by(|a, b| {
            a.due_date
                .cmp(&b.due_date)
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
        let total_amount = installments.iter().map(|i| i.amount).sum();
        Self {
            id: id.into(),
            merchant_id: merchant_id.into(),
            currency,
            total_amount,
            status: TransactionStatus::Active,
            installments,
        }
    }

    /// Set the transaction status.
    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    // --- Accessors ---

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn merchant_id(&self) -> &MerchantId {
        &self.merchant_id
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn total_amount(&self) -> Decimal {
        self.total_amount
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// All installments, ordered by due date.
    pub fn installments(&self) -> &[Installment] {
        &self.installments
    }

    pub fn installment(&self, id: &InstallmentId) -> Option<&Installment> {
        self.installments.iter().find(|i| &i.id == id)
    }

    /// Installments an early payment may target, in due-date order.
    pub fn payable_installments(&self) -> impl Iterator<Item = &Installment> {
        self.installments.iter().filter(|i| i.status.is_payable())
    }

    /// Sum of every installment that is not yet completed.
    pub fn outstanding_amount(&self) -> Decimal {
        self.installments
            .iter()
            .filter(|i| i.status.is_outstanding())
            .map(|i| i.amount)
            .sum()
    }

    /// The earliest-due installment that can still be paid early.
    pub fn next_payable(&self) -> Option<&Installment> {
        self.payable_installments().next()
    }

    /// Mark the given installments completed, all or nothing.
    ///
    /// Returns the ids that could not be settled (unknown, or not payable);
    /// when that list is non-empty nothing was changed.
    pub(crate) fn settle(&mut self, ids: &[InstallmentId]) -> Vec<InstallmentId> {
        let wanted: HashSet<&InstallmentId> = ids.iter().collect();
        let blocked: Vec<InstallmentId> = ids
            .iter()
            .filter(|id| {
                self.installment(id)
                    .map(|i| !i.status.is_payable())
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        if !blocked.is_empty() {
            return blocked;
        }
        for installment in &mut self.installments {
            if wanted.contains(&installment.id) {
                installment.set_status(InstallmentStatus::Completed);
            }
        }
        if self.installments.iter().all(|i| !i.status.is_outstanding()) {
            self.status = TransactionStatus::Completed;
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    fn sample_transaction() -> Transaction {
        Transaction::new(
            "TXN-1",
            "M-1",
            CurrencyCode::new("USD"),
            vec![
                Installment::new("I-2", 2, dec!(50), base() + Duration::days(60)),
                Installment::new("I-1", 1, dec!(50), base() + Duration::days(30)),
                Installment::new("I-3", 3, dec!(50), base() + Duration::days(90)),
            ],
        )
    }

    #[test]
    fn test_transaction_orders_installments() {
        let txn = sample_transaction();
        let ids: Vec<&str> = txn.installments().iter().map(|i| i.id().as_str()).collect();
        assert_eq!(ids, vec!["I-1", "I-2", "I-3"]);
        assert_eq!(txn.total_amount(), dec!(150));
    }

    #[test]
    fn test_outstanding_excludes_completed() {
        let txn = Transaction::new(
            "TXN-1",
            "M-1",
            CurrencyCode::new("USD"),
            vec![
                Installment::new("I-1", 1, dec!(40), base())
                    .with_status(InstallmentStatus::Completed),
                Installment::new("I-2", 2, dec!(60), base() + Duration::days(30)),
            ],
        );
        assert_eq!(txn.outstanding_amount(), dec!(60));
        assert_eq!(txn.next_payable().map(|i| i.id().as_str()), Some("I-2"));
    }

    #[test]
    fn test_processing_is_outstanding_but_not_payable() {
        assert!(InstallmentStatus::Processing.is_outstanding());
        assert!(!InstallmentStatus::Processing.is_payable());
        assert!(InstallmentStatus::Failed.is_payable());
    }

    #[test]
    fn test_settle_is_all_or_nothing() {
        let mut txn = sample_transaction();
        let blocked = txn.settle(&[InstallmentId::new("I-1"), InstallmentId::new("I-9")]);
        assert_eq!(blocked, vec![InstallmentId::new("I-9")]);
        assert_eq!(txn.outstanding_amount(), dec!(150));

        let blocked = txn.settle(&[InstallmentId::new("I-1"), InstallmentId::new("I-2")]);
        assert!(blocked.is_empty());
        assert_eq!(txn.outstanding_amount(), dec!(50));
        assert!(txn.is_active());
    }

    #[test]
    fn test_settling_everything_completes_transaction() {
        let mut txn = sample_transaction();
        let ids: Vec<InstallmentId> = txn.installments().iter().map(|i| i.id().clone()).collect();
        assert!(txn.settle(&ids).is_empty());
        assert_eq!(txn.status(), TransactionStatus::Completed);
    }

    #[test]
    #[should_panic(expected = "must be positive")]
    fn test_installment_zero_amount() {
        Installment::new("I-1", 1, Decimal::ZERO, base());
    }
}
