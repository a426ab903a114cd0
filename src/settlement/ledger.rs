use crate::core::error::LedgerError;
use crate::core::ids::{InstallmentId, TransactionId};
use crate::core::transaction::Transaction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The system of record for installment plans.
pub trait InstallmentLedger: Send + Sync {
    fn get_transaction(&self, id: &TransactionId) -> Result<Transaction, LedgerError>;

    /// Mark `installment_ids` completed, all or nothing.
    fn mark_settled(
        &self,
        transaction_id: &TransactionId,
        installment_ids: &[InstallmentId],
        discount_applied: Decimal,
    ) -> Result<(), LedgerError>;

    /// Which transaction an installment belongs to, when the ledger can tell.
    fn installment_owner(&self, _installment: &InstallmentId) -> Option<TransactionId> {
        None
    }
}

/// One successful `mark_settled` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementEntry {
    pub transaction_id: TransactionId,
    pub installment_ids: Vec<InstallmentId>,
    pub discount_applied: Decimal,
}

/// Installment ledger held in memory.
///
/// Writes take the ledger's write lock for their whole duration, so a
/// settlement either lands on every installment or on none. Failure
/// injection hooks let tests exercise the committer's retry paths.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    transactions: RwLock<HashMap<TransactionId, Transaction>>,
    settlements: RwLock<Vec<SettlementEntry>>,
    failing_writes: AtomicUsize,
    lost_acks: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transactions(transactions: impl IntoIterator<Item = Transaction>) -> Self {
        let ledger = Self::new();
        for transaction in transactions {
            // A fresh ledger has no other lock holders.
            let _ = ledger.insert(transaction);
        }
        ledger
    }

    /// Add or replace a transaction.
    pub fn insert(&self, transaction: Transaction) -> Result<(), LedgerError> {
        self.write()?.insert(transaction.id().clone(), transaction);
        Ok(())
    }

    /// Every successful settlement, in order.
    pub fn settlements(&self) -> Vec<SettlementEntry> {
        match self.settlements.read() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Make the next `count` writes fail without touching anything.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` writes land but report failure, as a lost acknowledgement would.
    pub fn lose_next_acks(&self, count: usize) {
        self.lost_acks.store(count, Ordering::SeqCst);
    }

    fn take_fault(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<TransactionId, Transaction>>, LedgerError> {
        self.transactions
            .read()
            .map_err(|_| LedgerError::Unavailable("ledger lock poisoned".into()))
    }

    fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<TransactionId, Transaction>>, LedgerError> {
        self.transactions
            .write()
            .map_err(|_| LedgerError::Unavailable("ledger lock poisoned".into()))
    }
}

impl InstallmentLedger for InMemoryLedger {
    fn get_transaction(&self, id: &TransactionId) -> Result<Transaction, LedgerError> {
        self.read()?
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::TransactionNotFound(id.clone()))
    }

    fn mark_settled(
        &self,
        transaction_id: &TransactionId,
        installment_ids: &[InstallmentId],
        discount_applied: Decimal,
    ) -> Result<(), LedgerError> {
        if Self::take_fault(&self.failing_writes) {
            return Err(LedgerError::Unavailable("injected write failure".into()));
        }

        let mut transactions = self.write()?;
        let transaction = transactions
            .get_mut(transaction_id)
            .ok_or_else(|| LedgerError::TransactionNotFound(transaction_id.clone()))?;
        let blocked = transaction.settle(installment_ids);
        if !blocked.is_empty() {
            return Err(LedgerError::AlreadySettled {
                transaction_id: transaction_id.clone(),
                installments: blocked,
            });
        }
        drop(transactions);

        let entry = SettlementEntry {
            transaction_id: transaction_id.clone(),
            installment_ids: installment_ids.to_vec(),
            discount_applied,
        };
        match self.settlements.write() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }

        if Self::take_fault(&self.lost_acks) {
            return Err(LedgerError::Unavailable("acknowledgement lost".into()));
        }
        Ok(())
    }

    fn installment_owner(&self, installment: &InstallmentId) -> Option<TransactionId> {
        let transactions = self.read().ok()?;
        transactions
            .values()
            .find(|t| t.installment(installment).is_some())
            .map(|t| t.id().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::CurrencyCode;
    use crate::core::transaction::{Installment, InstallmentStatus, TransactionStatus};
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn ledger() -> InMemoryLedger {
        let due = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        InMemoryLedger::with_transactions(vec![Transaction::new(
            "TXN-1",
            "M-1",
            CurrencyCode::new("USD"),
            vec![
                Installment::new("I-1", 1, dec!(50), due),
                Installment::new("I-2", 2, dec!(50), due + Duration::days(30)),
            ],
        )])
    }

    fn ids(raw: &[&str]) -> Vec<InstallmentId> {
        raw.iter().map(|s| InstallmentId::new(*s)).collect()
    }

    #[test]
    fn test_mark_settled_completes_installments() {
        let ledger = ledger();
        let txn = TransactionId::new("TXN-1");
        ledger.mark_settled(&txn, &ids(&["I-1"]), dec!(1)).unwrap();

        let stored = ledger.get_transaction(&txn).unwrap();
        assert_eq!(
            stored.installment(&InstallmentId::new("I-1")).unwrap().status(),
            InstallmentStatus::Completed
        );
        assert_eq!(stored.outstanding_amount(), dec!(50));
        assert_eq!(ledger.settlements().len(), 1);
    }

    #[test]
    fn test_settling_everything_completes_transaction() {
        let ledger = ledger();
        let txn = TransactionId::new("TXN-1");
        ledger
            .mark_settled(&txn, &ids(&["I-1", "I-2"]), dec!(0))
            .unwrap();
        assert_eq!(
            ledger.get_transaction(&txn).unwrap().status(),
            TransactionStatus::Completed
        );
    }

    #[test]
    fn test_mark_settled_is_all_or_nothing() {
        let ledger = ledger();
        let txn = TransactionId::new("TXN-1");
        ledger.mark_settled(&txn, &ids(&["I-1"]), dec!(0)).unwrap();

        let err = ledger
            .mark_settled(&txn, &ids(&["I-2", "I-1"]), dec!(0))
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::AlreadySettled {
                transaction_id: txn.clone(),
                installments: ids(&["I-1"]),
            }
        );
        let stored = ledger.get_transaction(&txn).unwrap();
        assert!(stored
            .installment(&InstallmentId::new("I-2"))
            .unwrap()
            .status()
            .is_payable());
    }

    #[test]
    fn test_injected_failures() {
        let ledger = ledger();
        let txn = TransactionId::new("TXN-1");

        ledger.fail_next_writes(1);
        assert!(ledger.mark_settled(&txn, &ids(&["I-1"]), dec!(0)).is_err());
        assert!(ledger.settlements().is_empty());

        ledger.lose_next_acks(1);
        assert!(ledger.mark_settled(&txn, &ids(&["I-1"]), dec!(0)).is_err());
        assert_eq!(ledger.settlements().len(), 1, "write landed despite the error");
    }

    #[test]
    fn test_installment_owner() {
        let ledger = ledger();
        assert_eq!(
            ledger.installment_owner(&InstallmentId::new("I-2")),
            Some(TransactionId::new("TXN-1"))
        );
        assert_eq!(ledger.installment_owner(&InstallmentId::new("I-9")), None);
    }
}
