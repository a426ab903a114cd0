use crate::core::error::AuditError;
use crate::core::ids::TransactionId;
use crate::core::record::EarlyPaymentRecord;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Append-only destination for commit records.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: &EarlyPaymentRecord) -> Result<(), AuditError>;
}

/// Keeps every appended snapshot in memory.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<EarlyPaymentRecord>>,
    unavailable: AtomicBool,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every append until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<EarlyPaymentRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn for_transaction(&self, transaction_id: &TransactionId) -> Vec<EarlyPaymentRecord> {
        self.records()
            .into_iter()
            .filter(|r| &r.transaction_id == transaction_id)
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn append(&self, record: &EarlyPaymentRecord) -> Result<(), AuditError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("sink switched off".into()));
        }
        self.records
            .lock()
            .map_err(|_| AuditError::Unavailable("audit lock poisoned".into()))?
            .push(record.clone());
        Ok(())
    }
}

/// Writes each record as one JSON line through the `log` facade, target `audit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn append(&self, record: &EarlyPaymentRecord) -> Result<(), AuditError> {
        let line = serde_json::to_string(record)
            .map_err(|e| AuditError::Unavailable(format!("encode failed: {e}")))?;
        log::info!(target: "audit", "{line}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::idempotency::IdempotencyKey;
    use crate::core::option::PaymentType;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn record(txn: &str) -> EarlyPaymentRecord {
        let id = TransactionId::new(txn);
        EarlyPaymentRecord::received(
            IdempotencyKey::derive(&id, &[], dec!(10)),
            id,
            PaymentType::Full,
            dec!(10),
            Utc::now(),
        )
    }

    #[test]
    fn test_records_are_appended_in_order() {
        let sink = InMemoryAuditSink::new();
        sink.append(&record("A")).unwrap();
        sink.append(&record("B")).unwrap();
        sink.append(&record("A")).unwrap();
        assert_eq!(sink.records().len(), 3);
        assert_eq!(sink.for_transaction(&TransactionId::new("A")).len(), 2);
    }

    #[test]
    fn test_unavailable_sink_rejects() {
        let sink = InMemoryAuditSink::new();
        sink.set_unavailable(true);
        assert!(sink.append(&record("A")).is_err());
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_log_sink_accepts_records() {
        assert!(LogAuditSink.append(&record("A")).is_ok());
    }
}
