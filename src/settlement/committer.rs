use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::core::error::{CaptureError, CustomerReason, EngineError, LedgerError};
use crate::core::idempotency::IdempotencyKey;
use crate::core::ids::TransactionId;
use crate::core::option::{EarlyPaymentOption, EarlyPaymentRequest};
use crate::core::record::{CommitState, EarlyPaymentRecord, EarlyPaymentResult};
use crate::quoter::Quoter;
use crate::settlement::audit::AuditSink;
use crate::settlement::gateway::{CaptureReceipt, CaptureRequest, PaymentGateway};
use crate::settlement::ledger::InstallmentLedger;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Lets a caller abandon a commit that is still capturing.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Commit-path tunables, lifted out of [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct CommitterSettings {
    pub capture_timeout: Duration,
    pub capture_attempts: u32,
    pub capture_retry_ceiling: Duration,
    pub settlement_attempts: u32,
}

impl From<&EngineConfig> for CommitterSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            capture_timeout: config.capture_timeout(),
            capture_attempts: config.capture_attempts(),
            capture_retry_ceiling: config.capture_retry_ceiling(),
            settlement_attempts: config.settlement_attempts(),
        }
    }
}

/// Terminal records by commit key.
///
/// A full payoff request names no installments, so the key it was submitted
/// under is mapped to the commit key it last resolved to.
#[derive(Debug, Default)]
struct ReplayTable {
    records: HashMap<IdempotencyKey, EarlyPaymentRecord>,
    by_request: HashMap<IdempotencyKey, IdempotencyKey>,
}

/// How the capture step ended.
enum CaptureOutcome {
    Captured(Option<CaptureReceipt>),
    Failed(CaptureError),
}

/// Turns an accepted option into money movement and ledger updates.
///
/// Each commit walks `received -> validating -> capturing -> settling ->
/// completed`, stopping early at `rejected`, `pending_approval` or
/// `capture_failed`. Commits on the same transaction are serialised.
///
/// The idempotency key is derived from the installments the re-derived
/// option targets, not from what the request names, so a full payoff of a
/// different installment set is a different commit. A repeated commit that
/// already reached `completed` or `pending_approval` is answered from the
/// replay table without touching the gateway or the ledger.
///
/// The committer bounds every capture call by the configured timeout
/// itself; a gateway that answers late is treated as timed out and voided.
///
/// Validation failures are returned as `Err` and nothing is charged.
/// Capture and settlement failures are returned as an `Ok` result whose
/// status and customer reason say what happened.
pub struct SettlementCommitter {
    quoter: Arc<Quoter>,
    ledger: Arc<dyn InstallmentLedger>,
    gateway: Arc<dyn PaymentGateway>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    settings: CommitterSettings,
    locks: Mutex<HashMap<TransactionId, Arc<Mutex<()>>>>,
    replays: Mutex<ReplayTable>,
}

impl SettlementCommitter {
    pub fn new(
        quoter: Arc<Quoter>,
        ledger: Arc<dyn InstallmentLedger>,
        gateway: Arc<dyn PaymentGateway>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        settings: CommitterSettings,
    ) -> Self {
        Self {
            quoter,
            ledger,
            gateway,
            audit,
            clock,
            settings,
            locks: Mutex::new(HashMap::new()),
            replays: Mutex::new(ReplayTable::default()),
        }
    }

    pub fn commit(&self, request: &EarlyPaymentRequest) -> Result<EarlyPaymentResult, EngineError> {
        self.commit_with_cancel(request, &CancelToken::new())
    }

    pub fn commit_with_cancel(
        &self,
        request: &EarlyPaymentRequest,
        cancel: &CancelToken,
    ) -> Result<EarlyPaymentResult, EngineError> {
        let lock = self.transaction_lock(&request.transaction_id)?;
        let outcome = {
            let _guard = lock
                .lock()
                .map_err(|_| EngineError::Unavailable("transaction lock poisoned".into()))?;
            self.commit_locked(request, cancel)
        };
        self.release_lock(&request.transaction_id, lock);
        outcome
    }

    /// Terminal record stored under `key`, which may be a commit key or the
    /// key of the request that produced it.
    pub fn replayed_record(&self, key: &IdempotencyKey) -> Result<Option<EarlyPaymentRecord>, EngineError> {
        let table = self.replays()?;
        let commit_key = table.by_request.get(key).unwrap_or(key);
        Ok(table.records.get(commit_key).cloned())
    }

    fn commit_locked(
        &self,
        request: &EarlyPaymentRequest,
        cancel: &CancelToken,
    ) -> Result<EarlyPaymentResult, EngineError> {
        let request_key = IdempotencyKey::for_request(request);
        let quoted = self.quoter.quote(request, self.clock.now());
        let key = match &quoted {
            Ok(quote) => IdempotencyKey::for_commit(request, &quote.option),
            Err(_) => request_key.clone(),
        };
        let prior = {
            let table = self.replays()?;
            match &quoted {
                Ok(_) => table.records.get(&key).cloned(),
                // No longer valid, but possibly a retry of a request that went through.
                Err(_) => table
                    .by_request
                    .get(&request_key)
                    .and_then(|commit_key| table.records.get(commit_key))
                    .cloned(),
            }
        };
        if let Some(prior) = prior {
            log::info!(
                "replaying commit {} on {} ({})",
                prior.id,
                prior.transaction_id,
                prior.state
            );
            return Ok(EarlyPaymentResult::from_record(&prior, true));
        }

        let mut record = EarlyPaymentRecord::received(
            key.clone(),
            request.transaction_id.clone(),
            request.payment_type,
            request.declared_amount,
            self.clock.now(),
        );
        self.append_audit(&record);

        self.transition(&mut record, CommitState::Validating);
        let quote = match quoted {
            Ok(quote) => quote,
            Err(err) => {
                record.customer_reason = Some(err.customer_reason());
                record.detail = Some(err.to_string());
                self.transition(&mut record, CommitState::Rejected);
                log::info!("commit {} rejected: {}", record.id, err);
                return Err(err);
            }
        };
        record.apply_quote(&quote.option);

        if quote.requires_approval {
            self.transition(&mut record, CommitState::PendingApproval);
            log::info!("commit {} awaiting merchant approval", record.id);
            self.remember(&record, &request_key)?;
            return Ok(EarlyPaymentResult::from_record(&record, false));
        }

        self.transition(&mut record, CommitState::Capturing);
        let receipt = match self.capture(request, &quote.option, &key, cancel) {
            CaptureOutcome::Captured(receipt) => receipt,
            CaptureOutcome::Failed(err) => {
                record.customer_reason = Some(err.customer_reason());
                record.detail = Some(err.to_string());
                self.transition(&mut record, CommitState::CaptureFailed);
                log::info!("commit {} capture failed: {}", record.id, err);
                return Ok(EarlyPaymentResult::from_record(&record, false));
            }
        };
        if let Some(receipt) = &receipt {
            record.amount_charged = receipt.amount;
            record.capture_reference = Some(receipt.reference.clone());
        }

        self.transition(&mut record, CommitState::Settling);
        match self.settle(&quote.option) {
            Ok(()) => {
                record.settled_installments = quote.option.installment_ids.clone();
                self.transition(&mut record, CommitState::Completed);
                log::info!(
                    "commit {} completed on {}: charged {} {}",
                    record.id,
                    record.transaction_id,
                    record.amount_charged,
                    record.currency
                );
                self.remember(&record, &request_key)?;
            }
            Err(err) => {
                record.reconciliation_required = true;
                record.customer_reason = Some(CustomerReason::TemporarilyUnavailable);
                record.detail = Some(err.to_string());
                record.recorded_at = self.clock.now();
                self.append_audit(&record);
                log::error!(
                    "commit {} captured {} ({:?}) but ledger settlement failed: {}; reconciliation required",
                    record.id,
                    record.amount_charged,
                    record.capture_reference,
                    err
                );
            }
        }
        Ok(EarlyPaymentResult::from_record(&record, false))
    }

    fn capture(
        &self,
        request: &EarlyPaymentRequest,
        option: &EarlyPaymentOption,
        key: &IdempotencyKey,
        cancel: &CancelToken,
    ) -> CaptureOutcome {
        let amount = option.amount_due();
        if amount <= Decimal::ZERO {
            log::debug!("nothing to capture for {}", option.transaction_id);
            return CaptureOutcome::Captured(None);
        }
        let capture = CaptureRequest {
            idempotency_key: key.clone(),
            payment_method: request.payment_method.clone(),
            amount,
            currency: option.currency.clone(),
            timeout: self.settings.capture_timeout,
        };

        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return CaptureOutcome::Failed(CaptureError::Cancelled);
            }
            match self.capture_within_timeout(&capture) {
                Ok(receipt) => {
                    if cancel.is_cancelled() && self.void(key) {
                        return CaptureOutcome::Failed(CaptureError::Cancelled);
                    }
                    return CaptureOutcome::Captured(Some(receipt));
                }
                Err(CaptureError::TimedOut) => {
                    if !self.void(key) {
                        log::warn!("capture {} timed out and could not be voided", key);
                    }
                    return CaptureOutcome::Failed(CaptureError::TimedOut);
                }
                Err(err) => match err.retry_hint() {
                    Some(hint) if attempt < self.settings.capture_attempts => {
                        let wait = hint.min(self.settings.capture_retry_ceiling);
                        log::warn!(
                            "capture attempt {} for {} failed: {}; retrying in {:?}",
                            attempt,
                            option.transaction_id,
                            err,
                            wait
                        );
                        thread::sleep(wait);
                        attempt += 1;
                    }
                    _ => return CaptureOutcome::Failed(err),
                },
            }
        }
    }

    /// Run one gateway call on a worker and wait at most `capture.timeout`.
    ///
    /// If the wait expires the receiver is dropped before returning, so a
    /// receipt that lands afterwards cannot be delivered and the worker voids
    /// it itself.
    fn capture_within_timeout(&self, capture: &CaptureRequest) -> Result<CaptureReceipt, CaptureError> {
        let (tx, rx) = mpsc::channel();
        let gateway = Arc::clone(&self.gateway);
        let request = capture.clone();
        thread::spawn(move || {
            let outcome = gateway.capture(&request);
            if let Err(SendError(Ok(receipt))) = tx.send(outcome) {
                match gateway.cancel(&request.idempotency_key) {
                    Ok(true) => log::info!("voided late capture {}", receipt.reference),
                    _ => log::error!(
                        "late capture {} under {} could not be voided; reconciliation required",
                        receipt.reference,
                        request.idempotency_key
                    ),
                }
            }
        });

        let answer = rx.recv_timeout(capture.timeout);
        match answer {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                drop(rx);
                log::warn!(
                    "capture {} gave no answer within {:?}",
                    capture.idempotency_key,
                    capture.timeout
                );
                Err(CaptureError::TimedOut)
            }
            Err(RecvTimeoutError::Disconnected) => {
                log::error!("capture worker for {} exited without answering", capture.idempotency_key);
                Err(CaptureError::TimedOut)
            }
        }
    }

    /// Ask the gateway to void a capture; true only when it confirms.
    fn void(&self, key: &IdempotencyKey) -> bool {
        match self.gateway.cancel(key) {
            Ok(voided) => voided,
            Err(err) => {
                log::warn!("could not void capture {}: {}", key, err);
                false
            }
        }
    }

    fn settle(&self, option: &EarlyPaymentOption) -> Result<(), LedgerError> {
        let mut last_error = None;
        for attempt in 1..=self.settings.settlement_attempts {
            match self.ledger.mark_settled(
                &option.transaction_id,
                &option.installment_ids,
                option.discount_amount,
            ) {
                Ok(()) => return Ok(()),
                // An earlier attempt landed but its answer was lost.
                Err(LedgerError::AlreadySettled { .. }) if attempt > 1 => return Ok(()),
                Err(err @ LedgerError::AlreadySettled { .. }) => return Err(err),
                Err(err) => {
                    log::warn!(
                        "settlement attempt {} for {} failed: {}",
                        attempt,
                        option.transaction_id,
                        err
                    );
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| LedgerError::Unavailable("no settlement attempt made".into())))
    }

    fn transition(&self, record: &mut EarlyPaymentRecord, next: CommitState) {
        debug_assert!(
            record.state.can_transition_to(next),
            "illegal transition {} -> {}",
            record.state,
            next
        );
        log::debug!("commit {}: {} -> {}", record.id, record.state, next);
        record.state = next;
        record.status = next.status();
        record.recorded_at = self.clock.now();
        self.append_audit(record);
    }

    fn append_audit(&self, record: &EarlyPaymentRecord) {
        if let Err(err) = self.audit.append(record) {
            log::error!("audit append failed for commit {}: {}", record.id, err);
        }
    }

    fn remember(&self, record: &EarlyPaymentRecord, request_key: &IdempotencyKey) -> Result<(), EngineError> {
        let mut table = self.replays()?;
        table
            .by_request
            .insert(request_key.clone(), record.idempotency_key.clone());
        table
            .records
            .insert(record.idempotency_key.clone(), record.clone());
        Ok(())
    }

    fn replays(&self) -> Result<MutexGuard<'_, ReplayTable>, EngineError> {
        self.replays
            .lock()
            .map_err(|_| EngineError::Unavailable("replay table lock poisoned".into()))
    }

    fn transaction_lock(&self, id: &TransactionId) -> Result<Arc<Mutex<()>>, EngineError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| EngineError::Unavailable("lock table poisoned".into()))?;
        Ok(locks.entry(id.clone()).or_default().clone())
    }

    /// Drop the per-transaction lock once nobody else is waiting on it.
    fn release_lock(&self, id: &TransactionId, lock: Arc<Mutex<()>>) {
        if let Ok(mut locks) = self.locks.lock() {
            // One reference in the table, one held here.
            if Arc::strong_count(&lock) == 2 {
                locks.remove(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::core::currency::CurrencyCode;
    use crate::core::error::ValidationError;
    use crate::core::fee::{FeeRule, PartialFeeMode, StandardFeeSchedule};
    use crate::core::ids::InstallmentId;
    use crate::core::record::EarlyPaymentStatus;
    use crate::core::tier::{DayWindow, DiscountTier};
    use crate::core::transaction::{Installment, InstallmentStatus, Transaction};
    use crate::merchant::{InMemoryMerchantConfig, MerchantTerms};
    use crate::settlement::audit::InMemoryAuditSink;
    use crate::settlement::gateway::SimulatedGateway;
    use crate::settlement::ledger::InMemoryLedger;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    struct Harness {
        committer: SettlementCommitter,
        ledger: Arc<InMemoryLedger>,
        gateway: Arc<SimulatedGateway>,
        audit: Arc<InMemoryAuditSink>,
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn harness_with(terms: MerchantTerms, gateway: SimulatedGateway) -> Harness {
        let config = EngineConfig {
            capture_retry_ceiling_ms: 1,
            ..EngineConfig::default()
        };
        harness_configured(terms, gateway, config)
    }

    fn harness_configured(terms: MerchantTerms, gateway: SimulatedGateway, config: EngineConfig) -> Harness {
        let ledger = Arc::new(InMemoryLedger::with_transactions(vec![Transaction::new(
            "TXN-1",
            "M-1",
            CurrencyCode::new("USD"),
            vec![
                Installment::new("I-1", 1, dec!(100), now() + chrono::Duration::days(10)),
                Installment::new("I-2", 2, dec!(150), now() + chrono::Duration::days(40)),
            ],
        )]));
        let merchants = Arc::new(InMemoryMerchantConfig::new().with_merchant("M-1", terms));
        let quoter = Arc::new(Quoter::new(ledger.clone(), merchants, &config));
        let gateway = Arc::new(gateway);
        let audit = Arc::new(InMemoryAuditSink::new());
        let committer = SettlementCommitter::new(
            quoter,
            ledger.clone(),
            gateway.clone(),
            audit.clone(),
            Arc::new(FixedClock::new(now())),
            CommitterSettings::from(&config),
        );
        Harness {
            committer,
            ledger,
            gateway,
            audit,
        }
    }

    fn terms() -> MerchantTerms {
        MerchantTerms::new(
            vec![DiscountTier::new("MONTH", DayWindow::new(0, 30), dec!(0.02))],
            StandardFeeSchedule::new(
                FeeRule::default(),
                FeeRule::new(dec!(0), dec!(0.50)),
                PartialFeeMode::PerBatch,
            ),
        )
    }

    fn harness() -> Harness {
        harness_with(terms(), SimulatedGateway::new())
    }

    fn full_request() -> EarlyPaymentRequest {
        EarlyPaymentRequest::full("TXN-1", dec!(250), "pm_card")
    }

    fn states(audit: &InMemoryAuditSink) -> Vec<CommitState> {
        audit.records().iter().map(|r| r.state).collect()
    }

    #[test]
    fn test_full_commit_completes() {
        let h = harness();
        let result = h.committer.commit(&full_request()).unwrap();

        assert_eq!(result.status, EarlyPaymentStatus::Completed);
        assert_eq!(result.discount_amount, dec!(5.00));
        assert_eq!(result.final_amount, dec!(245.00));
        assert_eq!(result.amount_charged, dec!(245.00));
        assert_eq!(result.settled_installments.len(), 2);
        assert!(!result.replayed);
        assert_eq!(h.gateway.charges().len(), 1);
        assert_eq!(h.ledger.settlements()[0].discount_applied, dec!(5.00));
        assert_eq!(
            states(&h.audit),
            vec![
                CommitState::Received,
                CommitState::Validating,
                CommitState::Capturing,
                CommitState::Settling,
                CommitState::Completed,
            ]
        );
    }

    #[test]
    fn test_repeat_commit_is_replayed() {
        let h = harness();
        let first = h.committer.commit(&full_request()).unwrap();
        let second = h.committer.commit(&full_request()).unwrap();

        assert!(second.replayed);
        assert_eq!(second.record_id, first.record_id);
        assert_eq!(second.amount_charged, first.amount_charged);
        assert_eq!(h.gateway.capture_calls(), 1);
        assert_eq!(h.ledger.settlements().len(), 1);
    }

    #[test]
    fn test_partial_commit_charges_fee() {
        let h = harness();
        let request =
            EarlyPaymentRequest::partial("TXN-1", vec![InstallmentId::new("I-1")], dec!(100), "pm");
        let result = h.committer.commit(&request).unwrap();
        assert!(result.is_completed());
        assert_eq!(result.discount_amount, dec!(2.00));
        assert_eq!(result.processing_fee, dec!(0.50));
        assert_eq!(result.amount_charged, dec!(98.50));
    }

    #[test]
    fn test_validation_failure_never_captures() {
        let h = harness();
        let request = EarlyPaymentRequest::full("TXN-1", dec!(999), "pm");
        let err = h.committer.commit(&request).unwrap_err();

        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::AmountMismatch { .. })
        ));
        assert_eq!(err.customer_reason(), CustomerReason::QuoteExpired);
        assert_eq!(h.gateway.capture_calls(), 0);
        assert_eq!(
            states(&h.audit),
            vec![CommitState::Received, CommitState::Validating, CommitState::Rejected]
        );
    }

    #[test]
    fn test_pending_approval_stops_before_capture() {
        let h = harness_with(terms().require_approval(true), SimulatedGateway::new());
        let result = h.committer.commit(&full_request()).unwrap();
        assert_eq!(result.status, EarlyPaymentStatus::PendingApproval);
        assert_eq!(h.gateway.capture_calls(), 0);
        assert!(h.committer.commit(&full_request()).unwrap().replayed);
    }

    #[test]
    fn test_decline_fails_without_settling() {
        let h = harness();
        h.gateway.fail_next(CaptureError::Declined {
            reason: "do not honor".into(),
        });
        let result = h.committer.commit(&full_request()).unwrap();
        assert_eq!(result.state, CommitState::CaptureFailed);
        assert_eq!(result.status, EarlyPaymentStatus::Failed);
        assert_eq!(result.customer_reason, Some(CustomerReason::PaymentDeclined));
        assert!(h.ledger.settlements().is_empty());

        // A failed attempt is not replayed; the customer may try again.
        let retry = h.committer.commit(&full_request()).unwrap();
        assert!(retry.is_completed());
        assert!(!retry.replayed);
    }

    #[test]
    fn test_retryable_capture_is_retried_with_same_key() {
        let h = harness();
        h.gateway.fail_next(CaptureError::Retryable {
            reason: "rate limited".into(),
            retry_after: Duration::from_millis(500),
        });
        let result = h.committer.commit(&full_request()).unwrap();
        assert!(result.is_completed());
        assert_eq!(h.gateway.capture_calls(), 2);
        assert_eq!(h.gateway.charges().len(), 1);
    }

    #[test]
    fn test_timeout_voids_and_fails() {
        let h = harness_with(
            terms(),
            SimulatedGateway::new().with_latency(Duration::from_secs(60)),
        );
        let result = h.committer.commit(&full_request()).unwrap();
        assert_eq!(result.state, CommitState::CaptureFailed);
        assert_eq!(
            result.customer_reason,
            Some(CustomerReason::TemporarilyUnavailable)
        );
        assert!(h.gateway.charges().is_empty(), "late capture was voided");
        assert!(h.ledger.settlements().is_empty());
    }

    #[test]
    fn test_unresponsive_gateway_is_bounded_by_capture_timeout() {
        let config = EngineConfig {
            capture_timeout_ms: 50,
            ..EngineConfig::default()
        };
        let gateway = SimulatedGateway::new().with_stall(Duration::from_millis(400));
        let h = harness_configured(terms(), gateway, config);

        let started = std::time::Instant::now();
        let result = h.committer.commit(&full_request()).unwrap();
        assert!(started.elapsed() < Duration::from_millis(300));
        assert_eq!(result.state, CommitState::CaptureFailed);
        assert_eq!(
            result.customer_reason,
            Some(CustomerReason::TemporarilyUnavailable)
        );
        assert!(h.ledger.settlements().is_empty());
        assert_eq!(h.committer.locks.lock().unwrap().len(), 0);

        // The charge that lands after the committer gave up is voided.
        thread::sleep(Duration::from_millis(700));
        assert_eq!(h.gateway.capture_calls(), 1);
        assert!(h.gateway.charges().is_empty());
        assert!(!h.gateway.voided().is_empty());
    }

    #[test]
    fn test_full_payoff_of_a_new_installment_set_is_not_replayed() {
        let h = harness();
        let first = h
            .committer
            .commit(&EarlyPaymentRequest::partial("TXN-1", vec![InstallmentId::new("I-2")], dec!(150), "pm"))
            .unwrap();
        assert!(first.is_completed());
        // I-1 is being collected: a full payoff now targets nothing else.
        let txn = h.ledger.get_transaction(&TransactionId::new("TXN-1")).unwrap();
        let collecting = Transaction::new(
            "TXN-1",
            "M-1",
            CurrencyCode::new("USD"),
            vec![
                txn.installments()[0].clone().with_status(InstallmentStatus::Processing),
                txn.installments()[1].clone(),
            ],
        );
        h.ledger.insert(collecting).unwrap();
        assert!(h.committer.commit(&EarlyPaymentRequest::full("TXN-1", dec!(100), "pm")).is_err());

        // Collection fails, so the customer pays I-1 off early instead.
        let failed = Transaction::new(
            "TXN-1",
            "M-1",
            CurrencyCode::new("USD"),
            vec![
                txn.installments()[0].clone().with_status(InstallmentStatus::Failed),
                txn.installments()[1].clone(),
            ],
        );
        h.ledger.insert(failed).unwrap();
        let payoff = EarlyPaymentRequest::full("TXN-1", dec!(100), "pm");
        let second = h.committer.commit(&payoff).unwrap();
        assert!(second.is_completed());
        assert!(!second.replayed);
        assert_eq!(second.settled_installments, vec![InstallmentId::new("I-1")]);
        assert_eq!(h.gateway.charges().len(), 2);

        // A genuine retry of that payoff is still answered from the replay table.
        let retry = h.committer.commit(&payoff).unwrap();
        assert!(retry.replayed);
        assert_eq!(retry.record_id, second.record_id);
        assert!(h
            .committer
            .replayed_record(&IdempotencyKey::for_request(&payoff))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_cancelled_before_capture() {
        let h = harness();
        let token = CancelToken::new();
        token.cancel();
        let result = h.committer.commit_with_cancel(&full_request(), &token).unwrap();
        assert_eq!(result.state, CommitState::CaptureFailed);
        assert_eq!(h.gateway.capture_calls(), 0);
    }

    #[test]
    fn test_lost_ledger_ack_still_completes() {
        let h = harness();
        h.ledger.lose_next_acks(1);
        let result = h.committer.commit(&full_request()).unwrap();
        assert!(result.is_completed());
        assert_eq!(h.ledger.settlements().len(), 1);
    }

    #[test]
    fn test_persistent_ledger_failure_requires_reconciliation() {
        let h = harness();
        h.ledger.fail_next_writes(10);
        let result = h.committer.commit(&full_request()).unwrap();

        assert_eq!(result.state, CommitState::Settling);
        assert_eq!(result.status, EarlyPaymentStatus::Processing);
        assert_eq!(
            result.customer_reason,
            Some(CustomerReason::TemporarilyUnavailable)
        );
        let last = h.audit.records().pop().unwrap();
        assert!(last.reconciliation_required);
        assert!(last.capture_reference.is_some());

        // Not replayed: a retry recaptures under the same key and settles.
        h.ledger.fail_next_writes(0);
        let retry = h.committer.commit(&full_request()).unwrap();
        assert!(retry.is_completed());
        assert_eq!(h.gateway.charges().len(), 1);
    }

    #[test]
    fn test_audit_outage_does_not_change_outcome() {
        let h = harness();
        h.audit.set_unavailable(true);
        let result = h.committer.commit(&full_request()).unwrap();
        assert!(result.is_completed());
        assert!(h.audit.records().is_empty());
    }

    #[test]
    fn test_lock_table_is_cleaned_up() {
        let h = harness();
        h.committer.commit(&full_request()).unwrap();
        assert!(h.committer.locks.lock().unwrap().is_empty());
    }
}
