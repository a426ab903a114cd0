use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::core::error::EngineError;
use crate::core::ids::{MerchantId, TransactionId};
use crate::core::option::{EarlyPaymentOption, EarlyPaymentRequest};
use crate::core::record::EarlyPaymentResult;
use crate::merchant::MerchantConfigSource;
use crate::quoter::Quoter;
use crate::settlement::audit::AuditSink;
use crate::settlement::committer::{CancelToken, CommitterSettings, SettlementCommitter};
use crate::settlement::gateway::PaymentGateway;
use crate::settlement::ledger::InstallmentLedger;
use crate::simulation::scenario::{Scenario, ScenarioReport, ScenarioSimulator};
use std::sync::Arc;

/// The early payment engine: quoting, committing and simulation over one
/// set of collaborators.
///
/// The engine is `Send + Sync`; share it behind an `Arc` and call it from
/// as many threads as needed. Quoting never mutates shared state; commits
/// on the same transaction are serialised internally.
///
/// # Examples
///
/// ```
/// use early_payment_engine::prelude::*;
/// use chrono::{Duration, TimeZone, Utc};
/// use rust_decimal_macros::dec;
/// use std::sync::Arc;
///
/// let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
/// let txn = Transaction::new(
///     "TXN-1",
///     "M-1",
///     CurrencyCode::new("USD"),
///     vec![Installment::new("I-1", 1, dec!(250), now + Duration::days(5))],
/// );
/// let terms = MerchantTerms::new(
///     vec![DiscountTier::new("WEEK", DayWindow::new(0, 7), dec!(0.02))],
///     StandardFeeSchedule::free(),
/// );
///
/// let engine = EarlyPaymentEngine::new(
///     Arc::new(InMemoryLedger::with_transactions(vec![txn])),
///     Arc::new(SimulatedGateway::new()),
///     Arc::new(InMemoryMerchantConfig::new().with_merchant("M-1", terms)),
///     Arc::new(InMemoryAuditSink::new()),
///     Arc::new(FixedClock::new(now)),
///     EngineConfig::default(),
/// );
///
/// let best = engine.best_option(&TransactionId::new("TXN-1")).unwrap().unwrap();
/// assert_eq!(best.final_amount, dec!(245.00));
///
/// let result = engine.commit(&EarlyPaymentRequest::accepting(&best, "pm_card")).unwrap();
/// assert!(result.is_completed());
/// ```
pub struct EarlyPaymentEngine {
    quoter: Arc<Quoter>,
    committer: SettlementCommitter,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl EarlyPaymentEngine {
    pub fn new(
        ledger: Arc<dyn InstallmentLedger>,
        gateway: Arc<dyn PaymentGateway>,
        merchants: Arc<dyn MerchantConfigSource>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let quoter = Arc::new(Quoter::new(ledger.clone(), merchants, &config));
        let committer = SettlementCommitter::new(
            quoter.clone(),
            ledger,
            gateway,
            audit,
            clock.clone(),
            CommitterSettings::from(&config),
        );
        Self {
            quoter,
            committer,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Every option open on the transaction, best first. Empty when nothing
    /// can be paid early.
    pub fn generate_options(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Vec<EarlyPaymentOption>, EngineError> {
        self.quoter.options(transaction_id, self.clock.now())
    }

    pub fn best_option(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<EarlyPaymentOption>, EngineError> {
        Ok(self.generate_options(transaction_id)?.into_iter().next())
    }

    /// Quote `request` exactly as a commit would validate it, without side effects.
    pub fn calculate(&self, request: &EarlyPaymentRequest) -> Result<EarlyPaymentResult, EngineError> {
        let quote = self.quoter.quote(request, self.clock.now())?;
        Ok(EarlyPaymentResult::quote(&quote.option))
    }

    pub fn commit(&self, request: &EarlyPaymentRequest) -> Result<EarlyPaymentResult, EngineError> {
        self.committer.commit(request)
    }

    pub fn commit_with_cancel(
        &self,
        request: &EarlyPaymentRequest,
        cancel: &CancelToken,
    ) -> Result<EarlyPaymentResult, EngineError> {
        self.committer.commit_with_cancel(request, cancel)
    }

    /// Evaluate hypothetical payments against the transaction's current state.
    pub fn simulate(
        &self,
        transaction_id: &TransactionId,
        scenarios: &[Scenario],
    ) -> Result<ScenarioReport, EngineError> {
        let now = self.clock.now();
        let transaction = self.quoter.load(transaction_id)?;
        let terms = self.quoter.terms(transaction.merchant_id(), now)?;
        let ctx = terms.context(now, self.quoter.quote_ttl());
        Ok(ScenarioSimulator::simulate(&transaction, scenarios, &ctx))
    }

    /// Forget cached tiers for a merchant whose configuration changed.
    pub fn invalidate_merchant(&self, merchant: &MerchantId) {
        self.quoter.invalidate(merchant);
    }
}
