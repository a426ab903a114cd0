use crate::config::EngineConfig;
use crate::core::currency::within_epsilon;
use crate::core::error::{ConfigurationError, EngineError, LedgerError, SelectionError, ValidationError};
use crate::core::fee::FeeSchedule;
use crate::core::ids::{MerchantId, TransactionId};
use crate::core::option::{EarlyPaymentOption, EarlyPaymentRequest, PaymentType};
use crate::core::tier::TierSchedule;
use crate::core::transaction::Transaction;
use crate::discount::cache::TierCache;
use crate::merchant::MerchantConfigSource;
use crate::options::generator::OptionGenerator;
use crate::options::partial::PartialSelectionAggregator;
use crate::options::QuoteContext;
use crate::settlement::ledger::InstallmentLedger;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// A merchant's terms, resolved and validated for quoting.
#[derive(Debug, Clone)]
pub struct MerchantQuoteTerms {
    pub schedule: Arc<TierSchedule>,
    pub fees: Arc<dyn FeeSchedule>,
    pub allows_partial: bool,
    pub requires_approval: bool,
}

impl MerchantQuoteTerms {
    pub fn context(&self, now: DateTime<Utc>, quote_ttl: Duration) -> QuoteContext<'_> {
        QuoteContext::new(&self.schedule, self.fees.as_ref(), now)
            .allow_partial(self.allows_partial)
            .with_quote_ttl(quote_ttl)
    }
}

/// A request re-derived against current ledger and merchant state.
#[derive(Debug, Clone)]
pub struct Quote {
    pub transaction: Transaction,
    pub option: EarlyPaymentOption,
    pub requires_approval: bool,
}

/// Read side of the engine: loads transactions and merchant terms and turns
/// requests into freshly derived options.
///
/// Quoting for display and validating a commit go through the same
/// [`quote`](Self::quote) path, so a customer is never shown a number the
/// committer would compute differently.
pub struct Quoter {
    ledger: Arc<dyn InstallmentLedger>,
    merchants: Arc<dyn MerchantConfigSource>,
    cache: TierCache,
    quote_ttl: Duration,
    quote_epsilon: Decimal,
}

impl Quoter {
    pub fn new(
        ledger: Arc<dyn InstallmentLedger>,
        merchants: Arc<dyn MerchantConfigSource>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            ledger,
            merchants,
            cache: TierCache::new(config.tier_cache_capacity, config.tier_cache_ttl()),
            quote_ttl: config.quote_ttl(),
            quote_epsilon: config.quote_epsilon,
        }
    }

    pub fn quote_ttl(&self) -> Duration {
        self.quote_ttl
    }

    pub fn terms(
        &self,
        merchant: &MerchantId,
        now: DateTime<Utc>,
    ) -> Result<MerchantQuoteTerms, ConfigurationError> {
        let schedule = self.cache.get_or_load(merchant, now, || {
            self.merchants
                .discount_tiers(merchant)
                .map(TierSchedule::new)
        })?;
        Ok(MerchantQuoteTerms {
            schedule,
            fees: self.merchants.fee_schedule(merchant)?,
            allows_partial: self.merchants.allows_partial_payments(merchant)?,
            requires_approval: self.merchants.requires_approval(merchant)?,
        })
    }

    /// Drop a merchant's cached tiers after its configuration changed.
    pub fn invalidate(&self, merchant: &MerchantId) {
        self.cache.invalidate(merchant);
    }

    pub fn load(&self, transaction_id: &TransactionId) -> Result<Transaction, EngineError> {
        self.ledger.get_transaction(transaction_id).map_err(|err| match err {
            LedgerError::TransactionNotFound(id) => ValidationError::TransactionNotFound(id).into(),
            other => other.into(),
        })
    }

    pub fn options(
        &self,
        transaction_id: &TransactionId,
        now: DateTime<Utc>,
    ) -> Result<Vec<EarlyPaymentOption>, EngineError> {
        let transaction = self.load(transaction_id)?;
        let terms = self.terms(transaction.merchant_id(), now)?;
        Ok(OptionGenerator::generate(
            &transaction,
            &terms.context(now, self.quote_ttl),
        ))
    }

    /// Re-derive `request` from current state and check it against what the
    /// customer declared.
    pub fn quote(&self, request: &EarlyPaymentRequest, now: DateTime<Utc>) -> Result<Quote, EngineError> {
        let transaction = self.load(&request.transaction_id)?;
        if !transaction.is_active() {
            return Err(ValidationError::TransactionNotActive {
                id: transaction.id().clone(),
                status: transaction.status(),
            }
            .into());
        }
        let terms = self.terms(transaction.merchant_id(), now)?;
        let ctx = terms.context(now, self.quote_ttl);

        let option = match request.payment_type {
            PaymentType::Full => {
                if !request.installment_ids.is_empty() {
                    return Err(ValidationError::UnexpectedSelection.into());
                }
                OptionGenerator::full_option(&transaction, &ctx)
                    .ok_or(ValidationError::NothingOutstanding)?
            }
            PaymentType::Partial => {
                if !terms.allows_partial {
                    return Err(
                        ValidationError::PartialNotAllowed(transaction.merchant_id().clone()).into(),
                    );
                }
                PartialSelectionAggregator::aggregate(&transaction, &request.installment_ids, &ctx)
                    .map_err(|err| self.attribute(err, transaction.id()))?
            }
        };

        if request.declared_amount != option.original_amount {
            return Err(ValidationError::AmountMismatch {
                declared: request.declared_amount,
                expected: option.original_amount,
            }
            .into());
        }
        if let Some(quoted) = request.quoted_final_amount {
            if !within_epsilon(quoted, option.final_amount, self.quote_epsilon) {
                return Err(ValidationError::QuoteMismatch {
                    quoted,
                    current: option.final_amount,
                }
                .into());
            }
        }

        Ok(Quote {
            transaction,
            option,
            requires_approval: terms.requires_approval,
        })
    }

    /// Name the owning transaction when an unknown installment belongs elsewhere.
    fn attribute(&self, err: SelectionError, transaction_id: &TransactionId) -> SelectionError {
        match err {
            SelectionError::UnknownInstallment(installment) => {
                match self.ledger.installment_owner(&installment) {
                    Some(owner) if &owner != transaction_id => {
                        SelectionError::WrongTransaction { installment, owner }
                    }
                    _ => SelectionError::UnknownInstallment(installment),
                }
            }
            other => other,
        }
    }
}
