pub mod generator;
pub mod partial;

use crate::core::currency::round_money;
use crate::core::fee::FeeSchedule;
use crate::core::option::InstallmentQuote;
use crate::core::tier::{DiscountTier, TierSchedule};
use crate::core::transaction::Installment;
use crate::discount::resolver::DiscountScheduleResolver;
use crate::discount::savings::SavingsCalculator;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

/// How long a quote without a discount tier stays valid by default.
pub const DEFAULT_QUOTE_TTL_MINUTES: i64 = 15;

/// Everything a quote depends on besides the transaction itself.
///
/// Holding `now` here keeps every quoting function a pure function of its
/// arguments.
#[derive(Debug, Clone, Copy)]
pub struct QuoteContext<'a> {
    pub schedule: &'a TierSchedule,
    pub fees: &'a dyn FeeSchedule,
    pub allows_partial: bool,
    /// Validity of quotes that are not bounded by a tier window.
    pub quote_ttl: Duration,
    pub now: DateTime<Utc>,
}

impl<'a> QuoteContext<'a> {
    pub fn new(schedule: &'a TierSchedule, fees: &'a dyn FeeSchedule, now: DateTime<Utc>) -> Self {
        Self {
            schedule,
            fees,
            allows_partial: true,
            quote_ttl: Duration::minutes(DEFAULT_QUOTE_TTL_MINUTES),
            now,
        }
    }

    pub fn allow_partial(mut self, allows_partial: bool) -> Self {
        self.allows_partial = allows_partial;
        self
    }

    pub fn with_quote_ttl(mut self, quote_ttl: Duration) -> Self {
        self.quote_ttl = quote_ttl;
        self
    }

    /// The same context evaluated at a different moment.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Expiry of a quote whose tightest tier deadline is `tier_deadline`.
    pub(crate) fn expiry(&self, tier_deadline: Option<DateTime<Utc>>) -> DateTime<Utc> {
        tier_deadline.unwrap_or(self.now + self.quote_ttl)
    }
}

/// Resolve and price a single installment on its own.
pub(crate) fn quote_installment(
    installment: &Installment,
    ctx: &QuoteContext<'_>,
) -> (InstallmentQuote, Option<DiscountTier>, Option<DateTime<Utc>>) {
    let tier = DiscountScheduleResolver::resolve(installment, ctx.schedule, ctx.now);
    let deadline = tier.map(|t| DiscountScheduleResolver::tier_expiry(t, installment.due_date()));
    let quote = InstallmentQuote {
        installment_id: installment.id().clone(),
        amount: installment.amount(),
        due_date: installment.due_date(),
        tier_id: tier.map(|t| t.id().clone()),
        discount_amount: SavingsCalculator::discount(installment.amount(), tier),
    };
    (quote, tier.cloned(), deadline)
}

/// Split `total` across `amounts` in proportion, exactly.
///
/// Every share is rounded to minor units except the last, which absorbs the
/// remainder so the shares always sum to `total`.
pub(crate) fn allocate(total: Decimal, amounts: &[Decimal]) -> Vec<Decimal> {
    let sum: Decimal = amounts.iter().copied().sum();
    if amounts.is_empty() || sum == Decimal::ZERO {
        return vec![Decimal::ZERO; amounts.len()];
    }
    let mut shares: Vec<Decimal> = amounts
        .iter()
        .map(|amount| round_money(total * *amount / sum))
        .collect();
    let allocated: Decimal = shares.iter().take(shares.len() - 1).copied().sum();
    if let Some(last) = shares.last_mut() {
        *last = total - allocated;
    }
    shares
}
