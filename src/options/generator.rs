use crate::core::ids::{InstallmentId, TierId};
use crate::core::option::{EarlyPaymentOption, InstallmentQuote, PaymentType};
use crate::core::transaction::{Installment, Transaction};
use crate::discount::resolver::DiscountScheduleResolver;
use crate::discount::savings::SavingsCalculator;
use crate::options::partial::PartialSelectionAggregator;
use crate::options::{allocate, QuoteContext};
use rust_decimal::Decimal;
use std::cmp::Ordering;

/// Enumerates and ranks the early payment options open on a transaction.
///
/// Output is a pure function of the transaction and the [`QuoteContext`]:
/// calling it again with the same inputs yields the same options in the
/// same order.
pub struct OptionGenerator;

impl OptionGenerator {
    /// All options, best first.
    ///
    /// Produces one full payoff option plus, when the merchant allows partial
    /// payments, one partial option for every maximal run of consecutive
    /// payable installments that resolve to the same discount tier. Runs with
    /// no discount are not offered as partial options.
    ///
    /// Ranking is by net savings, highest first; ties go to the option that
    /// expires soonest.
    pub fn generate(transaction: &Transaction, ctx: &QuoteContext<'_>) -> Vec<EarlyPaymentOption> {
        if !transaction.is_active() {
            log::debug!("transaction {} is not active; no options", transaction.id());
            return Vec::new();
        }
        let Some(full) = Self::full_option(transaction, ctx) else {
            return Vec::new();
        };

        let mut options = vec![full];
        if ctx.allows_partial {
            for run in Self::eligible_runs(transaction, ctx) {
                match PartialSelectionAggregator::aggregate(transaction, &run, ctx) {
                    Ok(option) => options.push(option),
                    Err(err) => log::warn!(
                        "skipping partial run on {}: {}",
                        transaction.id(),
                        err
                    ),
                }
            }
        }

        Self::rank(&mut options);
        options
    }

    /// The head of [`generate`](Self::generate)'s ordering.
    pub fn best(transaction: &Transaction, ctx: &QuoteContext<'_>) -> Option<EarlyPaymentOption> {
        Self::generate(transaction, ctx).into_iter().next()
    }

    /// Pay off every payable installment at once.
    ///
    /// The tier window is measured against the nearest due date and the
    /// tier minimum against the whole balance. Installments already being
    /// collected (`processing`) are left out of the payoff.
    pub fn full_option(
        transaction: &Transaction,
        ctx: &QuoteContext<'_>,
    ) -> Option<EarlyPaymentOption> {
        let payable: Vec<&Installment> = transaction.payable_installments().collect();
        let nearest = payable.first()?;
        let amount: Decimal = payable.iter().map(|i| i.amount()).sum();

        let tier =
            DiscountScheduleResolver::resolve_for(nearest.due_date(), amount, ctx.schedule, ctx.now);
        let savings = SavingsCalculator::calculate(amount, tier, PaymentType::Full, ctx.fees);
        let deadline = tier.map(|t| DiscountScheduleResolver::tier_expiry(t, nearest.due_date()));

        let amounts: Vec<Decimal> = payable.iter().map(|i| i.amount()).collect();
        let shares = allocate(savings.discount_amount, &amounts);
        let breakdown = payable
            .iter()
            .zip(shares)
            .map(|(installment, share)| InstallmentQuote {
                installment_id: installment.id().clone(),
                amount: installment.amount(),
                due_date: installment.due_date(),
                tier_id: tier.map(|t| t.id().clone()),
                discount_amount: share,
            })
            .collect();

        Some(EarlyPaymentOption {
            payment_type: PaymentType::Full,
            transaction_id: transaction.id().clone(),
            currency: transaction.currency().clone(),
            installment_ids: payable.iter().map(|i| i.id().clone()).collect(),
            original_amount: amount,
            tier: tier.cloned(),
            discount_amount: savings.discount_amount,
            processing_fee: savings.processing_fee,
            final_amount: savings.final_amount,
            net_savings: savings.net_savings,
            available_until: ctx.expiry(deadline),
            breakdown,
        })
    }

    /// Maximal runs of consecutive payable installments sharing one resolved tier.
    fn eligible_runs(
        transaction: &Transaction,
        ctx: &QuoteContext<'_>,
    ) -> Vec<Vec<InstallmentId>> {
        let mut runs = Vec::new();
        let mut current: Vec<InstallmentId> = Vec::new();
        let mut current_tier: Option<TierId> = None;

        for installment in transaction.installments() {
            if !installment.status().is_outstanding() {
                continue;
            }
            let tier = if installment.status().is_payable() {
                DiscountScheduleResolver::resolve(installment, ctx.schedule, ctx.now)
                    .map(|t| t.id().clone())
            } else {
                // A non-payable outstanding installment breaks contiguity.
                None
            };
            if tier != current_tier && !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
            current_tier = tier;
            if current_tier.is_some() {
                current.push(installment.id().clone());
            }
        }
        if !current.is_empty() {
            runs.push(current);
        }
        runs
    }

    /// Sort best first: net savings descending, then soonest expiry.
    ///
    /// Any remaining tie puts full before partial, then orders by first installment id.
    pub fn rank(options: &mut [EarlyPaymentOption]) {
        options.sort_by(Self::compare);
    }

    fn compare(a: &EarlyPaymentOption, b: &EarlyPaymentOption) -> Ordering {
        b.net_savings
            .cmp(&a.net_savings)
            .then_with(|| a.available_until.cmp(&b.available_until))
            .then_with(|| a.payment_type.cmp(&b.payment_type))
            .then_with(|| a.installment_ids.first().cmp(&b.installment_ids.first()))
    }
}
