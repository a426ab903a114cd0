use crate::core::error::SelectionError;
use crate::core::ids::InstallmentId;
use crate::core::option::{EarlyPaymentOption, InstallmentQuote, PaymentType};
use crate::core::tier::DiscountTier;
use crate::core::transaction::{InstallmentStatus, Transaction};
use crate::discount::savings::Savings;
use crate::options::{quote_installment, QuoteContext};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;

/// Combines a customer-chosen set of installments into one partial-payment quote.
///
/// Each installment is resolved and discounted on its own; the combined
/// discount is the plain sum of those. The processing fee is charged per the
/// fee schedule's [`PartialFeeMode`](crate::core::fee::PartialFeeMode) on the
/// batch as a whole, so net savings reflect the fee actually charged.
pub struct PartialSelectionAggregator;

impl PartialSelectionAggregator {
    pub fn aggregate(
        transaction: &Transaction,
        selected: &[InstallmentId],
        ctx: &QuoteContext<'_>,
    ) -> Result<EarlyPaymentOption, SelectionError> {
        Self::validate_selection(transaction, selected)?;

        let wanted: HashSet<&InstallmentId> = selected.iter().collect();
        let mut quotes: Vec<InstallmentQuote> = Vec::with_capacity(selected.len());
        let mut tiers: Vec<Option<DiscountTier>> = Vec::with_capacity(selected.len());
        let mut deadlines: Vec<DateTime<Utc>> = Vec::new();

        // Walk the transaction so the batch comes out in due-date order.
        for installment in transaction.installments() {
            if !wanted.contains(installment.id()) {
                continue;
            }
            let (quote, tier, deadline) = quote_installment(installment, ctx);
            quotes.push(quote);
            tiers.push(tier);
            deadlines.extend(deadline);
        }

        let amounts: Vec<Decimal> = quotes.iter().map(|q| q.amount).collect();
        let original_amount: Decimal = amounts.iter().copied().sum();
        let discount_amount: Decimal = quotes.iter().map(|q| q.discount_amount).sum();
        let processing_fee = ctx.fees.batch_fee(&amounts);
        let savings = Savings::new(original_amount, discount_amount, processing_fee);

        let shared_tier = match tiers.split_first() {
            Some((Some(first), rest))
                if rest.iter().all(|t| t.as_ref().map(|t| t.id()) == Some(first.id())) =>
            {
                Some(first.clone())
            }
            _ => None,
        };

        Ok(EarlyPaymentOption {
            payment_type: PaymentType::Partial,
            transaction_id: transaction.id().clone(),
            currency: transaction.currency().clone(),
            installment_ids: quotes.iter().map(|q| q.installment_id.clone()).collect(),
            original_amount,
            tier: shared_tier,
            discount_amount: savings.discount_amount,
            processing_fee: savings.processing_fee,
            final_amount: savings.final_amount,
            net_savings: savings.net_savings,
            available_until: ctx.expiry(deadlines.into_iter().min()),
            breakdown: quotes,
        })
    }

    /// Check that every selected id names a distinct, payable installment of `transaction`.
    pub fn validate_selection(
        transaction: &Transaction,
        selected: &[InstallmentId],
    ) -> Result<(), SelectionError> {
        if selected.is_empty() {
            return Err(SelectionError::Empty);
        }
        let mut seen: HashSet<&InstallmentId> = HashSet::with_capacity(selected.len());
        for id in selected {
            if !seen.insert(id) {
                return Err(SelectionError::Duplicate(id.clone()));
            }
            let installment = transaction
                .installment(id)
                .ok_or_else(|| SelectionError::UnknownInstallment(id.clone()))?;
            match installment.status() {
                InstallmentStatus::Completed => {
                    return Err(SelectionError::AlreadySettled(id.clone()))
                }
                status if !status.is_payable() => {
                    return Err(SelectionError::NotPayable {
                        id: id.clone(),
                        status,
                    })
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::CurrencyCode;
    use crate::core::fee::{FeeRule, PartialFeeMode, StandardFeeSchedule};
    use crate::core::tier::{DayWindow, TierSchedule};
    use crate::core::transaction::Installment;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap()
    }

    fn transaction() -> Transaction {
        Transaction::new(
            "TXN-P",
            "M-1",
            CurrencyCode::new("USD"),
            vec![
                Installment::new("I-1", 1, dec!(100), now() + Duration::days(5)),
                Installment::new("I-2", 2, dec!(100), now() + Duration::days(20)),
                Installment::new("I-3", 3, dec!(100), now() + Duration::days(50))
                    .with_status(InstallmentStatus::Completed),
                Installment::new("I-4", 4, dec!(100), now() + Duration::days(80))
                    .with_status(InstallmentStatus::Processing),
            ],
        )
    }

    fn schedule() -> TierSchedule {
        TierSchedule::new(vec![
            DiscountTier::new("WEEK", DayWindow::new(0, 7), dec!(0.01)),
            DiscountTier::new("MONTH", DayWindow::new(7, 30), dec!(0.03)),
        ])
    }

    fn fees(mode: PartialFeeMode) -> StandardFeeSchedule {
        StandardFeeSchedule::new(FeeRule::default(), FeeRule::new(dec!(0), dec!(0.50)), mode)
    }

    fn ids(raw: &[&str]) -> Vec<InstallmentId> {
        raw.iter().map(|s| InstallmentId::new(*s)).collect()
    }

    #[test]
    fn test_aggregate_sums_per_installment_discounts() {
        let schedule = schedule();
        let fees = fees(PartialFeeMode::PerBatch);
        let ctx = QuoteContext::new(&schedule, &fees, now());
        let option =
            PartialSelectionAggregator::aggregate(&transaction(), &ids(&["I-2", "I-1"]), &ctx)
                .unwrap();

        assert_eq!(option.installment_ids, ids(&["I-1", "I-2"]));
        assert_eq!(option.original_amount, dec!(200));
        // 1.00 (WEEK) + 3.00 (MONTH)
        assert_eq!(option.discount_amount, dec!(4.00));
        assert_eq!(option.processing_fee, dec!(0.50));
        assert_eq!(option.net_savings, dec!(3.50));
        assert_eq!(option.final_amount, dec!(196.00));
        assert!(option.tier.is_none(), "mixed tiers have no single tier");
        // WEEK on I-1 expires at its due date, which is sooner than MONTH on I-2.
        assert_eq!(option.available_until, now() + Duration::days(5));
    }

    #[test]
    fn test_per_installment_fee_mode() {
        let schedule = schedule();
        let fees = fees(PartialFeeMode::PerInstallment);
        let ctx = QuoteContext::new(&schedule, &fees, now());
        let option =
            PartialSelectionAggregator::aggregate(&transaction(), &ids(&["I-1", "I-2"]), &ctx)
                .unwrap();
        assert_eq!(option.processing_fee, dec!(1.00));
        assert_eq!(option.net_savings, dec!(3.00));
    }

    #[test]
    fn test_single_tier_is_reported() {
        let schedule = schedule();
        let fees = fees(PartialFeeMode::PerBatch);
        let ctx = QuoteContext::new(&schedule, &fees, now());
        let option =
            PartialSelectionAggregator::aggregate(&transaction(), &ids(&["I-2"]), &ctx).unwrap();
        assert_eq!(option.tier.as_ref().map(|t| t.id().as_str()), Some("MONTH"));
        assert_eq!(option.available_until, now() + Duration::days(13));
    }

    #[test]
    fn test_untiered_selection_expires_with_ttl() {
        let schedule = TierSchedule::default();
        let fees = fees(PartialFeeMode::PerBatch);
        let ctx = QuoteContext::new(&schedule, &fees, now()).with_quote_ttl(Duration::minutes(10));
        let option =
            PartialSelectionAggregator::aggregate(&transaction(), &ids(&["I-1"]), &ctx).unwrap();
        assert_eq!(option.discount_amount, Decimal::ZERO);
        assert_eq!(option.available_until, now() + Duration::minutes(10));
    }

    #[test]
    fn test_empty_selection_rejected() {
        let schedule = schedule();
        let fees = fees(PartialFeeMode::PerBatch);
        let ctx = QuoteContext::new(&schedule, &fees, now());
        let err = PartialSelectionAggregator::aggregate(&transaction(), &[], &ctx).unwrap_err();
        assert_eq!(err, SelectionError::Empty);
    }

    #[test]
    fn test_selection_errors() {
        let txn = transaction();
        assert_eq!(
            PartialSelectionAggregator::validate_selection(&txn, &ids(&["I-9"])),
            Err(SelectionError::UnknownInstallment(InstallmentId::new("I-9")))
        );
        assert_eq!(
            PartialSelectionAggregator::validate_selection(&txn, &ids(&["I-3"])),
            Err(SelectionError::AlreadySettled(InstallmentId::new("I-3")))
        );
        assert_eq!(
            PartialSelectionAggregator::validate_selection(&txn, &ids(&["I-4"])),
            Err(SelectionError::NotPayable {
                id: InstallmentId::new("I-4"),
                status: InstallmentStatus::Processing,
            })
        );
        assert_eq!(
            PartialSelectionAggregator::validate_selection(&txn, &ids(&["I-1", "I-1"])),
            Err(SelectionError::Duplicate(InstallmentId::new("I-1")))
        );
    }
}
