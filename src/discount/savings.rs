use crate::core::currency::round_money;
use crate::core::fee::FeeSchedule;
use crate::core::option::PaymentType;
use crate::core::tier::DiscountTier;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The money breakdown of paying `amount` early.
///
/// Always satisfies `discount_amount + final_amount == amount` exactly and
/// `net_savings == discount_amount - processing_fee`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Savings {
    pub discount_amount: Decimal,
    pub processing_fee: Decimal,
    pub final_amount: Decimal,
    pub net_savings: Decimal,
}

impl Savings {
    /// Assemble a breakdown from an already-rounded discount and fee.
    pub fn new(amount: Decimal, discount_amount: Decimal, processing_fee: Decimal) -> Self {
        Self {
            discount_amount,
            processing_fee,
            final_amount: amount - discount_amount,
            net_savings: discount_amount - processing_fee,
        }
    }
}

/// Computes discount, processing fee and net savings for an early payment.
pub struct SavingsCalculator;

impl SavingsCalculator {
    /// Discount granted by `tier` on `amount`.
    ///
    /// `amount × rate`, rounded to minor units, then capped by the tier's
    /// maximum discount and by the amount itself.
    pub fn discount(amount: Decimal, tier: Option<&DiscountTier>) -> Decimal {
        let Some(tier) = tier else {
            return Decimal::ZERO;
        };
        let raw = round_money(amount * tier.discount_rate());
        let capped = tier.maximum_discount().map_or(raw, |cap| raw.min(cap));
        capped.min(amount).max(Decimal::ZERO)
    }

    /// Full breakdown for one charge of `amount`.
    ///
    /// # Examples
    ///
    /// ```
    /// use early_payment_engine::core::fee::StandardFeeSchedule;
    /// use early_payment_engine::core::option::PaymentType;
    /// use early_payment_engine::core::tier::{DayWindow, DiscountTier};
    /// use early_payment_engine::discount::savings::SavingsCalculator;
    /// use rust_decimal_macros::dec;
    ///
    /// let tier = DiscountTier::new("WEEK", DayWindow::new(0, 7), dec!(0.02))
    ///     .with_minimum_amount(dec!(50))
    ///     .with_maximum_discount(dec!(100));
    /// let savings = SavingsCalculator::calculate(
    ///     dec!(250.00),
    ///     Some(&tier),
    ///     PaymentType::Full,
    ///     &StandardFeeSchedule::free(),
    /// );
    ///
    /// assert_eq!(savings.discount_amount, dec!(5.00));
    /// assert_eq!(savings.final_amount, dec!(245.00));
    /// ```
    pub fn calculate(
        amount: Decimal,
        tier: Option<&DiscountTier>,
        payment_type: PaymentType,
        fees: &dyn FeeSchedule,
    ) -> Savings {
        let discount = Self::discount(amount, tier);
        let fee = fees.fee(payment_type, amount);
        Savings::new(amount, discount, fee)
    }
}
