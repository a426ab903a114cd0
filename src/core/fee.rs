use crate::core::currency::round_money;
use crate::core::option::PaymentType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// How a partial payment covering several installments is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialFeeMode {
    /// One fee computed on the combined amount of the batch.
    #[default]
    PerBatch,
    /// The partial fee rule applied to each installment separately, then summed.
    PerInstallment,
}

/// The processing fee charged for accelerating a payment.
///
/// Implementations are pure functions of their inputs: the engine calls them
/// from any number of threads and expects identical answers for identical
/// arguments.
pub trait FeeSchedule: Debug + Send + Sync {
    /// Fee for a single charge of `amount` of the given payment type.
    fn fee(&self, payment_type: PaymentType, amount: Decimal) -> Decimal;

    /// How partial batches are charged.
    fn partial_fee_mode(&self) -> PartialFeeMode;

    /// Fee for a partial batch made of `amounts`, honouring [`PartialFeeMode`].
    fn batch_fee(&self, amounts: &[Decimal]) -> Decimal {
        match self.partial_fee_mode() {
            PartialFeeMode::PerBatch => {
                let combined: Decimal = amounts.iter().copied().sum();
                self.fee(PaymentType::Partial, combined)
            }
            PartialFeeMode::PerInstallment => amounts
                .iter()
                .map(|amount| self.fee(PaymentType::Partial, *amount))
                .sum(),
        }
    }
}

/// A percentage-plus-fixed fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeRule {
    #[serde(default)]
    pub rate: Decimal,
    #[serde(default)]
    pub fixed: Decimal,
}

impl FeeRule {
    pub fn new(rate: Decimal, fixed: Decimal) -> Self {
        Self { rate, fixed }
    }

    pub fn apply(&self, amount: Decimal) -> Decimal {
        (round_money(amount * self.rate) + self.fixed).max(Decimal::ZERO)
    }
}

/// Fee schedule with one rule for full payoffs and one for partial payments.
///
/// # Examples
///
/// ```
/// use early_payment_engine::core::fee::{FeeRule, FeeSchedule, PartialFeeMode, StandardFeeSchedule};
/// use early_payment_engine::core::option::PaymentType;
/// use rust_decimal_macros::dec;
///
/// let schedule = StandardFeeSchedule::new(
///     FeeRule::new(dec!(0), dec!(0)),
///     FeeRule::new(dec!(0), dec!(1.50)),
///     PartialFeeMode::PerBatch,
/// );
///
/// // A batch of two installments pays the fixed fee once.
/// assert_eq!(schedule.batch_fee(&[dec!(50), dec!(50)]), dec!(1.50));
/// assert_eq!(schedule.fee(PaymentType::Full, dec!(100)), dec!(0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StandardFeeSchedule {
    #[serde(default)]
    pub full: FeeRule,
    #[serde(default)]
    pub partial: FeeRule,
    #[serde(default)]
    pub partial_mode: PartialFeeMode,
}

impl StandardFeeSchedule {
    pub fn new(full: FeeRule, partial: FeeRule, partial_mode: PartialFeeMode) -> Self {
        Self {
            full,
            partial,
            partial_mode,
        }
    }

    /// A schedule that never charges anything.
    pub fn free() -> Self {
        Self::default()
    }
}

impl FeeSchedule for StandardFeeSchedule {
    fn fee(&self, payment_type: PaymentType, amount: Decimal) -> Decimal {
        match payment_type {
            PaymentType::Full => self.full.apply(amount),
            PaymentType::Partial => self.partial.apply(amount),
        }
    }

    fn partial_fee_mode(&self) -> PartialFeeMode {
        self.partial_mode
    }
}
