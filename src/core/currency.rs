use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of decimal places every monetary amount is quantised to.
pub const MINOR_UNIT_SCALE: u32 = 2;

/// ISO 4217-style currency code.
///
/// # Examples
///
/// ```
/// use early_payment_engine::core::currency::CurrencyCode;
///
/// let usd = CurrencyCode::new("USD");
/// let eur = CurrencyCode::new("EUR");
/// assert_ne!(usd, eur);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CurrencyCode {
    fn default() -> Self {
        Self::new("USD")
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CurrencyCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Quantise an amount to minor units using banker's rounding.
///
/// Discounts and fees pass through here exactly once, at the point they are
/// computed. Anything derived from them afterwards is plain subtraction, so
/// no rounding error can accumulate.
///
/// ```
/// use early_payment_engine::core::currency::round_money;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(round_money(dec!(1.005)), dec!(1.00));
/// assert_eq!(round_money(dec!(1.015)), dec!(1.02));
/// assert_eq!(round_money(dec!(4.999)), dec!(5.00));
/// ```
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointNearestEven)
}

/// Whether two amounts agree to within `epsilon`.
pub fn within_epsilon(a: Decimal, b: Decimal, epsilon: Decimal) -> bool {
    (a - b).abs() <= epsilon
}

/// Convert a non-money ratio to `f64` for scoring and display.
pub fn ratio_to_f64(ratio: Decimal) -> f64 {
    ratio.to_string().parse::<f64>().unwrap_or(0.0)
}
