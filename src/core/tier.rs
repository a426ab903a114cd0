use crate::core::ids::TierId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A half-open window `[start_days, end_days)` measured in whole days before
/// a due date. `end_days = None` leaves the window unbounded above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub start_days: i64,
    pub end_days: Option<i64>,
}

impl DayWindow {
    pub fn new(start_days: i64, end_days: i64) -> Self {
        Self {
            start_days,
            end_days: Some(end_days),
        }
    }

    /// A window that starts at `start_days` and never closes.
    pub fn open_ended(start_days: i64) -> Self {
        Self {
            start_days,
            end_days: None,
        }
    }

    pub fn contains(&self, days_early: i64) -> bool {
        days_early >= self.start_days && self.end_days.map_or(true, |end| days_early < end)
    }

    pub fn is_empty(&self) -> bool {
        self.end_days.is_some_and(|end| end <= self.start_days)
    }

    pub fn overlaps(&self, other: &DayWindow) -> bool {
        let self_before_other = self.end_days.is_some_and(|end| end <= other.start_days);
        let other_before_self = other.end_days.is_some_and(|end| end <= self.start_days);
        !(self_before_other || other_before_self)
    }
}

impl fmt::Display for DayWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end_days {
            Some(end) => write!(f, "{}-{}d", self.start_days, end),
            None => write!(f, "{}d+", self.start_days),
        }
    }
}

/// A merchant rule mapping "days paid before due" to a discount rate.
///
/// # Examples
///
/// ```
/// use early_payment_engine::core::tier::{DayWindow, DiscountTier};
/// use rust_decimal_macros::dec;
///
/// let tier = DiscountTier::new("EARLY-7", DayWindow::new(0, 7), dec!(0.02))
///     .with_minimum_amount(dec!(50))
///     .with_maximum_discount(dec!(100));
///
/// assert!(tier.window().contains(3));
/// assert!(!tier.window().contains(7));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountTier {
    id: TierId,
    window: DayWindow,
    /// Fraction of the amount, in `[0, 1]`.
    discount_rate: Decimal,
    #[serde(default)]
    minimum_amount: Decimal,
    #[serde(default)]
    maximum_discount: Option<Decimal>,
}

impl DiscountTier {
    pub fn new(id: impl Into<TierId>, window: DayWindow, discount_rate: Decimal) -> Self {
        Self {
            id: id.into(),
            window,
            discount_rate,
            minimum_amount: Decimal::ZERO,
            maximum_discount: None,
        }
    }

    pub fn with_minimum_amount(mut self, minimum_amount: Decimal) -> Self {
        self.minimum_amount = minimum_amount;
        self
    }

    pub fn with_maximum_discount(mut self, maximum_discount: Decimal) -> Self {
        self.maximum_discount = Some(maximum_discount);
        self
    }

    pub fn id(&self) -> &TierId {
        &self.id
    }

    pub fn window(&self) -> &DayWindow {
        &self.window
    }

    pub fn discount_rate(&self) -> Decimal {
        self.discount_rate
    }

    pub fn minimum_amount(&self) -> Decimal {
        self.minimum_amount
    }

    pub fn maximum_discount(&self) -> Option<Decimal> {
        self.maximum_discount
    }

    /// Whether `days_early` and `amount` both qualify for this tier.
    pub fn matches(&self, days_early: i64, amount: Decimal) -> bool {
        self.window.contains(days_early) && self.minimum_amount <= amount
    }

    fn defect(&self) -> Option<String> {
        if self.discount_rate < Decimal::ZERO || self.discount_rate > Decimal::ONE {
            return Some(format!("discount rate {} outside [0, 1]", self.discount_rate));
        }
        if self.window.start_days < 0 {
            return Some(format!("window {} starts before the due date", self.window));
        }
        if self.window.is_empty() {
            return Some(format!("window {} is empty", self.window));
        }
        if self.minimum_amount < Decimal::ZERO {
            return Some(format!("negative minimum amount {}", self.minimum_amount));
        }
        if self.maximum_discount.is_some_and(|cap| cap < Decimal::ZERO) {
            return Some("negative maximum discount".to_string());
        }
        None
    }
}

/// A non-fatal problem found in merchant tier configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigurationWarning {
    /// The tier was dropped from the schedule.
    MalformedTier { tier: TierId, reason: String },
    /// Two tiers cover some of the same days. The one with the smaller window
    /// start wins whenever both match.
    OverlappingTiers { first: TierId, second: TierId },
}

impl fmt::Display for ConfigurationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationWarning::MalformedTier { tier, reason } => {
                write!(f, "tier {} ignored: {}", tier, reason)
            }
            ConfigurationWarning::OverlappingTiers { first, second } => {
                write!(f, "tiers {} and {} overlap; {} takes precedence", first, second, first)
            }
        }
    }
}

/// A merchant's validated discount tiers, ordered by window start.
///
/// Building a schedule never fails: malformed tiers are dropped and overlaps
/// are kept, with both reported as [`ConfigurationWarning`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierSchedule {
    tiers: Vec<DiscountTier>,
    warnings: Vec<ConfigurationWarning>,
}

impl TierSchedule {
    pub fn new(tiers: Vec<DiscountTier>) -> Self {
        let mut warnings = Vec::new();
        let mut kept: Vec<DiscountTier> = Vec::with_capacity(tiers.len());
        for tier in tiers {
            match tier.defect() {
                Some(reason) => warnings.push(ConfigurationWarning::MalformedTier {
                    tier: tier.id.clone(),
                    reason,
                }),
                None => kept.push(tier),
            }
        }
        kept.sort_by(|a, b| {
            a.window
                .start_days
                .cmp(&b.window.start_days)
                .then_with(|| a.id.cmp(&b.id))
        });

        for (i, first) in kept.iter().enumerate() {
            for second in kept.iter().skip(i + 1) {
                if first.window.overlaps(&second.window) {
                    warnings.push(ConfigurationWarning::OverlappingTiers {
                        first: first.id.clone(),
                        second: second.id.clone(),
                    });
                }
            }
        }

        for warning in &warnings {
            log::warn!("discount tier configuration: {}", warning);
        }

        Self {
            tiers: kept,
            warnings,
        }
    }

    /// Tiers in ascending window-start order.
    pub fn tiers(&self) -> &[DiscountTier] {
        &self.tiers
    }

    pub fn warnings(&self) -> &[ConfigurationWarning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn get(&self, id: &TierId) -> Option<&DiscountTier> {
        self.tiers.iter().find(|t| &t.id == id)
    }
}
