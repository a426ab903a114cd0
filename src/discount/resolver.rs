use crate::core::tier::{DiscountTier, TierSchedule};
use crate::core::transaction::Installment;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

/// Whole days between `now` and `due`, rounded down.
///
/// Only meaningful while `now` is before `due`; callers check that first.
pub fn days_early(now: DateTime<Utc>, due: DateTime<Utc>) -> i64 {
    (due - now).num_days()
}

/// Decides which discount tier, if any, applies to an installment at a given moment.
///
/// Tiers are matched on whole days before the due date and on the amount
/// being paid. A schedule should never have two tiers match at once; when it
/// does, the tier with the smallest window start wins and the clash is logged
/// as a configuration warning rather than failing the request.
pub struct DiscountScheduleResolver;

impl DiscountScheduleResolver {
    /// Resolve the tier for an installment paid at `now`.
    ///
    /// # Examples
    ///
    /// ```
    /// use early_payment_engine::core::tier::{DayWindow, DiscountTier, TierSchedule};
    /// use early_payment_engine::core::transaction::Installment;
    /// use early_payment_engine::discount::resolver::DiscountScheduleResolver;
    /// use chrono::{Duration, TimeZone, Utc};
    /// use rust_decimal_macros::dec;
    ///
    /// let due = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
    /// let installment = Installment::new("I-1", 1, dec!(250), due);
    /// let schedule = TierSchedule::new(vec![
    ///     DiscountTier::new("WEEK", DayWindow::new(0, 7), dec!(0.02)),
    /// ]);
    ///
    /// let tier = DiscountScheduleResolver::resolve(&installment, &schedule, due - Duration::days(3));
    /// assert_eq!(tier.map(|t| t.id().as_str()), Some("WEEK"));
    ///
    /// // On the due date there is nothing early about the payment.
    /// assert!(DiscountScheduleResolver::resolve(&installment, &schedule, due).is_none());
    /// ```
    pub fn resolve<'a>(
        installment: &Installment,
        schedule: &'a TierSchedule,
        now: DateTime<Utc>,
    ) -> Option<&'a DiscountTier> {
        Self::resolve_for(installment.due_date(), installment.amount(), schedule, now)
    }

    /// Resolve against an explicit due date and payment amount.
    ///
    /// Used for full payoffs, where the window is measured against the nearest
    /// due date but the minimum is checked against the whole balance.
    pub fn resolve_for<'a>(
        due_date: DateTime<Utc>,
        amount: Decimal,
        schedule: &'a TierSchedule,
        now: DateTime<Utc>,
    ) -> Option<&'a DiscountTier> {
        if now >= due_date {
            return None;
        }
        let days = days_early(now, due_date);
        let mut matching = schedule.tiers().iter().filter(|t| t.matches(days, amount));
        let winner = matching.next()?;
        for shadowed in matching {
            log::warn!(
                "tiers {} and {} both match {} days early; using {}",
                winner.id(),
                shadowed.id(),
                days,
                winner.id()
            );
        }
        Some(winner)
    }

    /// The last moment a payment still qualifies for `tier` against `due_date`.
    pub fn tier_expiry(tier: &DiscountTier, due_date: DateTime<Utc>) -> DateTime<Utc> {
        due_date - Duration::days(tier.window().start_days)
    }
}
