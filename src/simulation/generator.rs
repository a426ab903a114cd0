//! Random installment plans for demos, benchmarks and property tests.

use crate::core::currency::{round_money, CurrencyCode};
use crate::core::tier::{DayWindow, DiscountTier};
use crate::core::transaction::{Installment, Transaction};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;

/// Shape of a generated plan.
#[derive(Debug, Clone)]
pub struct PlanConfig {
    pub installment_count: usize,
    /// Days between consecutive due dates.
    pub interval_days: i64,
    /// Days from now until the first due date.
    pub first_due_in_days: i64,
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub currency: CurrencyCode,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            installment_count: 4,
            interval_days: 14,
            first_due_in_days: 14,
            min_amount: Decimal::from(25),
            max_amount: Decimal::from(500),
            currency: CurrencyCode::default(),
        }
    }
}

/// Generate an active transaction with random installment amounts.
pub fn generate_random_plan(
    rng: &mut impl Rng,
    id: &str,
    merchant: &str,
    config: &PlanConfig,
    now: DateTime<Utc>,
) -> Transaction {
    let min_cents = to_cents(config.min_amount).max(1);
    let max_cents = to_cents(config.max_amount).max(min_cents + 1);

    let installments = (0..config.installment_count)
        .map(|i| {
            let cents = rng.gen_range(min_cents..max_cents);
            let due = now
                + Duration::days(config.first_due_in_days + config.interval_days * i as i64);
            Installment::new(
                format!("{id}-{:02}", i + 1),
                i as u32 + 1,
                Decimal::new(cents, 2),
                due,
            )
        })
        .collect();

    Transaction::new(id, merchant, config.currency.clone(), installments)
}

/// A simple laddered tier schedule: the earlier the payment, the larger the rate.
pub fn laddered_tiers(steps: usize, step_days: i64, base_rate: Decimal) -> Vec<DiscountTier> {
    (0..steps)
        .map(|i| {
            let start = step_days * i as i64;
            let window = if i + 1 == steps {
                DayWindow::open_ended(start)
            } else {
                DayWindow::new(start, start + step_days)
            };
            DiscountTier::new(
                format!("STEP-{}", i + 1),
                window,
                base_rate * Decimal::from(i as u64 + 1),
            )
        })
        .collect()
}

fn to_cents(amount: Decimal) -> i64 {
    let cents = round_money(amount) * Decimal::from(100);
    cents.trunc().to_string().parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tier::TierSchedule;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;

    #[test]
    fn test_random_plan_generation() {
        let mut rng = StdRng::seed_from_u64(7);
        let now = Utc::now();
        let config = PlanConfig {
            installment_count: 6,
            ..Default::default()
        };
        let txn = generate_random_plan(&mut rng, "TXN-R", "M-1", &config, now);

        assert_eq!(txn.installments().len(), 6);
        assert!(txn.is_active());
        for installment in txn.installments() {
            assert!(installment.amount() >= config.min_amount);
            assert!(installment.amount() < config.max_amount);
            assert_eq!(installment.amount(), installment.amount().round_dp(2));
        }
        assert_eq!(txn.outstanding_amount(), txn.total_amount());
    }

    #[test]
    fn test_same_seed_same_plan() {
        let now = Utc::now();
        let config = PlanConfig::default();
        let a = generate_random_plan(&mut StdRng::seed_from_u64(1), "T", "M", &config, now);
        let b = generate_random_plan(&mut StdRng::seed_from_u64(1), "T", "M", &config, now);
        assert_eq!(a, b);
    }

    #[test]
    fn test_laddered_tiers_are_valid() {
        let schedule = TierSchedule::new(laddered_tiers(3, 10, dec!(0.01)));
        assert_eq!(schedule.tiers().len(), 3);
        assert!(schedule.warnings().is_empty());
        assert_eq!(schedule.tiers()[2].discount_rate(), dec!(0.03));
        assert!(schedule.tiers()[2].window().contains(1_000));
    }
}
