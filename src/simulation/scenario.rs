//! "What-if" evaluation of hypothetical early payments.
//!
//! The simulator prices each scenario with the same generator and aggregator
//! the live quoting path uses, but at the scenario's own payment date, and
//! never commits anything.

use crate::core::currency::ratio_to_f64;
use crate::core::ids::InstallmentId;
use crate::core::option::{EarlyPaymentOption, PaymentType};
use crate::core::transaction::Transaction;
use crate::options::generator::OptionGenerator;
use crate::options::partial::PartialSelectionAggregator;
use crate::options::QuoteContext;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Weight of relative net savings in the recommendation score.
pub const SAVINGS_WEIGHT: f64 = 0.7;
/// Weight of urgency (`1 / days until the offer expires`) in the recommendation score.
pub const URGENCY_WEIGHT: f64 = 0.3;

/// What a scenario pays off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioTarget {
    /// Pay this original amount, taken from the earliest-due installments.
    Amount(Decimal),
    /// Pay exactly these installments.
    Installments(Vec<InstallmentId>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub label: String,
    pub payment_type: PaymentType,
    pub target: ScenarioTarget,
    pub payment_date: DateTime<Utc>,
}

impl Scenario {
    pub fn new(
        label: impl Into<String>,
        payment_type: PaymentType,
        target: ScenarioTarget,
        payment_date: DateTime<Utc>,
    ) -> Self {
        Self {
            label: label.into(),
            payment_type,
            target,
            payment_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Projection {
    Projected {
        option: EarlyPaymentOption,
        score: f64,
    },
    Infeasible {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub scenario: Scenario,
    pub projection: Projection,
}

impl ScenarioOutcome {
    pub fn option(&self) -> Option<&EarlyPaymentOption> {
        match &self.projection {
            Projection::Projected { option, .. } => Some(option),
            Projection::Infeasible { .. } => None,
        }
    }

    pub fn score(&self) -> Option<f64> {
        match &self.projection {
            Projection::Projected { score, .. } => Some(*score),
            Projection::Infeasible { .. } => None,
        }
    }

    pub fn is_feasible(&self) -> bool {
        self.option().is_some()
    }
}

/// Outcomes in the order the scenarios were supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub outcomes: Vec<ScenarioOutcome>,
}

impl ScenarioReport {
    /// Feasible outcomes, highest score first; equal scores by label.
    pub fn ranked(&self) -> Vec<&ScenarioOutcome> {
        let mut ranked: Vec<&ScenarioOutcome> =
            self.outcomes.iter().filter(|o| o.is_feasible()).collect();
        ranked.sort_by(|a, b| {
            let by_score = match (a.score(), b.score()) {
                (Some(x), Some(y)) => y.total_cmp(&x),
                _ => Ordering::Equal,
            };
            by_score.then_with(|| a.scenario.label.cmp(&b.scenario.label))
        });
        ranked
    }

    pub fn recommended(&self) -> Option<&ScenarioOutcome> {
        self.ranked().into_iter().next()
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Scenario Report ===")?;
        writeln!(f, "Scenarios:      {}", self.outcomes.len())?;
        writeln!(f, "Feasible:       {}", self.ranked().len())?;
        for outcome in &self.outcomes {
            writeln!(
                f,
                "\n[{}] {} on {}",
                outcome.scenario.label,
                outcome.scenario.payment_type,
                outcome.scenario.payment_date.date_naive()
            )?;
            match &outcome.projection {
                Projection::Projected { option, score } => {
                    writeln!(f, "  Score:         {:.4}", score)?;
                    write!(f, "{}", option)?;
                }
                Projection::Infeasible { reason } => writeln!(f, "  Infeasible:    {}", reason)?,
            }
        }
        if let Some(best) = self.recommended() {
            writeln!(f, "\nRecommended:    {}", best.scenario.label)?;
        }
        Ok(())
    }
}

/// Scores hypothetical payments against a transaction snapshot.
pub struct ScenarioSimulator;

impl ScenarioSimulator {
    /// Evaluate every scenario independently. An infeasible scenario is
    /// reported as such and never fails the batch.
    pub fn simulate(
        transaction: &Transaction,
        scenarios: &[Scenario],
        ctx: &QuoteContext<'_>,
    ) -> ScenarioReport {
        let outcomes = scenarios
            .iter()
            .map(|scenario| {
                let projection = match Self::project(transaction, scenario, ctx) {
                    Ok(option) => Projection::Projected {
                        score: Self::score(&option, scenario.payment_date),
                        option,
                    },
                    Err(reason) => {
                        log::debug!("scenario {} infeasible: {}", scenario.label, reason);
                        Projection::Infeasible { reason }
                    }
                };
                ScenarioOutcome {
                    scenario: scenario.clone(),
                    projection,
                }
            })
            .collect();
        ScenarioReport { outcomes }
    }

    /// `SAVINGS_WEIGHT * net/original + URGENCY_WEIGHT / max(1, days until expiry)`.
    pub fn score(option: &EarlyPaymentOption, payment_date: DateTime<Utc>) -> f64 {
        let relative = if option.original_amount > Decimal::ZERO {
            ratio_to_f64(option.net_savings / option.original_amount)
        } else {
            0.0
        };
        let days = (option.available_until - payment_date).num_days().max(1);
        SAVINGS_WEIGHT * relative + URGENCY_WEIGHT / days as f64
    }

    fn project(
        transaction: &Transaction,
        scenario: &Scenario,
        ctx: &QuoteContext<'_>,
    ) -> Result<EarlyPaymentOption, String> {
        if !transaction.is_active() {
            return Err(format!("transaction is {:?}", transaction.status()));
        }
        if scenario.payment_date < ctx.now {
            return Err("payment date is in the past".into());
        }
        let ctx = ctx.at(scenario.payment_date);

        match (scenario.payment_type, &scenario.target) {
            (PaymentType::Full, ScenarioTarget::Amount(amount)) => {
                let option = OptionGenerator::full_option(transaction, &ctx)
                    .ok_or_else(|| "nothing left to pay".to_string())?;
                if option.original_amount != *amount {
                    return Err(format!(
                        "a full payoff is {}, not {}",
                        option.original_amount, amount
                    ));
                }
                Ok(option)
            }
            (PaymentType::Full, ScenarioTarget::Installments(_)) => {
                Err("a full payoff cannot name installments".into())
            }
            (PaymentType::Partial, _) if !ctx.allows_partial => {
                Err("merchant does not allow partial payments".into())
            }
            (PaymentType::Partial, ScenarioTarget::Amount(amount)) => {
                let selection = Self::earliest_covering(transaction, *amount)?;
                PartialSelectionAggregator::aggregate(transaction, &selection, &ctx)
                    .map_err(|e| e.to_string())
            }
            (PaymentType::Partial, ScenarioTarget::Installments(ids)) => {
                PartialSelectionAggregator::aggregate(transaction, ids, &ctx)
                    .map_err(|e| e.to_string())
            }
        }
    }

    /// The earliest-due payable installments whose amounts add up to exactly `amount`.
    fn earliest_covering(
        transaction: &Transaction,
        amount: Decimal,
    ) -> Result<Vec<InstallmentId>, String> {
        let mut running = Decimal::ZERO;
        let mut selection = Vec::new();
        for installment in transaction.payable_installments() {
            if running >= amount {
                break;
            }
            running += installment.amount();
            selection.push(installment.id().clone());
        }
        if amount > Decimal::ZERO && running == amount {
            Ok(selection)
        } else {
            Err(format!(
                "{} does not match a run of earliest-due installments",
                amount
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::CurrencyCode;
    use crate::core::fee::StandardFeeSchedule;
    use crate::core::tier::{DayWindow, DiscountTier, TierSchedule};
    use crate::core::transaction::Installment;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap()
    }

    fn transaction() -> Transaction {
        Transaction::new(
            "TXN-SIM",
            "M-1",
            CurrencyCode::new("USD"),
            vec![
                Installment::new("I-1", 1, dec!(100), now() + Duration::days(20)),
                Installment::new("I-2", 2, dec!(100), now() + Duration::days(50)),
                Installment::new("I-3", 3, dec!(100), now() + Duration::days(80)),
            ],
        )
    }

    fn schedule() -> TierSchedule {
        TierSchedule::new(vec![
            DiscountTier::new("NEAR", DayWindow::new(0, 30), dec!(0.01)),
            DiscountTier::new("FAR", DayWindow::open_ended(30), dec!(0.03)),
        ])
    }

    #[test]
    fn test_score_blends_savings_and_urgency() {
        let schedule = schedule();
        let fees = StandardFeeSchedule::free();
        let ctx = QuoteContext::new(&schedule, &fees, now());
        let report = ScenarioSimulator::simulate(
            &transaction(),
            &[Scenario::new(
                "first",
                PaymentType::Partial,
                ScenarioTarget::Installments(vec![InstallmentId::new("I-1")]),
                now(),
            )],
            &ctx,
        );
        // NEAR: 1.00 off 100, offer runs until the due date 20 days out.
        assert_relative_eq!(
            report.outcomes[0].score().unwrap(),
            0.7 * 0.01 + 0.3 / 20.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_amount_target_takes_earliest_installments() {
        let schedule = schedule();
        let fees = StandardFeeSchedule::free();
        let ctx = QuoteContext::new(&schedule, &fees, now());
        let scenarios = vec![
            Scenario::new("two", PaymentType::Partial, ScenarioTarget::Amount(dec!(200)), now()),
            Scenario::new("odd", PaymentType::Partial, ScenarioTarget::Amount(dec!(150)), now()),
        ];
        let report = ScenarioSimulator::simulate(&transaction(), &scenarios, &ctx);

        let option = report.outcomes[0].option().unwrap();
        assert_eq!(
            option.installment_ids,
            vec![InstallmentId::new("I-1"), InstallmentId::new("I-2")]
        );
        assert!(!report.outcomes[1].is_feasible());
    }

    #[test]
    fn test_payment_date_moves_tier() {
        let schedule = schedule();
        let fees = StandardFeeSchedule::free();
        let ctx = QuoteContext::new(&schedule, &fees, now());
        let target = ScenarioTarget::Installments(vec![InstallmentId::new("I-2")]);
        let scenarios = vec![
            Scenario::new("today", PaymentType::Partial, target.clone(), now()),
            Scenario::new("later", PaymentType::Partial, target, now() + Duration::days(30)),
        ];
        let report = ScenarioSimulator::simulate(&transaction(), &scenarios, &ctx);
        // 50 days early is FAR; 20 days early is NEAR.
        assert_eq!(report.outcomes[0].option().unwrap().discount_amount, dec!(3.00));
        assert_eq!(report.outcomes[1].option().unwrap().discount_amount, dec!(1.00));
    }

    #[test]
    fn test_full_scenario_amount_must_match() {
        let schedule = schedule();
        let fees = StandardFeeSchedule::free();
        let ctx = QuoteContext::new(&schedule, &fees, now());
        let scenarios = vec![
            Scenario::new("all", PaymentType::Full, ScenarioTarget::Amount(dec!(300)), now()),
            Scenario::new("short", PaymentType::Full, ScenarioTarget::Amount(dec!(299)), now()),
        ];
        let report = ScenarioSimulator::simulate(&transaction(), &scenarios, &ctx);
        assert!(report.outcomes[0].is_feasible());
        assert!(!report.outcomes[1].is_feasible());
    }

    #[test]
    fn test_ranked_orders_by_score_then_label() {
        let schedule = schedule();
        let fees = StandardFeeSchedule::free();
        let ctx = QuoteContext::new(&schedule, &fees, now());
        let one = ScenarioTarget::Installments(vec![InstallmentId::new("I-3")]);
        let scenarios = vec![
            Scenario::new("b", PaymentType::Partial, one.clone(), now()),
            Scenario::new("a", PaymentType::Partial, one, now()),
            Scenario::new("bad", PaymentType::Partial, ScenarioTarget::Amount(dec!(1)), now()),
            Scenario::new(
                "near",
                PaymentType::Partial,
                ScenarioTarget::Installments(vec![InstallmentId::new("I-1")]),
                now(),
            ),
        ];
        let report = ScenarioSimulator::simulate(&transaction(), &scenarios, &ctx);

        let labels: Vec<&str> = report
            .ranked()
            .iter()
            .map(|o| o.scenario.label.as_str())
            .collect();
        assert_eq!(labels, vec!["a", "b", "near"]);
        assert_eq!(report.outcomes.len(), 4, "input order and infeasible kept");
        assert_eq!(report.recommended().unwrap().scenario.label, "a");
    }

    #[test]
    fn test_past_payment_date_is_infeasible() {
        let schedule = schedule();
        let fees = StandardFeeSchedule::free();
        let ctx = QuoteContext::new(&schedule, &fees, now());
        let report = ScenarioSimulator::simulate(
            &transaction(),
            &[Scenario::new(
                "yesterday",
                PaymentType::Full,
                ScenarioTarget::Amount(dec!(300)),
                now() - Duration::days(1),
            )],
            &ctx,
        );
        assert!(!report.outcomes[0].is_feasible());
        assert!(report.to_string().contains("Infeasible"));
    }
}
