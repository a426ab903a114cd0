//! Walk a four-installment plan through quoting, a partial payoff, a declined
//! card and a what-if comparison.
//!
//! ```bash
//! RUST_LOG=debug cargo run --example early_payoff
//! ```

use chrono::{Duration, TimeZone, Utc};
use early_payment_engine::core::error::CaptureError;
use early_payment_engine::prelude::*;
use env_logger::Env;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn main() -> Result<(), EngineError> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let now = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
    let plan = Transaction::new(
        "TXN-DEMO",
        "M-SHOES",
        CurrencyCode::new("USD"),
        (0..4)
            .map(|i| {
                Installment::new(
                    format!("INST-{}", i + 1),
                    i + 1,
                    dec!(75),
                    now + Duration::days(5 + 30 * i as i64),
                )
            })
            .collect(),
    );
    let terms = MerchantTerms::new(
        vec![
            DiscountTier::new("WEEK", DayWindow::new(0, 7), dec!(0.01)),
            DiscountTier::new("MONTH", DayWindow::new(7, 45), dec!(0.02)),
            DiscountTier::new("EARLY", DayWindow::open_ended(45), dec!(0.03))
                .with_maximum_discount(dec!(10)),
        ],
        StandardFeeSchedule::new(
            FeeRule::default(),
            FeeRule::new(dec!(0), dec!(0.25)),
            PartialFeeMode::PerBatch,
        ),
    );

    let gateway = Arc::new(SimulatedGateway::new());
    let ledger = Arc::new(InMemoryLedger::with_transactions(vec![plan]));
    let clock = Arc::new(FixedClock::new(now));
    let engine = EarlyPaymentEngine::new(
        ledger.clone(),
        gateway.clone(),
        Arc::new(InMemoryMerchantConfig::new().with_merchant("M-SHOES", terms)),
        Arc::new(InMemoryAuditSink::new()),
        clock.clone(),
        EngineConfig::default(),
    );
    let txn = TransactionId::new("TXN-DEMO");

    println!("=== Options on {} ===", now.date_naive());
    for option in engine.generate_options(&txn)? {
        println!(
            "  {:?} {:?}: pay {} instead of {} (net savings {}, until {})",
            option.payment_type,
            option.installment_ids,
            option.amount_due(),
            option.original_amount,
            option.net_savings,
            option.available_until
        );
    }

    // The first card is declined; the retry with another card goes through.
    let partial = EarlyPaymentRequest::partial(
        "TXN-DEMO",
        vec![InstallmentId::new("INST-3"), InstallmentId::new("INST-4")],
        dec!(150),
        "pm_card_expired",
    );
    gateway.fail_next(CaptureError::Declined {
        reason: "card expired".into(),
    });
    let declined = engine.commit(&partial)?;
    println!("\nFirst attempt: {:?} ({:?})", declined.status, declined.customer_reason);

    let retry = EarlyPaymentRequest {
        payment_method: "pm_card_new".into(),
        ..partial
    };
    let paid = engine.commit(&retry)?;
    println!(
        "Second attempt: {:?}, charged {} for {:?}",
        paid.status, paid.amount_charged, paid.settled_installments
    );

    clock.advance(Duration::days(2));
    let remaining = ledger.get_transaction(&txn).map_err(EngineError::from)?;
    let scenarios = vec![
        Scenario::new(
            "pay next now",
            PaymentType::Partial,
            ScenarioTarget::Amount(dec!(75)),
            clock.now(),
        ),
        Scenario::new(
            "pay rest now",
            PaymentType::Full,
            ScenarioTarget::Amount(remaining.outstanding_amount()),
            clock.now(),
        ),
        Scenario::new(
            "pay second next week",
            PaymentType::Partial,
            ScenarioTarget::Installments(vec![InstallmentId::new("INST-2")]),
            clock.now() + Duration::days(7),
        ),
    ];
    println!("\n{}", engine.simulate(&txn, &scenarios)?);

    Ok(())
}
