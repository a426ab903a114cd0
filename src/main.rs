//! early-payment-engine CLI
//!
//! Quote, commit and simulate early payments from a JSON input file.
//!
//! # Usage
//!
//! ```bash
//! # Ranked options for every transaction in the file
//! early-payment-engine options --input plan.json
//!
//! # Side-effect-free quotes for the file's requests
//! early-payment-engine quote --input plan.json --format json
//!
//! # Commit the requests against in-memory collaborators
//! RUST_LOG=debug early-payment-engine commit --input plan.json
//!
//! # What-if scenarios
//! early-payment-engine simulate --input plan.json
//!
//! # Generate a random plan to experiment with
//! early-payment-engine generate --installments 6 --seed 42 --output plan.json
//! ```

use chrono::{DateTime, Utc};
use early_payment_engine::clock::{Clock, FixedClock, SystemClock};
use early_payment_engine::config::EngineConfig;
use early_payment_engine::core::currency::CurrencyCode;
use early_payment_engine::core::fee::{FeeRule, PartialFeeMode, StandardFeeSchedule};
use early_payment_engine::core::ids::TransactionId;
use early_payment_engine::core::option::{EarlyPaymentRequest, PaymentType};
use early_payment_engine::core::transaction::{Installment, InstallmentStatus, Transaction, TransactionStatus};
use early_payment_engine::engine::EarlyPaymentEngine;
use early_payment_engine::merchant::{InMemoryMerchantConfig, MerchantTerms};
use early_payment_engine::settlement::audit::LogAuditSink;
use early_payment_engine::settlement::gateway::SimulatedGateway;
use early_payment_engine::settlement::ledger::InMemoryLedger;
use early_payment_engine::simulation::generator::{generate_random_plan, laddered_tiers, PlanConfig};
use early_payment_engine::simulation::scenario::{Scenario, ScenarioTarget};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::process;
use std::sync::Arc;

fn print_usage() {
    eprintln!(
        r#"early-payment-engine: early payment discounts, quotes and settlement

USAGE:
    early-payment-engine <COMMAND> [OPTIONS]

COMMANDS:
    options     List ranked early payment options
    quote       Price the input's requests without committing
    commit      Commit the input's requests against in-memory collaborators
    simulate    Score the input's what-if scenarios
    generate    Generate a random installment plan input file
    help        Show this message

OPTIONS (options, quote, commit, simulate):
    --input <FILE>      Path to JSON input file
    --format <FORMAT>   Output format: text (default) or json

OPTIONS (generate):
    --installments <N>  Number of installments (default: 4)
    --interval <DAYS>   Days between due dates (default: 14)
    --seed <N>          Random seed (default: random)
    --output <FILE>     Write to file instead of stdout

ENVIRONMENT:
    RUST_LOG            Log filter (default: info)

EXAMPLES:
    early-payment-engine options --input plan.json
    early-payment-engine commit --input plan.json --format json
    early-payment-engine generate --installments 6 --seed 7 --output plan.json"#
    );
}

/// JSON schema for an input file.
#[derive(Serialize, Deserialize)]
struct InputFile {
    /// Evaluation time; wall clock when absent.
    #[serde(default)]
    now: Option<DateTime<Utc>>,
    #[serde(default)]
    config: EngineConfig,
    merchants: BTreeMap<String, MerchantTerms>,
    transactions: Vec<TransactionInput>,
    #[serde(default)]
    requests: Vec<EarlyPaymentRequest>,
    /// Scenarios keyed by transaction id.
    #[serde(default)]
    scenarios: BTreeMap<String, Vec<Scenario>>,
}

#[derive(Serialize, Deserialize)]
struct TransactionInput {
    id: String,
    merchant_id: String,
    #[serde(default)]
    currency: CurrencyCode,
    #[serde(default = "default_transaction_status")]
    status: TransactionStatus,
    installments: Vec<InstallmentInput>,
}

#[derive(Serialize, Deserialize)]
struct InstallmentInput {
    id: String,
    sequence: u32,
    amount: Decimal,
    due_date: DateTime<Utc>,
    #[serde(default = "default_installment_status")]
    status: InstallmentStatus,
}

fn default_transaction_status() -> TransactionStatus {
    TransactionStatus::Active
}

fn default_installment_status() -> InstallmentStatus {
    InstallmentStatus::Scheduled
}

impl TransactionInput {
    fn into_transaction(self) -> Transaction {
        let installments = self
            .installments
            .into_iter()
            .map(|i| {
                if i.amount <= Decimal::ZERO {
                    eprintln!("Installment '{}' must have a positive amount", i.id);
                    process::exit(1);
                }
                Installment::new(i.id, i.sequence, i.amount, i.due_date).with_status(i.status)
            })
            .collect();
        Transaction::new(self.id, self.merchant_id, self.currency, installments)
            .with_status(self.status)
    }

    fn from_transaction(transaction: &Transaction) -> Self {
        Self {
            id: transaction.id().to_string(),
            merchant_id: transaction.merchant_id().to_string(),
            currency: transaction.currency().clone(),
            status: transaction.status(),
            installments: transaction
                .installments()
                .iter()
                .map(|i| InstallmentInput {
                    id: i.id().to_string(),
                    sequence: i.sequence(),
                    amount: i.amount(),
                    due_date: i.due_date(),
                    status: i.status(),
                })
                .collect(),
        }
    }
}

struct Loaded {
    engine: EarlyPaymentEngine,
    transaction_ids: Vec<TransactionId>,
    requests: Vec<EarlyPaymentRequest>,
    scenarios: BTreeMap<String, Vec<Scenario>>,
}

fn load_input(path: &str) -> Loaded {
    let content = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading file '{}': {}", path, e);
        process::exit(1);
    });
    let file: InputFile = serde_json::from_str(&content).unwrap_or_else(|e| {
        eprintln!("Error parsing JSON: {}", e);
        eprintln!("Run `early-payment-engine generate` for an example input file.");
        process::exit(1);
    });

    let mut merchants = InMemoryMerchantConfig::new();
    for (id, terms) in file.merchants {
        merchants = merchants.with_merchant(id, terms);
    }
    let transactions: Vec<Transaction> = file
        .transactions
        .into_iter()
        .map(TransactionInput::into_transaction)
        .collect();
    let transaction_ids = transactions.iter().map(|t| t.id().clone()).collect();

    let clock: Arc<dyn Clock> = match file.now {
        Some(now) => Arc::new(FixedClock::new(now)),
        None => Arc::new(SystemClock),
    };
    let engine = EarlyPaymentEngine::new(
        Arc::new(InMemoryLedger::with_transactions(transactions)),
        Arc::new(SimulatedGateway::new()),
        Arc::new(merchants),
        Arc::new(LogAuditSink),
        clock,
        file.config,
    );

    Loaded {
        engine,
        transaction_ids,
        requests: file.requests,
        scenarios: file.scenarios,
    }
}

/// Parse `--input` and `--format` shared by every file-driven command.
fn parse_io_args(args: &[String]) -> (String, String) {
    let mut input_path = None;
    let mut format = "text".to_string();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => {
                i += 1;
                input_path = Some(args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--input requires a file path");
                    process::exit(1);
                }));
            }
            "--format" => {
                i += 1;
                format = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--format requires 'text' or 'json'");
                    process::exit(1);
                });
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let path = input_path.unwrap_or_else(|| {
        eprintln!("Error: --input <FILE> is required");
        process::exit(1);
    });
    (path, format)
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error encoding output: {}", e);
            process::exit(1);
        }
    }
}

fn cmd_options(args: &[String]) {
    let (path, format) = parse_io_args(args);
    let loaded = load_input(&path);

    let mut all = BTreeMap::new();
    for id in &loaded.transaction_ids {
        match loaded.engine.generate_options(id) {
            Ok(options) => {
                if format != "json" {
                    println!("=== Options for {} ===", id);
                    if options.is_empty() {
                        println!("No early payment options available.\n");
                    }
                    for (rank, option) in options.iter().enumerate() {
                        println!("#{}", rank + 1);
                        println!("{}", option);
                    }
                }
                all.insert(id.to_string(), options);
            }
            Err(e) => eprintln!("{}: {} ({})", id, e.customer_reason(), e),
        }
    }
    if format == "json" {
        print_json(&all);
    }
}

#[derive(Serialize)]
struct RequestOutcome<T> {
    transaction_id: String,
    payment_type: PaymentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn cmd_quote(args: &[String], commit: bool) {
    let (path, format) = parse_io_args(args);
    let loaded = load_input(&path);
    if loaded.requests.is_empty() {
        eprintln!("No requests in '{}'", path);
        process::exit(1);
    }

    let mut outcomes = Vec::new();
    for request in &loaded.requests {
        let result = if commit {
            loaded.engine.commit(request)
        } else {
            loaded.engine.calculate(request)
        };
        if format != "json" {
            match &result {
                Ok(r) => {
                    println!("--- {} {} ---", r.transaction_id, request.payment_type);
                    println!("  Status:          {:?} ({})", r.status, r.state);
                    println!("  Original:        {}", r.original_amount);
                    println!("  Discount:        {}", r.discount_amount);
                    println!("  Processing fee:  {}", r.processing_fee);
                    println!("  Final amount:    {}", r.final_amount);
                    if commit {
                        println!("  Charged:         {}", r.amount_charged);
                        println!("  Settled:         {}", r.settled_installments.len());
                    }
                    if let Some(reason) = r.customer_reason {
                        println!("  Reason:          {}", reason);
                    }
                    println!();
                }
                Err(e) => println!(
                    "--- {} {} ---\n  Rejected:        {}\n",
                    request.transaction_id, request.payment_type, e.customer_reason()
                ),
            }
        }
        outcomes.push(match result {
            Ok(r) => RequestOutcome {
                transaction_id: request.transaction_id.to_string(),
                payment_type: request.payment_type,
                result: Some(r),
                error: None,
            },
            Err(e) => RequestOutcome {
                transaction_id: request.transaction_id.to_string(),
                payment_type: request.payment_type,
                result: None,
                error: Some(e.customer_reason().to_string()),
            },
        });
    }
    if format == "json" {
        print_json(&outcomes);
    }
}

fn cmd_simulate(args: &[String]) {
    let (path, format) = parse_io_args(args);
    let loaded = load_input(&path);
    if loaded.scenarios.is_empty() {
        eprintln!("No scenarios in '{}'", path);
        process::exit(1);
    }

    let mut reports = BTreeMap::new();
    for (id, scenarios) in &loaded.scenarios {
        match loaded.engine.simulate(&TransactionId::new(id.as_str()), scenarios) {
            Ok(report) => {
                if format != "json" {
                    println!("{}: {}", id, report);
                }
                reports.insert(id.clone(), report);
            }
            Err(e) => eprintln!("{}: {} ({})", id, e.customer_reason(), e),
        }
    }
    if format == "json" {
        print_json(&reports);
    }
}

fn cmd_generate(args: &[String]) {
    let mut config = PlanConfig::default();
    let mut seed: Option<u64> = None;
    let mut output_path: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--installments" => {
                i += 1;
                config.installment_count = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(|| {
                        eprintln!("--installments requires a number");
                        process::exit(1);
                    });
            }
            "--interval" => {
                i += 1;
                config.interval_days = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(|| {
                        eprintln!("--interval requires a number of days");
                        process::exit(1);
                    });
            }
            "--seed" => {
                i += 1;
                seed = Some(args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--seed requires a number");
                    process::exit(1);
                }));
            }
            "--output" => {
                i += 1;
                output_path = Some(args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--output requires a file path");
                    process::exit(1);
                }));
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let now = Utc::now();
    let transaction = generate_random_plan(&mut rng, "TXN-GEN-1", "MERCHANT-1", &config, now);
    let terms = MerchantTerms::new(
        laddered_tiers(3, config.interval_days.max(1), Decimal::new(1, 2)),
        StandardFeeSchedule::new(
            FeeRule::default(),
            FeeRule::new(Decimal::ZERO, Decimal::new(50, 2)),
            PartialFeeMode::PerBatch,
        ),
    );

    let payable: Decimal = transaction.payable_installments().map(|i| i.amount()).sum();
    let first_amount = transaction
        .next_payable()
        .map(|i| i.amount())
        .unwrap_or(Decimal::ZERO);
    let scenarios = vec![
        Scenario::new("pay-all-now", PaymentType::Full, ScenarioTarget::Amount(payable), now),
        Scenario::new(
            "next-installment-now",
            PaymentType::Partial,
            ScenarioTarget::Amount(first_amount),
            now,
        ),
        Scenario::new(
            "pay-all-next-week",
            PaymentType::Full,
            ScenarioTarget::Amount(payable),
            now + chrono::Duration::days(7),
        ),
    ];

    let file = InputFile {
        now: Some(now),
        config: EngineConfig::default(),
        merchants: BTreeMap::from([("MERCHANT-1".to_string(), terms)]),
        requests: vec![EarlyPaymentRequest::full(transaction.id().clone(), payable, "pm_demo")],
        scenarios: BTreeMap::from([(transaction.id().to_string(), scenarios)]),
        transactions: vec![TransactionInput::from_transaction(&transaction)],
    };

    let json = serde_json::to_string_pretty(&file).unwrap_or_else(|e| {
        eprintln!("Error encoding plan: {}", e);
        process::exit(1);
    });

    if let Some(path) = output_path {
        fs::write(&path, &json).unwrap_or_else(|e| {
            eprintln!("Error writing to '{}': {}", path, e);
            process::exit(1);
        });
        eprintln!(
            "Generated {} installments totalling {} → {}",
            config.installment_count,
            transaction.total_amount(),
            path
        );
    } else {
        println!("{}", json);
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let rest = &args[2..];

    match command {
        "options" => cmd_options(rest),
        "quote" => cmd_quote(rest, false),
        "commit" => cmd_quote(rest, true),
        "simulate" => cmd_simulate(rest),
        "generate" => cmd_generate(rest),
        "help" | "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            process::exit(1);
        }
    }
}
