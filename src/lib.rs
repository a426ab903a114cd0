//! # early-payment-engine
//!
//! Early payment discount and settlement engine for installment plans.
//!
//! Given an installment plan and a merchant's discount tiers, this engine
//! works out what a customer saves by paying early, in full or in part,
//! ranks the competing options, and commits the chosen one exactly once.
//!
//! ## Architecture
//!
//! - **core**: Foundational types: transactions, tiers, fees, options, records, errors
//! - **discount**: Tier resolution by days-early, savings arithmetic, tier cache
//! - **options**: Full and partial option generation, ranking, selection aggregation
//! - **settlement**: Ledger, gateway and audit seams plus the idempotent committer
//! - **simulation**: What-if scenario scoring and random plan generation
//! - **engine**: The facade wiring everything to its collaborators

pub mod clock;
pub mod config;
pub mod core;
pub mod discount;
pub mod engine;
pub mod merchant;
pub mod options;
pub mod quoter;
pub mod settlement;
pub mod simulation;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::clock::{Clock, FixedClock, SystemClock};
    pub use crate::config::EngineConfig;
    pub use crate::core::currency::CurrencyCode;
    pub use crate::core::error::{CustomerReason, EngineError, SelectionError, ValidationError};
    pub use crate::core::fee::{FeeRule, FeeSchedule, PartialFeeMode, StandardFeeSchedule};
    pub use crate::core::ids::{InstallmentId, MerchantId, TransactionId};
    pub use crate::core::option::{EarlyPaymentOption, EarlyPaymentRequest, PaymentType};
    pub use crate::core::record::{CommitState, EarlyPaymentRecord, EarlyPaymentResult, EarlyPaymentStatus};
    pub use crate::core::tier::{DayWindow, DiscountTier, TierSchedule};
    pub use crate::core::transaction::{Installment, InstallmentStatus, Transaction};
    pub use crate::engine::EarlyPaymentEngine;
    pub use crate::merchant::{InMemoryMerchantConfig, MerchantConfigSource, MerchantTerms};
    pub use crate::options::generator::OptionGenerator;
    pub use crate::options::QuoteContext;
    pub use crate::settlement::audit::{AuditSink, InMemoryAuditSink};
    pub use crate::settlement::committer::CancelToken;
    pub use crate::settlement::gateway::{PaymentGateway, SimulatedGateway};
    pub use crate::settlement::ledger::{InMemoryLedger, InstallmentLedger};
    pub use crate::simulation::scenario::{Scenario, ScenarioReport, ScenarioSimulator, ScenarioTarget};
}
