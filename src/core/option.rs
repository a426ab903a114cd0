use crate::core::currency::{ratio_to_f64, CurrencyCode};
use crate::core::ids::{InstallmentId, PaymentMethodRef, TierId, TransactionId};
use crate::core::tier::DiscountTier;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an early payment clears the whole balance or a chosen subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Full,
    Partial,
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentType::Full => write!(f, "full"),
            PaymentType::Partial => write!(f, "partial"),
        }
    }
}

/// The discount outcome for one installment inside an option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentQuote {
    pub installment_id: InstallmentId,
    pub amount: Decimal,
    pub due_date: DateTime<Utc>,
    pub tier_id: Option<TierId>,
    pub discount_amount: Decimal,
}

/// A non-committed early payment quote.
///
/// Options are recomputed on demand and never persisted as-is. The customer
/// is charged [`amount_due`](Self::amount_due): the discounted amount plus
/// the processing fee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyPaymentOption {
    pub payment_type: PaymentType,
    pub transaction_id: TransactionId,
    pub currency: CurrencyCode,
    /// Installments this option would settle, in due-date order.
    pub installment_ids: Vec<InstallmentId>,
    pub original_amount: Decimal,
    /// The tier applied, when every covered installment shares one.
    pub tier: Option<DiscountTier>,
    pub discount_amount: Decimal,
    pub processing_fee: Decimal,
    pub final_amount: Decimal,
    /// `discount_amount - processing_fee`; negative when the fee outweighs the discount.
    pub net_savings: Decimal,
    pub available_until: DateTime<Utc>,
    pub breakdown: Vec<InstallmentQuote>,
}

impl EarlyPaymentOption {
    /// What the customer actually pays.
    pub fn amount_due(&self) -> Decimal {
        self.final_amount + self.processing_fee
    }

    pub fn has_discount(&self) -> bool {
        self.discount_amount > Decimal::ZERO
    }

    /// Whether this option saves the customer money once the fee is counted.
    pub fn is_saving(&self) -> bool {
        self.net_savings > Decimal::ZERO
    }

    /// Net savings as a percentage of the original amount.
    pub fn savings_percent(&self) -> f64 {
        if self.original_amount == Decimal::ZERO {
            return 0.0;
        }
        ratio_to_f64(self.net_savings * Decimal::from(100) / self.original_amount)
    }
}

impl fmt::Display for EarlyPaymentOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "--- {} payment ({} installment(s)) ---",
            self.payment_type,
            self.installment_ids.len()
        )?;
        writeln!(f, "  Original:        {} {}", self.original_amount, self.currency)?;
        match &self.tier {
            Some(tier) => writeln!(
                f,
                "  Tier:            {} ({} @ {})",
                tier.id(),
                tier.window(),
                tier.discount_rate()
            )?,
            None if self.has_discount() => writeln!(f, "  Tier:            mixed")?,
            None => writeln!(f, "  Tier:            none")?,
        }
        writeln!(f, "  Discount:        {}", self.discount_amount)?;
        writeln!(f, "  Processing fee:  {}", self.processing_fee)?;
        writeln!(f, "  Final amount:    {}", self.final_amount)?;
        writeln!(f, "  Amount due:      {}", self.amount_due())?;
        writeln!(
            f,
            "  Net savings:     {} ({:.2}%)",
            self.net_savings,
            self.savings_percent()
        )?;
        writeln!(f, "  Available until: {}", self.available_until.to_rfc3339())
    }
}

/// A customer's chosen early payment, as submitted for quoting or commit.
///
/// The declared amount is the original (pre-discount) amount being paid off.
/// For a partial request it must equal the sum of the selected installments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarlyPaymentRequest {
    pub transaction_id: TransactionId,
    pub payment_type: PaymentType,
    /// Selected installments; empty for a full payment.
    #[serde(default)]
    pub installment_ids: Vec<InstallmentId>,
    pub declared_amount: Decimal,
    /// The final amount the customer was shown, if the caller kept it.
    #[serde(default)]
    pub quoted_final_amount: Option<Decimal>,
    pub payment_method: PaymentMethodRef,
}

impl EarlyPaymentRequest {
    pub fn full(
        transaction_id: impl Into<TransactionId>,
        declared_amount: Decimal,
        payment_method: impl Into<PaymentMethodRef>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            payment_type: PaymentType::Full,
            installment_ids: Vec::new(),
            declared_amount,
            quoted_final_amount: None,
            payment_method: payment_method.into(),
        }
    }

    pub fn partial(
        transaction_id: impl Into<TransactionId>,
        installment_ids: Vec<InstallmentId>,
        declared_amount: Decimal,
        payment_method: impl Into<PaymentMethodRef>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            payment_type: PaymentType::Partial,
            installment_ids,
            declared_amount,
            quoted_final_amount: None,
            payment_method: payment_method.into(),
        }
    }

    /// Build the request that would accept `option` as quoted.
    pub fn accepting(option: &EarlyPaymentOption, payment_method: impl Into<PaymentMethodRef>) -> Self {
        let installment_ids = match option.payment_type {
            PaymentType::Full => Vec::new(),
            PaymentType::Partial => option.installment_ids.clone(),
        };
        Self {
            transaction_id: option.transaction_id.clone(),
            payment_type: option.payment_type,
            installment_ids,
            declared_amount: option.original_amount,
            quoted_final_amount: Some(option.final_amount),
            payment_method: payment_method.into(),
        }
    }

    pub fn with_quoted_final_amount(mut self, amount: Decimal) -> Self {
        self.quoted_final_amount = Some(amount);
        self
    }
}
