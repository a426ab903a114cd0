use crate::core::error::ConfigurationError;
use crate::core::fee::{FeeSchedule, StandardFeeSchedule};
use crate::core::ids::MerchantId;
use crate::core::tier::DiscountTier;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Where per-merchant discount and fee terms come from.
pub trait MerchantConfigSource: Send + Sync {
    /// Raw tier list as configured. Validation happens in
    /// [`TierSchedule::new`](crate::core::tier::TierSchedule::new).
    fn discount_tiers(&self, merchant: &MerchantId) -> Result<Vec<DiscountTier>, ConfigurationError>;

    fn fee_schedule(&self, merchant: &MerchantId)
        -> Result<Arc<dyn FeeSchedule>, ConfigurationError>;

    fn allows_partial_payments(&self, merchant: &MerchantId) -> Result<bool, ConfigurationError>;

    /// Commits for this merchant stop at `pending_approval` instead of capturing.
    fn requires_approval(&self, merchant: &MerchantId) -> Result<bool, ConfigurationError>;
}

/// Everything configured for one merchant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantTerms {
    #[serde(default)]
    pub tiers: Vec<DiscountTier>,
    #[serde(default)]
    pub fees: StandardFeeSchedule,
    #[serde(default = "default_allows_partial")]
    pub allows_partial: bool,
    #[serde(default)]
    pub requires_approval: bool,
}

fn default_allows_partial() -> bool {
    true
}

impl Default for MerchantTerms {
    fn default() -> Self {
        Self {
            tiers: Vec::new(),
            fees: StandardFeeSchedule::free(),
            allows_partial: true,
            requires_approval: false,
        }
    }
}

impl MerchantTerms {
    pub fn new(tiers: Vec<DiscountTier>, fees: StandardFeeSchedule) -> Self {
        Self {
            tiers,
            fees,
            ..Self::default()
        }
    }

    pub fn allow_partial(mut self, allows_partial: bool) -> Self {
        self.allows_partial = allows_partial;
        self
    }

    pub fn require_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }
}

/// Merchant terms held in memory.
#[derive(Debug, Default)]
pub struct InMemoryMerchantConfig {
    merchants: RwLock<HashMap<MerchantId, MerchantTerms>>,
}

impl InMemoryMerchantConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_merchant(self, merchant: impl Into<MerchantId>, terms: MerchantTerms) -> Self {
        // Nothing else can hold the lock while we own `self`.
        if let Ok(mut merchants) = self.merchants.write() {
            merchants.insert(merchant.into(), terms);
        }
        self
    }

    /// Replace a merchant's terms. Callers should invalidate any tier cache afterwards.
    pub fn upsert(
        &self,
        merchant: impl Into<MerchantId>,
        terms: MerchantTerms,
    ) -> Result<(), ConfigurationError> {
        let mut merchants = self
            .merchants
            .write()
            .map_err(|_| ConfigurationError::Unavailable("merchant config lock poisoned".into()))?;
        merchants.insert(merchant.into(), terms);
        Ok(())
    }

    fn with_terms<T>(
        &self,
        merchant: &MerchantId,
        f: impl FnOnce(&MerchantTerms) -> T,
    ) -> Result<T, ConfigurationError> {
        let merchants = self
            .merchants
            .read()
            .map_err(|_| ConfigurationError::Unavailable("merchant config lock poisoned".into()))?;
        merchants
            .get(merchant)
            .map(f)
            .ok_or_else(|| ConfigurationError::UnknownMerchant(merchant.clone()))
    }
}

impl MerchantConfigSource for InMemoryMerchantConfig {
    fn discount_tiers(&self, merchant: &MerchantId) -> Result<Vec<DiscountTier>, ConfigurationError> {
        self.with_terms(merchant, |terms| terms.tiers.clone())
    }

    fn fee_schedule(
        &self,
        merchant: &MerchantId,
    ) -> Result<Arc<dyn FeeSchedule>, ConfigurationError> {
        self.with_terms(merchant, |terms| Arc::new(terms.fees) as Arc<dyn FeeSchedule>)
    }

    fn allows_partial_payments(&self, merchant: &MerchantId) -> Result<bool, ConfigurationError> {
        self.with_terms(merchant, |terms| terms.allows_partial)
    }

    fn requires_approval(&self, merchant: &MerchantId) -> Result<bool, ConfigurationError> {
        self.with_terms(merchant, |terms| terms.requires_approval)
    }
}
