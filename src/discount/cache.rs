use crate::core::error::ConfigurationError;
use crate::core::ids::MerchantId;
use crate::core::tier::TierSchedule;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct CacheEntry {
    schedule: Arc<TierSchedule>,
    loaded_at: DateTime<Utc>,
}

/// Bounded, time-expiring cache of validated tier schedules, keyed by merchant.
///
/// The cache is owned by whoever calls the resolver and handed around
/// explicitly; there is no process-wide instance. Expiry is evaluated against
/// the `now` the caller supplies, which keeps lookups deterministic in tests.
#[derive(Debug)]
pub struct TierCache {
    capacity: usize,
    ttl: Duration,
    entries: Mutex<HashMap<MerchantId, CacheEntry>>,
}

impl TierCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached schedule for `merchant`, loading it when absent or stale.
    ///
    /// Load errors are returned as-is and never cached.
    pub fn get_or_load<F>(
        &self,
        merchant: &MerchantId,
        now: DateTime<Utc>,
        load: F,
    ) -> Result<Arc<TierSchedule>, ConfigurationError>
    where
        F: FnOnce() -> Result<TierSchedule, ConfigurationError>,
    {
        if let Some(entry) = self.entries().get(merchant) {
            if now - entry.loaded_at < self.ttl {
                return Ok(Arc::clone(&entry.schedule));
            }
        }

        // Load outside the lock; a concurrent loader for the same merchant
        // simply overwrites with an equivalent schedule.
        let schedule = Arc::new(load()?);
        if self.capacity == 0 {
            return Ok(schedule);
        }

        let mut entries = self.entries();
        let ttl = self.ttl;
        entries.retain(|_, entry| now - entry.loaded_at < ttl);
        if entries.len() >= self.capacity && !entries.contains_key(merchant) {
            let oldest = entries
                .iter()
                .min_by(|a, b| a.1.loaded_at.cmp(&b.1.loaded_at).then_with(|| a.0.cmp(b.0)))
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            merchant.clone(),
            CacheEntry {
                schedule: Arc::clone(&schedule),
                loaded_at: now,
            },
        );
        Ok(schedule)
    }

    /// Drop the cached schedule for `merchant`.
    pub fn invalidate(&self, merchant: &MerchantId) {
        self.entries().remove(merchant);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<MerchantId, CacheEntry>> {
        // The map holds only derived data, so a poisoned lock is safe to reuse.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tier::{DayWindow, DiscountTier};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::cell::Cell;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn schedule() -> TierSchedule {
        TierSchedule::new(vec![DiscountTier::new(
            "T",
            DayWindow::new(0, 7),
            dec!(0.02),
        )])
    }

    #[test]
    fn test_second_lookup_hits_cache() {
        let cache = TierCache::new(4, Duration::minutes(5));
        let loads = Cell::new(0);
        let merchant = MerchantId::new("M");
        for _ in 0..3 {
            cache
                .get_or_load(&merchant, now(), || {
                    loads.set(loads.get() + 1);
                    Ok(schedule())
                })
                .unwrap();
        }
        assert_eq!(loads.get(), 1);
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let cache = TierCache::new(4, Duration::minutes(5));
        let loads = Cell::new(0);
        let merchant = MerchantId::new("M");
        let load = || {
            loads.set(loads.get() + 1);
            Ok(schedule())
        };
        cache.get_or_load(&merchant, now(), load).unwrap();
        cache
            .get_or_load(&merchant, now() + Duration::minutes(5), || {
                loads.set(loads.get() + 1);
                Ok(schedule())
            })
            .unwrap();
        assert_eq!(loads.get(), 2);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = TierCache::new(2, Duration::hours(1));
        for (i, name) in ["A", "B", "C"].iter().enumerate() {
            cache
                .get_or_load(
                    &MerchantId::new(*name),
                    now() + Duration::seconds(i as i64),
                    || Ok(schedule()),
                )
                .unwrap();
        }
        assert_eq!(cache.len(), 2);
        let reloaded = Cell::new(false);
        cache
            .get_or_load(&MerchantId::new("A"), now() + Duration::seconds(5), || {
                reloaded.set(true);
                Ok(schedule())
            })
            .unwrap();
        assert!(reloaded.get(), "oldest merchant should have been evicted");
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = TierCache::new(2, Duration::hours(1));
        let merchant = MerchantId::new("M");
        let err = cache
            .get_or_load(&merchant, now(), || {
                Err(ConfigurationError::UnknownMerchant(merchant.clone()))
            })
            .unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownMerchant(merchant.clone()));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_never_stores() {
        let cache = TierCache::new(0, Duration::hours(1));
        cache
            .get_or_load(&MerchantId::new("M"), now(), || Ok(schedule()))
            .unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate() {
        let cache = TierCache::new(2, Duration::hours(1));
        let merchant = MerchantId::new("M");
        cache.get_or_load(&merchant, now(), || Ok(schedule())).unwrap();
        cache.invalidate(&merchant);
        assert!(cache.is_empty());
    }
}
