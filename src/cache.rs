//! Validation cache.
//!
//! What-if tools re-validate the same chain many times while a planner edits
//! unrelated parts of a plan. `ValidationCache` memoizes validation outcomes
//! keyed by the chain fingerprint and the policy parameters, so an unchanged
//! chain under an unchanged policy is validated once.
//!
//! Thread-safe: the LRU sits behind a `parking_lot::RwLock` and the cache can
//! be shared across threads behind an `Arc`.

use std::hash::Hasher;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::RwLock;
use xxhash_rust::xxh64::Xxh64;

use crate::policy::CostingPolicyV1;
use crate::types::{ProcessChain, ValidationResult};
use crate::validator::GraphValidator;

const FALLBACK_CAPACITY: usize = 1_000;

/// Configuration for the validation cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache.
    pub max_entries: usize,
    /// Whether to enable the cache.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            enabled: true,
        }
    }
}

/// Cache key: everything that affects a validation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ValidationCacheKey(u64);

impl ValidationCacheKey {
    fn compute(chain_fingerprint: &str, policy: &CostingPolicyV1) -> Self {
        let mut hasher = Xxh64::new(0);
        hasher.write(chain_fingerprint.as_bytes());
        hasher.write(policy.policy_id().as_bytes());
        hasher.write(policy.params_hash().as_bytes());
        Self(hasher.finish())
    }
}

/// Outcome of a cached validation.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValidation {
    /// The validation outcome.
    pub result: ValidationResult,
    /// Whether the outcome came from the cache.
    pub cache_hit: bool,
}

/// Cache statistics.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    /// Current number of entries in the cache.
    pub len: usize,
    /// Maximum capacity of the cache.
    pub cap: usize,
}

/// Memoizing wrapper around [`GraphValidator`].
#[derive(Debug, Clone)]
pub struct ValidationCache {
    validator: GraphValidator,
    cache: Option<Arc<RwLock<LruCache<ValidationCacheKey, ValidationResult>>>>,
}

impl ValidationCache {
    /// Create a cache for the given policy.
    pub fn new(policy: CostingPolicyV1, config: CacheConfig) -> Self {
        let cache = config.enabled.then(|| {
            let size = NonZeroUsize::new(config.max_entries)
                .or_else(|| NonZeroUsize::new(FALLBACK_CAPACITY))
                .unwrap_or(NonZeroUsize::MIN);
            Arc::new(RwLock::new(LruCache::new(size)))
        });

        Self {
            validator: GraphValidator::new(policy),
            cache,
        }
    }

    /// Get the policy.
    pub fn policy(&self) -> &CostingPolicyV1 {
        self.validator.policy()
    }

    /// Validate a chain, consulting the cache first.
    pub fn validate(&self, chain: &ProcessChain) -> CachedValidation {
        let Some(cache) = &self.cache else {
            return CachedValidation {
                result: self.validator.validate(chain),
                cache_hit: false,
            };
        };

        let key = ValidationCacheKey::compute(&chain.fingerprint(), self.validator.policy());

        if let Some(result) = cache.read().peek(&key) {
            return CachedValidation {
                result: result.clone(),
                cache_hit: true,
            };
        }

        let result = self.validator.validate(chain);
        cache.write().put(key, result.clone());

        CachedValidation {
            result,
            cache_hit: false,
        }
    }

    /// Get cache statistics.
    ///
    /// Returns `None` if caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| {
            let cache = cache.read();
            CacheStats {
                len: cache.len(),
                cap: cache.cap().get(),
            }
        })
    }

    /// Clear the cache.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.write().clear();
        }
    }
}

impl Default for ValidationCache {
    fn default() -> Self {
        Self::new(CostingPolicyV1::default(), CacheConfig::default())
    }
}
