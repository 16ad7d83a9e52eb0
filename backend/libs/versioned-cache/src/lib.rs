//! Versioned cache invalidation
//!
//! Instead of deleting every cached entry that depends on changed data (say,
//! every page of a user's list), each group of entries shares a version
//! counter that is mixed into their store keys. Bumping the counter once makes
//! the whole group unreachable; the orphaned entries expire on their own TTL.
//!
//! - Version keys derived deterministically from request parameters
//! - Version counters with their own TTL, bumped atomically in the store
//! - JSON payloads; unreadable payloads read as misses
//! - Metrics integration
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use versioned_cache::{CacheOperations, RedisConfig, VersionKeyBuilder, VersionedCache, VersionedCacheConfig};
//!
//! # async fn run() -> versioned_cache::CacheResult<()> {
//! let config = VersionedCacheConfig::new("shop", Duration::from_secs(600))?;
//! let cache = VersionedCache::connect(config, &RedisConfig::default()).await?;
//!
//! let version_key = VersionKeyBuilder::new("version")
//!     .param("user", "seyo")
//!     .param("page", 2u32)
//!     .only(["user"])
//!     .build();
//!
//! let page: Option<Vec<String>> = cache.get("orders", "page_2", Some(&version_key)).await?;
//! if page.is_none() {
//!     let rows = vec!["order-1".to_string()];
//!     cache.set("orders", "page_2", &rows, Some(&version_key), None).await?;
//! }
//!
//! // An order changed: every cached page for this user is now stale
//! cache.increment_version_number("orders", &version_key).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod keys;
mod metrics;
mod version_key;

pub mod store;

pub use config::{VersionedCacheConfig, DEFAULT_VERSION_TTL, MAX_TTL};
pub use error::{CacheError, CacheResult};
pub use keys::{physical_key, version_counter_key};
pub use metrics::CacheMetrics;
pub use redis_utils::RedisConfig;
pub use store::{KeyValueStore, MemoryStore, RedisStore, StoreError};
pub use version_key::{build_version_key, ParamValue, VersionKeyBuilder};

use config::ttl_secs;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Version assumed for a counter that does not exist (never bumped or expired).
///
/// Bumping an absent counter seeds it with this value first, so the first bump
/// always moves readers off the implicit version.
pub const INITIAL_VERSION: u64 = 1;

/// Core cache operations
#[async_trait::async_trait]
pub trait CacheOperations: Send + Sync {
    /// Current version for `version_key`, `INITIAL_VERSION` when absent
    async fn version_number(&self, prefix: &str, version_key: &str) -> CacheResult<u64>;

    /// Bump the version, orphaning every entry written under the old one
    async fn increment_version_number(&self, prefix: &str, version_key: &str)
        -> CacheResult<u64>;

    /// Get a value from cache
    async fn get<T: DeserializeOwned + Send>(
        &self,
        prefix: &str,
        key: &str,
        version_key: Option<&str>,
    ) -> CacheResult<Option<T>>;

    /// Set a value with `ttl`, or the configured default expiry
    async fn set<T: Serialize + Send + Sync>(
        &self,
        prefix: &str,
        key: &str,
        value: &T,
        version_key: Option<&str>,
        ttl: Option<Duration>,
    ) -> CacheResult<bool>;

    /// Delete a value; true only if an entry was removed
    async fn delete(&self, prefix: &str, key: &str, version_key: Option<&str>)
        -> CacheResult<bool>;
}

/// Versioned cache client
#[derive(Clone)]
pub struct VersionedCache {
    config: Arc<VersionedCacheConfig>,
    store: Arc<dyn KeyValueStore>,
    metrics: CacheMetrics,
}

impl fmt::Debug for VersionedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl VersionedCache {
    pub fn new(config: VersionedCacheConfig, store: Arc<dyn KeyValueStore>) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            store,
            metrics: CacheMetrics::new(),
        })
    }

    /// Connect to Redis. Connection failures are reported as `CacheError::Connection`.
    pub async fn connect(
        config: VersionedCacheConfig,
        redis_config: &RedisConfig,
    ) -> CacheResult<Self> {
        config.validate()?;
        let store = RedisStore::connect(redis_config)
            .await
            .map_err(|e| CacheError::Connection(format!("{:#}", e)))?;
        Self::new(config, Arc::new(store))
    }

    /// Build from `VERCACHE_*` and `REDIS_*` environment variables
    pub async fn from_env() -> CacheResult<Self> {
        let config = VersionedCacheConfig::from_env()?;
        let redis_config = RedisConfig::from_env()
            .map_err(|e| CacheError::Configuration(format!("{:#}", e)))?;
        Self::connect(config, &redis_config).await
    }

    pub fn config(&self) -> &VersionedCacheConfig {
        &self.config
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Store key for an entry, reading the current version when `version_key` is set
    pub async fn physical_key(
        &self,
        prefix: &str,
        key: &str,
        version_key: Option<&str>,
    ) -> CacheResult<String> {
        let version = match version_key {
            Some(version_key) => Some(self.version_number(prefix, version_key).await?),
            None => None,
        };
        Ok(keys::physical_key(
            &self.config.namespace,
            prefix,
            key,
            version,
        ))
    }

    /// Read-through: return the cached value, or run `loader`, cache and return its result.
    pub async fn get_or_set_with<T, F, Fut, E>(
        &self,
        prefix: &str,
        key: &str,
        version_key: Option<&str>,
        ttl: Option<Duration>,
        loader: F,
    ) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        if let Some(cached) = self.get::<T>(prefix, key, version_key).await? {
            return Ok(cached);
        }

        let value = loader().await.map_err(|e| {
            self.metrics.record_error(prefix, "loader");
            CacheError::Loader(e.to_string())
        })?;
        self.set(prefix, key, &value, version_key, ttl).await?;
        Ok(value)
    }

    fn track<T>(&self, prefix: &str, result: Result<T, StoreError>) -> CacheResult<T> {
        result.map_err(|e| {
            let err = CacheError::from(e);
            warn!(prefix = %prefix, error = %err, "Store operation failed");
            self.metrics.record_error(prefix, err.kind());
            err
        })
    }
}

fn parse_version(raw: &[u8]) -> Option<u64> {
    std::str::from_utf8(raw)
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|v| *v >= INITIAL_VERSION)
}

#[async_trait::async_trait]
impl CacheOperations for VersionedCache {
    async fn version_number(&self, prefix: &str, version_key: &str) -> CacheResult<u64> {
        let counter_key = keys::version_counter_key(&self.config.namespace, prefix, version_key);
        let raw = self.track(prefix, self.store.get(&counter_key).await)?;

        let version = match raw {
            None => INITIAL_VERSION,
            Some(bytes) => parse_version(&bytes).unwrap_or_else(|| {
                warn!(
                    prefix = %prefix,
                    version_key = %version_key,
                    "Unreadable version counter, using initial version"
                );
                INITIAL_VERSION
            }),
        };
        Ok(version)
    }

    async fn increment_version_number(
        &self,
        prefix: &str,
        version_key: &str,
    ) -> CacheResult<u64> {
        let counter_key = keys::version_counter_key(&self.config.namespace, prefix, version_key);
        let next = self.track(
            prefix,
            self.store
                .increment(
                    &counter_key,
                    INITIAL_VERSION as i64,
                    ttl_secs(self.config.version_ttl),
                )
                .await,
        )?;
        let next = self.track(
            prefix,
            u64::try_from(next).map_err(|_| {
                StoreError::UnexpectedReply(format!("negative version counter {}", next))
            }),
        )?;

        debug!(prefix = %prefix, version_key = %version_key, version = next, "Version bumped");
        self.metrics.record_version_bump(prefix);
        Ok(next)
    }

    async fn get<T: DeserializeOwned + Send>(
        &self,
        prefix: &str,
        key: &str,
        version_key: Option<&str>,
    ) -> CacheResult<Option<T>> {
        let physical = self.physical_key(prefix, key, version_key).await?;

        match self.track(prefix, self.store.get(&physical).await)? {
            Some(data) => match serde_json::from_slice::<T>(&data) {
                Ok(value) => {
                    debug!(prefix = %prefix, key = %key, "Cache hit");
                    self.metrics.record_hit(prefix);
                    Ok(Some(value))
                }
                Err(e) => {
                    // Left in place; the next set overwrites it
                    warn!(prefix = %prefix, key = %key, error = %e, "Cache deserialization failed");
                    self.metrics.record_error(prefix, "deserialize");
                    self.metrics.record_miss(prefix);
                    Ok(None)
                }
            },
            None => {
                debug!(prefix = %prefix, key = %key, "Cache miss");
                self.metrics.record_miss(prefix);
                Ok(None)
            }
        }
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        prefix: &str,
        key: &str,
        value: &T,
        version_key: Option<&str>,
        ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        let payload = serde_json::to_vec(value)?;
        let ttl = ttl_secs(ttl.unwrap_or(self.config.default_expiry));
        let physical = self.physical_key(prefix, key, version_key).await?;

        let stored = self.track(
            prefix,
            self.store.set_with_expiry(&physical, &payload, ttl).await,
        )?;

        debug!(prefix = %prefix, key = %key, ttl = ttl, stored = stored, "Cache set");
        if stored {
            self.metrics.record_write(prefix);
        }
        Ok(stored)
    }

    async fn delete(
        &self,
        prefix: &str,
        key: &str,
        version_key: Option<&str>,
    ) -> CacheResult<bool> {
        let physical = self.physical_key(prefix, key, version_key).await?;
        let removed = self.track(prefix, self.store.delete(&physical).await)?;

        debug!(prefix = %prefix, key = %key, removed = removed, "Cache delete");
        if removed == 1 {
            self.metrics.record_delete(prefix);
        }
        Ok(removed == 1)
    }
}
