//! Construction-time settings

use crate::{CacheError, CacheResult};
use std::time::Duration;

/// Lifetime of a version counter after its last bump
pub const DEFAULT_VERSION_TTL: Duration = Duration::from_secs(7200);

/// Longest expiry Redis accepts (`EXPIRE` takes a signed 64-bit count)
pub const MAX_TTL: Duration = Duration::from_secs(i64::MAX as u64);

/// Settings fixed for the lifetime of a `VersionedCache`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedCacheConfig {
    /// Root scope for every key this cache touches
    pub namespace: String,
    /// Expiry for `set` calls that don't pass their own
    pub default_expiry: Duration,
    /// Expiry refreshed on every version bump
    pub version_ttl: Duration,
}

impl VersionedCacheConfig {
    pub fn new(namespace: impl Into<String>, default_expiry: Duration) -> CacheResult<Self> {
        let config = Self {
            namespace: namespace.into(),
            default_expiry,
            version_ttl: DEFAULT_VERSION_TTL,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_version_ttl(mut self, version_ttl: Duration) -> Self {
        self.version_ttl = version_ttl;
        self
    }

    /// Load from `VERCACHE_*` environment variables.
    ///
    /// `VERCACHE_NAMESPACE` and `VERCACHE_DEFAULT_EXPIRY_SECS` are required;
    /// `VERCACHE_VERSION_TTL_SECS` defaults to two hours.
    pub fn from_env() -> CacheResult<Self> {
        let namespace = std::env::var("VERCACHE_NAMESPACE").map_err(|_| {
            CacheError::Configuration(
                "VERCACHE_NAMESPACE environment variable not set".to_string(),
            )
        })?;
        let default_expiry = required_secs("VERCACHE_DEFAULT_EXPIRY_SECS")?;
        let version_ttl = match std::env::var("VERCACHE_VERSION_TTL_SECS") {
            Ok(raw) => parse_secs("VERCACHE_VERSION_TTL_SECS", &raw)?,
            Err(_) => DEFAULT_VERSION_TTL,
        };

        let config = Self {
            namespace,
            default_expiry,
            version_ttl,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CacheResult<()> {
        if self.namespace.trim().is_empty() {
            return Err(CacheError::Configuration(
                "namespace must not be empty".to_string(),
            ));
        }
        if self.default_expiry.is_zero() {
            return Err(CacheError::Configuration(
                "default expiry must be greater than zero".to_string(),
            ));
        }
        if self.version_ttl.is_zero() {
            return Err(CacheError::Configuration(
                "version TTL must be greater than zero".to_string(),
            ));
        }
        if self.default_expiry > MAX_TTL || self.version_ttl > MAX_TTL {
            return Err(CacheError::Configuration(format!(
                "expiry must not exceed {} seconds",
                MAX_TTL.as_secs()
            )));
        }
        Ok(())
    }
}

fn required_secs(var: &str) -> CacheResult<Duration> {
    let raw = std::env::var(var).map_err(|_| {
        CacheError::Configuration(format!("{} environment variable not set", var))
    })?;
    parse_secs(var, &raw)
}

fn parse_secs(var: &str, raw: &str) -> CacheResult<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| {
            CacheError::Configuration(format!("{} must be whole seconds, got {:?}", var, raw))
        })
}

/// Whole seconds for the store, rounding up so sub-second TTLs don't become 0
/// and capping at `MAX_TTL`
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl
        .as_secs()
        .saturating_add(u64::from(ttl.subsec_nanos() > 0));
    secs.clamp(1, MAX_TTL.as_secs())
}
