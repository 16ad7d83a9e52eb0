//! Key-value store capability used by the versioned cache
//!
//! The cache only needs four primitives. Expiry and eviction are entirely the
//! store's business.

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a store backend
#[derive(Error, Debug)]
pub enum StoreError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Round trip exceeded the configured response timeout
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Store replied with something the operation cannot use
    #[error("Unexpected store reply: {0}")]
    UnexpectedReply(String),
}

/// Minimal store interface.
///
/// Keys are plain strings; values are opaque bytes. Every call is one round
/// trip and failures are returned as-is, without retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value, `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store a value that expires after `ttl_secs`; returns the store's acknowledgement
    async fn set_with_expiry(
        &self,
        key: &str,
        value: &[u8],
        ttl_secs: u64,
    ) -> Result<bool, StoreError>;

    /// Remove a key, returning how many entries were removed
    async fn delete(&self, key: &str) -> Result<u64, StoreError>;

    /// Atomically seed an absent counter with `seed`, add one, and reset its
    /// expiry to `ttl_secs`. Returns the new value.
    async fn increment(&self, key: &str, seed: i64, ttl_secs: u64) -> Result<i64, StoreError>;
}
