//! In-process store with per-key expiry
//!
//! Expiry uses `tokio::time::Instant`, so paused test clocks drive it too.
//! Reads drop the expired key they touch; writes sweep every expired entry
//! at most once per `SWEEP_INTERVAL`, so unread entries are reclaimed too.

use super::{KeyValueStore, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Minimum gap between two sweeps of expired entries
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct StoredValue {
    data: Vec<u8>,
    /// `None` when the TTL reaches past what the clock can represent
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(data: Vec<u8>, now: Instant, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: now.checked_add(ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

struct Entries {
    map: HashMap<String, StoredValue>,
    next_sweep: Instant,
}

impl Entries {
    fn insert(&mut self, key: &str, value: StoredValue, now: Instant) {
        if now >= self.next_sweep {
            self.map.retain(|_, v| v.is_live(now));
            self.next_sweep = now + SWEEP_INTERVAL;
        }
        self.map.insert(key.to_string(), value);
    }
}

/// `KeyValueStore` kept in a local map
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                next_sweep: Instant::now() + SWEEP_INTERVAL,
            }),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` currently holds a live value
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .map
            .get(key)
            .map(|v| v.is_live(now))
            .unwrap_or(false)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map
            .values()
            .filter(|v| v.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries held, expired ones not yet swept included
    pub fn stored_len(&self) -> usize {
        self.entries.lock().map.len()
    }

    /// Write raw bytes without going through the cache, e.g. to plant bad data
    pub fn insert_raw(&self, key: &str, data: Vec<u8>, ttl: Duration) {
        let now = Instant::now();
        self.entries
            .lock()
            .insert(key, StoredValue::new(data, now, ttl), now);
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let live = entries.map.get(key).map(|v| v.is_live(now));
        match live {
            Some(true) => Ok(entries.map.get(key).map(|v| v.data.clone())),
            Some(false) => {
                entries.map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &[u8],
        ttl_secs: u64,
    ) -> Result<bool, StoreError> {
        self.insert_raw(key, value.to_vec(), Duration::from_secs(ttl_secs));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        match self.entries.lock().map.remove(key) {
            Some(v) if v.is_live(now) => Ok(1),
            _ => Ok(0),
        }
    }

    async fn increment(&self, key: &str, seed: i64, ttl_secs: u64) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let current = match entries.map.get(key) {
            Some(v) if v.is_live(now) => std::str::from_utf8(&v.data)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| {
                    StoreError::UnexpectedReply(format!(
                        "value at {} is not an integer",
                        key
                    ))
                })?,
            _ => seed,
        };

        let next = current.checked_add(1).ok_or_else(|| {
            StoreError::UnexpectedReply(format!("increment would overflow at {}", key))
        })?;

        let value = StoredValue::new(
            next.to_string().into_bytes(),
            now,
            Duration::from_secs(ttl_secs),
        );
        entries.insert(key, value, now);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_value_expires() {
        let store = MemoryStore::new();
        assert!(store.set_with_expiry("k", b"v", 10).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_counts_removed() {
        let store = MemoryStore::new();
        store.set_with_expiry("k", b"v", 60).await.unwrap();
        assert_eq!(store.delete("k").await.unwrap(), 1);
        assert_eq!(store.delete("k").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_increment_seeds_then_counts() {
        let store = MemoryStore::new();
        assert_eq!(store.increment("n", 1, 100).await.unwrap(), 2);
        assert_eq!(store.increment("n", 1, 100).await.unwrap(), 3);
        assert_eq!(store.get("n").await.unwrap(), Some(b"3".to_vec()));

        tokio::time::advance(Duration::from_secs(101)).await;
        assert_eq!(store.increment("n", 1, 100).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_increment_rejects_non_integer() {
        let store = MemoryStore::new();
        store.set_with_expiry("n", b"abc", 60).await.unwrap();
        let err = store.increment("n", 1, 60).await.unwrap_err();
        assert!(matches!(err, StoreError::UnexpectedReply(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unread_expired_entries_are_swept_on_write() {
        let store = MemoryStore::new();
        for i in 0..100 {
            store
                .set_with_expiry(&format!("page_{}", i), b"v", 10)
                .await
                .unwrap();
        }
        assert_eq!(store.stored_len(), 100);

        tokio::time::advance(Duration::from_secs(3600)).await;
        store.set_with_expiry("fresh", b"v", 10).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.stored_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_live_entries() {
        let store = MemoryStore::new();
        store.set_with_expiry("short", b"v", 10).await.unwrap();
        store.set_with_expiry("long", b"v", 7200).await.unwrap();

        tokio::time::advance(Duration::from_secs(120)).await;
        store.increment("counter", 1, 60).await.unwrap();

        assert_eq!(store.stored_len(), 2);
        assert!(store.contains("long"));
        assert!(!store.contains("short"));
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        let store = MemoryStore::new();
        assert!(store.set_with_expiry("k", b"v", u64::MAX).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));

        assert_eq!(store.increment("n", 1, u64::MAX).await.unwrap(), 2);
        store.insert_raw("raw", b"v".to_vec(), Duration::MAX);
        assert!(store.contains("raw"));
    }
}
