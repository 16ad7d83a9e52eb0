//! Integration tests against a live Redis
//!
//! These tests require a running Redis instance.
//! Run with: cargo test --test integration_test -- --ignored

use serde::{Deserialize, Serialize};
use std::time::Duration;
use versioned_cache::{
    CacheOperations, KeyValueStore, RedisConfig, RedisStore, VersionKeyBuilder, VersionedCache,
    VersionedCacheConfig,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct UserRow {
    id: u64,
    name: String,
}

/// Fresh namespace per test so runs don't see each other's keys
fn unique_namespace(test: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    format!("vercache-it-{}-{}", test, nanos)
}

async fn cache(test: &str, version_ttl: Duration) -> VersionedCache {
    let config = VersionedCacheConfig::new(unique_namespace(test), Duration::from_secs(60))
        .expect("valid config")
        .with_version_ttl(version_ttl);
    VersionedCache::connect(config, &RedisConfig::default())
        .await
        .expect("Failed to connect to Redis")
}

fn user_version_key() -> String {
    VersionKeyBuilder::new("version")
        .param("user", "seyo")
        .param("phone", "1234")
        .param("page", 1u32)
        .except(["page"])
        .build()
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_round_trip_and_invalidation() {
    let cache = cache("roundtrip", Duration::from_secs(60)).await;
    let vk = user_version_key();
    let rows = vec![UserRow {
        id: 1,
        name: "seyo".to_string(),
    }];

    assert_eq!(cache.version_number("user_list", &vk).await.unwrap(), 1);
    assert!(cache
        .set("user_list", "page_1", &rows, Some(&vk), None)
        .await
        .unwrap());

    let cached: Option<Vec<UserRow>> = cache.get("user_list", "page_1", Some(&vk)).await.unwrap();
    assert_eq!(cached, Some(rows));

    let old_physical = cache
        .physical_key("user_list", "page_1", Some(&vk))
        .await
        .unwrap();
    assert_eq!(
        cache.increment_version_number("user_list", &vk).await.unwrap(),
        2
    );

    let cached: Option<Vec<UserRow>> = cache.get("user_list", "page_1", Some(&vk)).await.unwrap();
    assert_eq!(cached, None);

    // Old slot is still there until its own expiry
    let store = RedisStore::connect(&RedisConfig::default()).await.unwrap();
    assert!(store.get(&old_physical).await.unwrap().is_some());
    store.delete(&old_physical).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_delete_returns_true_once() {
    let cache = cache("delete", Duration::from_secs(60)).await;

    cache.set("p", "k", &"v", None, None).await.unwrap();
    assert!(cache.delete("p", "k", None).await.unwrap());
    assert!(!cache.delete("p", "k", None).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_version_counter_expires() {
    let cache = cache("counter_ttl", Duration::from_secs(1)).await;
    let vk = user_version_key();

    cache.increment_version_number("user_list", &vk).await.unwrap();
    assert_eq!(cache.version_number("user_list", &vk).await.unwrap(), 2);

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(cache.version_number("user_list", &vk).await.unwrap(), 1);
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_concurrent_bumps_are_not_lost() {
    let cache = cache("concurrent", Duration::from_secs(60)).await;
    let vk = user_version_key();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let cache = cache.clone();
        let vk = vk.clone();
        handles.push(tokio::spawn(async move {
            cache.increment_version_number("user_list", &vk).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(cache.version_number("user_list", &vk).await.unwrap(), 21);
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_non_persistent_connection() {
    let config = VersionedCacheConfig::new(unique_namespace("direct"), Duration::from_secs(60))
        .unwrap();
    let redis_config = RedisConfig {
        persistent: false,
        response_timeout: Some(Duration::from_secs(2)),
        ..RedisConfig::default()
    };
    let cache = VersionedCache::connect(config, &redis_config).await.unwrap();

    cache.set("p", "k", &7u32, None, None).await.unwrap();
    assert_eq!(cache.get::<u32>("p", "k", None).await.unwrap(), Some(7));
}
