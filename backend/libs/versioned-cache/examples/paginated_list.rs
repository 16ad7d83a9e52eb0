//! Paginated list caching with one-call invalidation
//!
//! Uses Redis from `REDIS_*` when reachable, otherwise an in-process store.
//! Run with: cargo run --example paginated_list

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use versioned_cache::{
    CacheError, CacheOperations, MemoryStore, RedisConfig, VersionKeyBuilder, VersionedCache,
    VersionedCacheConfig,
};

async fn load_page(user: &str, page: u32) -> Result<Vec<String>, CacheError> {
    info!(user, page, "Loading page from the database");
    Ok((0..3).map(|i| format!("{}-item-{}", user, page * 10 + i)).collect())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,versioned_cache=debug".into()),
        )
        .init();

    let config = VersionedCacheConfig::new("demo", Duration::from_secs(600))?;
    let redis_config = RedisConfig::from_env()?;

    let cache = match VersionedCache::connect(config.clone(), &redis_config).await {
        Ok(cache) => cache,
        Err(CacheError::Connection(reason)) => {
            warn!(%reason, "Redis unavailable, falling back to in-process store");
            VersionedCache::new(config, Arc::new(MemoryStore::new()))?
        }
        Err(e) => return Err(e.into()),
    };

    let user = "seyo";
    for page in [1u32, 2, 1] {
        // Every page of this user's list shares one version key
        let version_key = VersionKeyBuilder::new("version")
            .param("user", user)
            .param("page", page)
            .only(["user"])
            .build();

        let rows = cache
            .get_or_set_with(
                "user_list",
                &format!("page_{}", page),
                Some(&version_key),
                None,
                || load_page(user, page),
            )
            .await?;
        info!(page, ?rows, "Served page");
    }

    let version_key = VersionKeyBuilder::new("version")
        .param("user", user)
        .only(["user"])
        .build();
    let version = cache
        .increment_version_number("user_list", &version_key)
        .await?;
    info!(version, "User data changed, list version bumped");

    let stale: Option<Vec<String>> = cache
        .get("user_list", "page_1", Some(&version_key))
        .await?;
    info!(hit = stale.is_some(), "Lookup after bump");

    Ok(())
}
