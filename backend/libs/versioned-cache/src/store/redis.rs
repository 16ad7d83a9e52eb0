//! Redis-backed store

use super::{KeyValueStore, StoreError};
use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult, Value};
use redis_utils::{RedisConfig, RedisConnection};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Store implementation over a shared Redis connection
#[derive(Clone)]
pub struct RedisStore {
    conn: RedisConnection,
    response_timeout: Option<Duration>,
}

impl RedisStore {
    pub fn new(conn: RedisConnection) -> Self {
        Self {
            conn,
            response_timeout: None,
        }
    }

    /// Bound every command round trip
    pub fn with_response_timeout(mut self, response_timeout: Option<Duration>) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    /// Connect using `config`, carrying over its response timeout
    pub async fn connect(config: &RedisConfig) -> anyhow::Result<Self> {
        let conn = redis_utils::connect(config).await?;
        Ok(Self::new(conn).with_response_timeout(config.response_timeout))
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match self.response_timeout {
            Some(limit) => timeout(limit, op)
                .await
                .map_err(|_| StoreError::Timeout(limit))?
                .map_err(StoreError::from),
            None => op.await.map_err(StoreError::from),
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.get::<_, Option<Vec<u8>>>(key).await })
            .await
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &[u8],
        ttl_secs: u64,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Value = self
            .run(async move {
                redis::cmd("SETEX")
                    .arg(key)
                    .arg(ttl_secs)
                    .arg(value)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(matches!(reply, Value::Okay))
    }

    async fn delete(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.del::<_, u64>(key).await }).await
    }

    async fn increment(&self, key: &str, seed: i64, ttl_secs: u64) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        // MULTI/EXEC keeps seed, increment and expiry refresh in one step
        let (value,): (i64,) = self
            .run(async move {
                redis::pipe()
                    .atomic()
                    .cmd("SET")
                    .arg(key)
                    .arg(seed)
                    .arg("NX")
                    .ignore()
                    .cmd("INCR")
                    .arg(key)
                    .cmd("EXPIRE")
                    .arg(key)
                    .arg(ttl_secs)
                    .ignore()
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(value)
    }
}
