//! Redis connection bootstrap
//!
//! Builds a connection from host/port style settings. A persistent connection
//! uses `ConnectionManager`, which reconnects on its own; a non-persistent one
//! is a plain multiplexed connection that surfaces broken pipes to the caller.

use anyhow::{anyhow, Context, Result};
use redis::aio::{ConnectionLike, ConnectionManager, MultiplexedConnection};
use redis::{Client, Cmd, Pipeline, RedisFuture, Value};
use std::fmt;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// Redis connection settings
#[derive(Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    /// Logical database index
    pub db: i64,
    pub password: Option<String>,
    /// Upper bound for establishing the connection
    pub connect_timeout: Duration,
    /// Upper bound for a single command round trip, if any
    pub response_timeout: Option<Duration>,
    /// Keep a reconnecting connection instead of a one-shot one
    pub persistent: bool,
}

impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("connect_timeout", &self.connect_timeout)
            .field("response_timeout", &self.response_timeout)
            .field("persistent", &self.persistent)
            .finish()
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 6379,
            db: 0,
            password: None,
            connect_timeout: Duration::from_millis(1000),
            response_timeout: None,
            persistent: true,
        }
    }
}

impl RedisConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Load settings from `REDIS_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let port = match std::env::var("REDIS_PORT") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("invalid REDIS_PORT: {raw}"))?,
            Err(_) => defaults.port,
        };
        let db = match std::env::var("REDIS_DB") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("invalid REDIS_DB: {raw}"))?,
            Err(_) => defaults.db,
        };

        Ok(Self {
            host: std::env::var("REDIS_HOST").unwrap_or(defaults.host),
            port,
            db,
            password: std::env::var("REDIS_PASSWORD")
                .ok()
                .filter(|p| !p.is_empty()),
            connect_timeout: std::env::var("REDIS_CONNECT_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
            response_timeout: std::env::var("REDIS_RESPONSE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis),
            persistent: std::env::var("REDIS_PERSISTENT")
                .ok()
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.persistent),
        })
    }

    /// Connection URL understood by `redis::Client::open`
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                urlencoding::encode(password),
                self.host,
                self.port,
                self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Either a reconnecting manager or a single multiplexed connection.
///
/// Both halves are cheap to clone and share one socket.
#[derive(Clone)]
pub enum RedisConnection {
    Managed(ConnectionManager),
    Direct(MultiplexedConnection),
}

impl RedisConnection {
    pub fn is_persistent(&self) -> bool {
        matches!(self, RedisConnection::Managed(_))
    }
}

impl ConnectionLike for RedisConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            RedisConnection::Managed(conn) => conn.req_packed_command(cmd),
            RedisConnection::Direct(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            RedisConnection::Managed(conn) => conn.req_packed_commands(cmd, offset, count),
            RedisConnection::Direct(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            RedisConnection::Managed(conn) => conn.get_db(),
            RedisConnection::Direct(conn) => conn.get_db(),
        }
    }
}

/// Open a connection and verify it with a PING.
pub async fn connect(config: &RedisConfig) -> Result<RedisConnection> {
    let client = Client::open(config.url()).context("failed to construct Redis client")?;
    let addr_label = format!("{}:{}/{}", config.host, config.port, config.db);

    debug!(addr = %addr_label, persistent = config.persistent, "Connecting to Redis");

    let establish = async {
        let mut conn = if config.persistent {
            RedisConnection::Managed(
                ConnectionManager::new(client)
                    .await
                    .context("failed to initialize Redis connection manager")?,
            )
        } else {
            RedisConnection::Direct(
                client
                    .get_multiplexed_async_connection()
                    .await
                    .context("failed to open Redis connection")?,
            )
        };

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .context("Redis did not answer PING")?;

        Ok::<_, anyhow::Error>(conn)
    };

    let conn = timeout(config.connect_timeout, establish)
        .await
        .map_err(|_| {
            anyhow!(
                "timed out after {:?} connecting to Redis at {}",
                config.connect_timeout,
                addr_label
            )
        })??;

    info!(addr = %addr_label, persistent = conn.is_persistent(), "Redis connection established");
    Ok(conn)
}
