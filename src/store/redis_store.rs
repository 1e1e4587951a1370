//! Redis-backed counter store.
//!
//! ## Key layout
//!
//! One integer key per identity: `<key_prefix><identity>`. The key is created
//! by the first `INCR` of a window and given a millisecond TTL equal to the
//! window length; when the TTL fires the next request starts a new window.
//!
//! ## Atomicity
//!
//! Increment, expiry and TTL lookup run inside one Lua script, so concurrent
//! gateways never observe a counter without its expiry and never lose an
//! increment. A non-numeric value under a counter key is overwritten with `1`
//! and a fresh TTL inside the same script; the caller logs the repair.
//!
//! ## Connection handling
//!
//! The connection is opened on first use and shared afterwards through
//! `redis::aio::ConnectionManager`, which multiplexes callers over one socket
//! and reconnects after failures. Every round-trip is bounded by
//! `RedisStoreConfig::timeout`. After a failed connect, callers fail fast for
//! `CONNECT_COOLDOWN` instead of each waiting out a fresh connect attempt.

use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, ErrorKind, RedisError, Script};
use tokio::sync::OnceCell;
use tokio::time::Instant;
use url::Url;

use crate::config::StoreConfig;
use crate::store::{CounterStore, StoreError, WindowCount};

/// How long a failed connect is remembered before the next attempt.
const CONNECT_COOLDOWN: Duration = Duration::from_secs(1);

/// Returns `{pre_increment_count, ttl_ms, healed}`.
const INCREMENT_SCRIPT: &str = r#"
local window_ms = tonumber(ARGV[1])
local current = redis.pcall('INCR', KEYS[1])
if type(current) == 'table' and current['err'] then
  redis.call('SET', KEYS[1], 1, 'PX', window_ms)
  return {0, window_ms, 1}
end
if current == 1 then
  redis.call('PEXPIRE', KEYS[1], window_ms)
  return {0, window_ms, 0}
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
  redis.call('PEXPIRE', KEYS[1], window_ms)
  ttl = window_ms
end
return {current - 1, ttl, 0}
"#;

/// Connection settings for the Redis store.
#[derive(Clone)]
pub struct RedisStoreConfig {
    /// "host:port".
    pub address: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: i64,
    pub key_prefix: String,
    /// Deadline for connecting and for each command.
    pub timeout: Duration,
}

impl fmt::Debug for RedisStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStoreConfig")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("key_prefix", &self.key_prefix)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl From<&StoreConfig> for RedisStoreConfig {
    fn from(config: &StoreConfig) -> Self {
        Self {
            address: config.address.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            database: config.database,
            key_prefix: config.key_prefix.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

impl RedisStoreConfig {
    /// Render the `redis://` connection URL.
    pub fn connection_url(&self) -> Result<Url, StoreError> {
        let mut url = Url::parse(&format!("redis://{}/{}", self.address, self.database))
            .map_err(|e| StoreError::InvalidAddress(format!("{}: {e}", self.address)))?;

        if let Some(username) = &self.username {
            url.set_username(username)
                .map_err(|_| StoreError::InvalidAddress(self.address.clone()))?;
        }
        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| StoreError::InvalidAddress(self.address.clone()))?;
        }
        Ok(url)
    }
}

/// Redis implementation of [`CounterStore`].
pub struct RedisCounterStore {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    last_connect_failure: Mutex<Option<Instant>>,
    script: Script,
    config: RedisStoreConfig,
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("config", &self.config)
            .field("connected", &self.connection.initialized())
            .finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    /// Build the client. No network traffic happens until the first command.
    pub fn new(config: RedisStoreConfig) -> Result<Self, StoreError> {
        let url = config.connection_url()?;
        let client = Client::open(url.as_str())
            .map_err(|e| StoreError::InvalidAddress(e.to_string()))?;

        Ok(Self {
            client,
            connection: OnceCell::new(),
            last_connect_failure: Mutex::new(None),
            script: Script::new(INCREMENT_SCRIPT),
            config,
        })
    }

    fn key(&self, identity: &str) -> String {
        format!("{}{}", self.config.key_prefix, identity)
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        if let Some(manager) = self.connection.get() {
            return Ok(manager.clone());
        }
        if let Some(remaining) = self.cooldown_remaining() {
            return Err(StoreError::Unavailable(format!(
                "connect failed recently; next attempt in {remaining:?}"
            )));
        }

        let manager = self
            .connection
            .get_or_try_init(|| async {
                let manager = self
                    .bounded(ConnectionManager::new(self.client.clone()))
                    .await;
                match manager {
                    Ok(manager) => {
                        tracing::info!(address = %self.config.address, "Connected to counter store");
                        Ok(manager)
                    }
                    Err(e) => {
                        self.note_connect_failure();
                        Err(e)
                    }
                }
            })
            .await?;
        Ok(manager.clone())
    }

    fn cooldown_remaining(&self) -> Option<Duration> {
        let failed_at = (*self.last_connect_failure.lock().ok()?)?;
        CONNECT_COOLDOWN.checked_sub(failed_at.elapsed()).filter(|d| !d.is_zero())
    }

    fn note_connect_failure(&self) {
        if let Ok(mut last) = self.last_connect_failure.lock() {
            *last = Some(Instant::now());
        }
    }

    async fn bounded<T, F>(&self, future: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        match tokio::time::timeout(self.config.timeout, future).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Unavailable(e.to_string())),
            Err(_) => Err(StoreError::Unavailable(format!(
                "no reply within {:?}",
                self.config.timeout
            ))),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, identity: &str, window: Duration) -> Result<WindowCount, StoreError> {
        let key = self.key(identity);
        let window_ms = window.as_millis().clamp(1, u64::MAX as u128) as u64;
        let mut conn = self.connection().await?;

        let mut invocation = self.script.key(&key);
        invocation.arg(window_ms);
        let reply: Result<Vec<i64>, RedisError> =
            tokio::time::timeout(self.config.timeout, invocation.invoke_async(&mut conn))
                .await
                .map_err(|_| {
                    StoreError::Unavailable(format!("no reply within {:?}", self.config.timeout))
                })?;

        let values = match reply {
            Ok(values) => values,
            Err(e) if e.kind() == ErrorKind::TypeError => {
                return Err(StoreError::CorruptState {
                    key,
                    detail: e.to_string(),
                });
            }
            Err(e) => return Err(StoreError::Unavailable(e.to_string())),
        };

        let (count, ttl_ms, healed) = parse_reply(&key, &values)?;
        if healed {
            tracing::warn!(key = %key, "Counter held a non-numeric value; reset to a fresh window");
        }

        Ok(WindowCount {
            count,
            window_remaining: Duration::from_millis(ttl_ms),
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: String = self.bounded(redis::cmd("PING").query_async(&mut conn)).await?;
        Ok(())
    }
}

fn parse_reply(key: &str, values: &[i64]) -> Result<(u64, u64, bool), StoreError> {
    match values {
        [count, ttl_ms, healed] if *count >= 0 && *ttl_ms >= 0 => {
            Ok((*count as u64, *ttl_ms as u64, *healed != 0))
        }
        other => Err(StoreError::CorruptState {
            key: key.to_string(),
            detail: format!("unexpected script reply {other:?}"),
        }),
    }
}
