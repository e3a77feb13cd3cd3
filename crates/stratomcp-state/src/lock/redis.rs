//! Redis-backed lock.
//!
//! `SET key owner NX PX ttl` for acquisition; release and extension run
//! as owner-checked server-side scripts so a lock that expired and was
//! re-acquired by someone else can never be released by the old owner.

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Script};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::lock::DistributedLock;

/// KEYS[1] = lock key, ARGV[1] = owner
const RELEASE_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
";

/// KEYS[1] = lock key, ARGV[1] = owner, ARGV[2] = TTL millis
const EXTEND_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
    return 0
end
";

/// Redis [`DistributedLock`] implementation
#[derive(Clone)]
pub struct RedisLock {
    conn: redis::aio::MultiplexedConnection,
    prefix: String,
    release: Script,
    extend: Script,
}

impl std::fmt::Debug for RedisLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLock")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl RedisLock {
    /// Connect with the default `mcp:lock` key prefix
    pub async fn connect(connection_string: &str) -> StateResult<Self> {
        Self::connect_with(connection_string, "mcp:lock").await
    }

    /// Connect with an explicit key prefix
    pub async fn connect_with(connection_string: &str, prefix: &str) -> StateResult<Self> {
        let client = redis::Client::open(connection_string)
            .map_err(|e| StateError::connection(format!("invalid Redis URL: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StateError::connection(format!("failed to connect to Redis: {e}")))?;
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
            release: Script::new(RELEASE_SCRIPT),
            extend: Script::new(EXTEND_SCRIPT),
        })
    }

    fn lock_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait]
impl DistributedLock for RedisLock {
    async fn acquire(&self, key: &str, ttl: Duration, owner: &str) -> StateResult<bool> {
        let mut conn = self.conn.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(self.lock_key(key))
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        let acquired = acquired.is_some();
        if acquired {
            debug!(key = %key, owner = %owner, "lock acquired");
        }
        Ok(acquired)
    }

    async fn extend(&self, key: &str, ttl: Duration, owner: &str) -> StateResult<bool> {
        let mut conn = self.conn.clone();
        let extended: i64 = self
            .extend
            .key(self.lock_key(key))
            .arg(owner)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }

    async fn release(&self, key: &str, owner: &str) -> StateResult<bool> {
        let mut conn = self.conn.clone();
        let released: i64 = self
            .release
            .key(self.lock_key(key))
            .arg(owner)
            .invoke_async(&mut conn)
            .await?;
        if released == 1 {
            debug!(key = %key, owner = %owner, "lock released");
        }
        Ok(released == 1)
    }

    async fn is_locked(&self, key: &str) -> StateResult<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(self.lock_key(key)).await?;
        Ok(exists)
    }
}
