//! Distributed lock contract.
//!
//! A TTL mutex with owner checks: `acquire` is set-if-not-exists,
//! `release` and `extend` succeed only for the holding owner, and a lock
//! auto-releases when its TTL lapses. The token-refresh service leans on
//! this to guarantee at most one refresh per session across instances.

mod memory;
mod redis;

pub use memory::MemoryLock;
pub use redis::RedisLock;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StateResult;

/// TTL mutex with owner-checked release and extension
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Take the lock iff nobody holds it; `true` on success
    async fn acquire(&self, key: &str, ttl: Duration, owner: &str) -> StateResult<bool>;

    /// Push the expiry out by `ttl`; `false` unless `owner` holds the lock
    async fn extend(&self, key: &str, ttl: Duration, owner: &str) -> StateResult<bool>;

    /// Release the lock; `false` unless `owner` holds it
    async fn release(&self, key: &str, owner: &str) -> StateResult<bool>;

    /// Whether anyone currently holds the lock
    async fn is_locked(&self, key: &str) -> StateResult<bool>;
}
