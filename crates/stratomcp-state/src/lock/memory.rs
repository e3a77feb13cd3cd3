//! In-process lock with the same semantics as the Redis one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StateResult;
use crate::lock::DistributedLock;

struct LockEntry {
    owner: String,
    expires_at: Instant,
}

/// In-memory [`DistributedLock`] implementation
#[derive(Clone, Default)]
pub struct MemoryLock {
    locks: Arc<Mutex<HashMap<String, LockEntry>>>,
}

impl std::fmt::Debug for MemoryLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLock").finish()
    }
}

impl MemoryLock {
    /// Create a new lock registry
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DistributedLock for MemoryLock {
    async fn acquire(&self, key: &str, ttl: Duration, owner: &str) -> StateResult<bool> {
        let mut locks = self.locks.lock().await;
        let now = Instant::now();
        match locks.get(key) {
            Some(entry) if entry.expires_at > now => Ok(false),
            _ => {
                locks.insert(
                    key.to_string(),
                    LockEntry {
                        owner: owner.to_string(),
                        expires_at: now + ttl,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn extend(&self, key: &str, ttl: Duration, owner: &str) -> StateResult<bool> {
        let mut locks = self.locks.lock().await;
        let now = Instant::now();
        match locks.get_mut(key) {
            Some(entry) if entry.expires_at > now && entry.owner == owner => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &str, owner: &str) -> StateResult<bool> {
        let mut locks = self.locks.lock().await;
        let now = Instant::now();
        match locks.get(key) {
            Some(entry) if entry.expires_at > now && entry.owner == owner => {
                locks.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn is_locked(&self, key: &str) -> StateResult<bool> {
        let locks = self.locks.lock().await;
        Ok(locks
            .get(key)
            .is_some_and(|entry| entry.expires_at > Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mutual_exclusion_between_owners() {
        let lock = MemoryLock::new();
        let ttl = Duration::from_secs(30);

        assert!(lock.acquire("k", ttl, "o1").await.unwrap());
        assert!(!lock.acquire("k", ttl, "o2").await.unwrap());
        assert!(lock.is_locked("k").await.unwrap());

        // Wrong owner cannot release
        assert!(!lock.release("k", "o2").await.unwrap());
        assert!(lock.release("k", "o1").await.unwrap());
        assert!(!lock.is_locked("k").await.unwrap());

        // Now o2 can take it
        assert!(lock.acquire("k", ttl, "o2").await.unwrap());
    }

    #[tokio::test]
    async fn ttl_expiry_frees_the_lock() {
        let lock = MemoryLock::new();
        assert!(lock
            .acquire("k", Duration::from_millis(10), "o1")
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(!lock.is_locked("k").await.unwrap());
        assert!(lock
            .acquire("k", Duration::from_secs(30), "o2")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn extend_requires_ownership() {
        let lock = MemoryLock::new();
        assert!(lock
            .acquire("k", Duration::from_secs(30), "o1")
            .await
            .unwrap());
        assert!(lock.extend("k", Duration::from_secs(60), "o1").await.unwrap());
        assert!(!lock.extend("k", Duration::from_secs(60), "o2").await.unwrap());
        assert!(!lock
            .extend("missing", Duration::from_secs(60), "o1")
            .await
            .unwrap());
    }
}
