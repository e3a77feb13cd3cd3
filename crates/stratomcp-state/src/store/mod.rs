//! Session store contract.
//!
//! The store is the authority for session continuity: metadata, the
//! bounded replay history, the atomic event counter, and the
//! token→session map. Implementations must serialize updates to a single
//! session internally; [`SessionStore::add_message_auto_event_id`] in
//! particular must be atomic with respect to concurrent callers
//! addressing the same session so that event IDs never collide across
//! instances.

mod memory;
mod redis;

pub use memory::MemorySessionStore;
pub use redis::RedisSessionStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StateResult;
use crate::session::{AuthState, SessionMessage, SessionMetadata, TokenRefreshState};

/// Contract over session metadata, history and token binding
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session and arm its inactivity TTL
    async fn create(&self, metadata: SessionMetadata) -> StateResult<()>;

    /// Fetch session metadata; `None` for unknown or expired sessions
    async fn get(&self, id: &str) -> StateResult<Option<SessionMetadata>>;

    /// Remove a session, its history and its token mapping
    async fn delete(&self, id: &str) -> StateResult<()>;

    /// Record activity: bump `last_activity` and re-arm the TTL
    async fn touch(&self, id: &str) -> StateResult<()>;

    /// Append a message under a caller-supplied event id
    async fn add_message(&self, id: &str, event_id: u64, message: &Value) -> StateResult<()>;

    /// Atomically increment the session counter and append the message
    /// under the new value; returns the allocated event id
    async fn add_message_auto_event_id(&self, id: &str, message: &Value) -> StateResult<u64>;

    /// History entries with event id strictly greater than
    /// `from_event_id`, ascending
    async fn messages_from(
        &self,
        id: &str,
        from_event_id: u64,
    ) -> StateResult<Vec<SessionMessage>>;

    /// Ids of all live sessions (used by the token-refresh sweep)
    async fn session_ids(&self) -> StateResult<Vec<String>>;

    /// Resolve a token hash to its session, if bound
    async fn session_by_token_hash(&self, hash: &str) -> StateResult<Option<SessionMetadata>>;

    /// Bind a token hash to a session (at most one session per hash)
    async fn add_token_mapping(&self, hash: &str, session_id: &str) -> StateResult<()>;

    /// Drop a token binding
    async fn remove_token_mapping(&self, hash: &str) -> StateResult<()>;

    /// Replace a session's auth state, removing the previous token hash
    /// and installing the new one atomically with the swap
    async fn update_auth(
        &self,
        id: &str,
        auth: AuthState,
        refresh: Option<TokenRefreshState>,
    ) -> StateResult<()>;

    /// Remove expired sessions and orphaned history; returns how many
    /// sessions were removed
    async fn cleanup(&self) -> StateResult<usize>;
}
