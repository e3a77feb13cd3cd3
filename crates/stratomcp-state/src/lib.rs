//! # stratomcp-state
//!
//! Horizontally-scalable state backends for the stratomcp runtime:
//!
//! - [`store::SessionStore`] — session metadata, bounded per-session
//!   message history with atomic event-id allocation, and token→session
//!   mapping.
//! - [`broker::MessageBroker`] — best-effort topic pub/sub for
//!   cross-instance message delivery.
//! - [`lock::DistributedLock`] — TTL mutex with owner-checked release.
//!
//! Each contract has two implementations: an in-process one for
//! single-instance deployments, and a Redis one for multi-instance
//! deployments. A single instance picks one family at configuration time;
//! the contracts make the choice invisible to the engine and transports.

pub mod broker;
pub mod error;
pub mod lock;
pub mod session;
pub mod store;

pub use broker::{topics, MemoryMessageBroker, MessageBroker, RedisMessageBroker, TopicHandler};
pub use error::{StateError, StateResult};
pub use lock::{DistributedLock, MemoryLock, RedisLock};
pub use session::{
    hash_token, AuthState, OAuthSubSession, SessionMessage, SessionMetadata, TokenRefreshState,
};
pub use store::{MemorySessionStore, RedisSessionStore, SessionStore};
