//! Message broker contract and topic names.
//!
//! The broker is best-effort pub/sub over topic strings: no persistence,
//! no replay (replay belongs to the session store). Subscriber handlers
//! are async and must not block the broker; implementations dispatch on
//! spawned tasks so a slow or panicking handler cannot stall publishers.

mod memory;
mod redis;

pub use memory::MemoryMessageBroker;
pub use redis::RedisMessageBroker;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::StateResult;

/// Async subscriber callback invoked for every message on a topic
pub type TopicHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Best-effort topic pub/sub
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publish a message to every subscriber of `topic`
    async fn publish(&self, topic: &str, message: &Value) -> StateResult<()>;

    /// Register a handler for `topic`
    async fn subscribe(&self, topic: &str, handler: TopicHandler) -> StateResult<()>;

    /// Drop every handler for `topic`
    async fn unsubscribe(&self, topic: &str) -> StateResult<()>;

    /// Tear down subscriptions and the backend connection
    async fn close(&self) -> StateResult<()>;
}

/// Standard topic names
pub mod topics {
    /// Notifications addressed to every session
    pub const BROADCAST_NOTIFICATION: &str = "mcp/broadcast/notification";

    /// Messages destined for one session's streams
    pub fn session_message(session_id: &str) -> String {
        format!("mcp/session/{session_id}/message")
    }

    /// Status changes of one task
    pub fn task_status(task_id: &str) -> String {
        format!("mcp/task/{task_id}/status")
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn topic_grammar() {
            assert_eq!(session_message("s1"), "mcp/session/s1/message");
            assert_eq!(task_status("t1"), "mcp/task/t1/status");
            assert_eq!(BROADCAST_NOTIFICATION, "mcp/broadcast/notification");
        }
    }
}
