//! In-process message broker.
//!
//! Fan-out is local to the process: every handler subscribed to a topic
//! receives every message published to it. Dispatch happens on spawned
//! tasks, which both keeps publishers non-blocking and isolates handler
//! panics from the broker.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::trace;

use crate::broker::{MessageBroker, TopicHandler};
use crate::error::{StateError, StateResult};

/// In-memory [`MessageBroker`] implementation
#[derive(Clone, Default)]
pub struct MemoryMessageBroker {
    subscriptions: Arc<RwLock<HashMap<String, Vec<TopicHandler>>>>,
    closed: Arc<RwLock<bool>>,
}

impl std::fmt::Debug for MemoryMessageBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMessageBroker").finish()
    }
}

impl MemoryMessageBroker {
    /// Create a new broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handlers subscribed to `topic`
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.subscriptions
            .read()
            .await
            .get(topic)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl MessageBroker for MemoryMessageBroker {
    async fn publish(&self, topic: &str, message: &Value) -> StateResult<()> {
        if *self.closed.read().await {
            return Err(StateError::backend("broker is closed"));
        }
        let handlers = {
            let subscriptions = self.subscriptions.read().await;
            subscriptions.get(topic).cloned().unwrap_or_default()
        };
        trace!(topic = %topic, subscribers = handlers.len(), "publishing");
        for handler in handlers {
            let message = message.clone();
            tokio::spawn(async move {
                handler(message).await;
            });
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: TopicHandler) -> StateResult<()> {
        if *self.closed.read().await {
            return Err(StateError::backend("broker is closed"));
        }
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> StateResult<()> {
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.remove(topic);
        Ok(())
    }

    async fn close(&self) -> StateResult<()> {
        *self.closed.write().await = true;
        self.subscriptions.write().await.clear();
        Ok(())
    }
}
