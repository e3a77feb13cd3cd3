//! Redis-backed message broker.
//!
//! Fan-out crosses process boundaries: a message published on any
//! instance reaches every subscriber on every instance. One background
//! task owns the pub/sub stream half and dispatches incoming messages to
//! the handlers registered locally; the sink half stays available for
//! dynamic subscribe/unsubscribe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::broker::{MessageBroker, TopicHandler};
use crate::error::{StateError, StateResult};

type HandlerMap = Arc<RwLock<HashMap<String, Vec<TopicHandler>>>>;

/// Redis pub/sub [`MessageBroker`] implementation
#[derive(Clone)]
pub struct RedisMessageBroker {
    publish_conn: redis::aio::MultiplexedConnection,
    sink: Arc<Mutex<redis::aio::PubSubSink>>,
    handlers: HandlerMap,
    reader: Arc<Mutex<Option<JoinHandle<()>>>>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for RedisMessageBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisMessageBroker")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl RedisMessageBroker {
    /// Connect the publish connection and the pub/sub reader
    pub async fn connect(connection_string: &str) -> StateResult<Self> {
        let client = redis::Client::open(connection_string)
            .map_err(|e| StateError::connection(format!("invalid Redis URL: {e}")))?;
        let publish_conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StateError::connection(format!("failed to connect to Redis: {e}")))?;
        let pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| StateError::connection(format!("failed to open pub/sub: {e}")))?;
        let (sink, mut stream) = pubsub.split();

        let handlers: HandlerMap = Arc::new(RwLock::new(HashMap::new()));
        let reader_handlers = handlers.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let channel = msg.get_channel_name().to_string();
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "unreadable pub/sub payload");
                        continue;
                    }
                };
                let value: Value = match serde_json::from_str(&payload) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "non-JSON pub/sub payload");
                        continue;
                    }
                };
                Self::dispatch(&reader_handlers, &channel, value).await;
            }
            debug!("pub/sub stream ended");
        });

        Ok(Self {
            publish_conn,
            sink: Arc::new(Mutex::new(sink)),
            handlers,
            reader: Arc::new(Mutex::new(Some(reader))),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn dispatch(handlers: &HandlerMap, channel: &str, value: Value) {
        let local = {
            let handlers = handlers.read().await;
            handlers.get(channel).cloned().unwrap_or_default()
        };
        trace!(channel = %channel, subscribers = local.len(), "dispatching");
        for handler in local {
            let value = value.clone();
            tokio::spawn(async move {
                handler(value).await;
            });
        }
    }

    fn ensure_open(&self) -> StateResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StateError::backend("broker is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for RedisMessageBroker {
    async fn publish(&self, topic: &str, message: &Value) -> StateResult<()> {
        self.ensure_open()?;
        let payload = serde_json::to_string(message)?;
        let mut conn = self.publish_conn.clone();
        let _: () = redis::cmd("PUBLISH")
            .arg(topic)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: TopicHandler) -> StateResult<()> {
        self.ensure_open()?;
        let newly_subscribed = {
            let mut handlers = self.handlers.write().await;
            let entry = handlers.entry(topic.to_string()).or_default();
            entry.push(handler);
            entry.len() == 1
        };
        if newly_subscribed {
            let mut sink = self.sink.lock().await;
            sink.subscribe(topic).await?;
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> StateResult<()> {
        let had_handlers = self.handlers.write().await.remove(topic).is_some();
        if had_handlers && !self.closed.load(Ordering::SeqCst) {
            let mut sink = self.sink.lock().await;
            sink.unsubscribe(topic).await?;
        }
        Ok(())
    }

    async fn close(&self) -> StateResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.handlers.write().await.clear();
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        debug!("broker closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn dispatch_reaches_only_the_channel_handlers() {
        let handlers: HandlerMap = Arc::new(RwLock::new(HashMap::new()));
        let hits = Arc::new(AtomicUsize::new(0));
        let misses = Arc::new(AtomicUsize::new(0));

        let on_hit = hits.clone();
        handlers.write().await.insert(
            "mcp/session/a/message".to_string(),
            vec![Arc::new(move |_v| {
                let on_hit = on_hit.clone();
                Box::pin(async move {
                    on_hit.fetch_add(1, Ordering::SeqCst);
                })
            })],
        );
        let on_miss = misses.clone();
        handlers.write().await.insert(
            "mcp/session/b/message".to_string(),
            vec![Arc::new(move |_v| {
                let on_miss = on_miss.clone();
                Box::pin(async move {
                    on_miss.fetch_add(1, Ordering::SeqCst);
                })
            })],
        );

        RedisMessageBroker::dispatch(&handlers, "mcp/session/a/message", json!({})).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(misses.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis at redis://127.0.0.1:6379"]
    async fn live_cross_connection_fanout() {
        let a = RedisMessageBroker::connect("redis://127.0.0.1:6379")
            .await
            .unwrap();
        let b = RedisMessageBroker::connect("redis://127.0.0.1:6379")
            .await
            .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Value>();
        b.subscribe(
            "mcp/broadcast/notification",
            Arc::new(move |value| {
                let tx = tx.clone();
                Box::pin(async move {
                    let _ = tx.send(value);
                })
            }),
        )
        .await
        .unwrap();

        // Subscription registration is asynchronous server-side
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        a.publish("mcp/broadcast/notification", &json!({"hello": true}))
            .await
            .unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, json!({"hello": true}));

        a.close().await.unwrap();
        b.close().await.unwrap();
    }
}
