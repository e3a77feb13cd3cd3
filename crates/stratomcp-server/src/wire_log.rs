//! Wire-level logging feature (`logging/setLevel` + `notifications/message`).
//!
//! One process-wide minimum severity filters everything the host emits
//! through [`WireLogger::log`]; messages at or above the minimum go out
//! as `notifications/message` on the broadcast topic, reaching every
//! session on every instance.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use stratomcp_protocol::methods::NOTIFICATION_MESSAGE;
use stratomcp_protocol::types::{LogLevel, LoggingMessageParams};
use stratomcp_protocol::JsonRpcNotification;
use stratomcp_state::{topics, MessageBroker};

use crate::error::ServerResult;

/// RFC 5424-filtered logger publishing over the broker
pub struct WireLogger {
    min_level: AtomicU8,
    broker: Arc<dyn MessageBroker>,
}

impl std::fmt::Debug for WireLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireLogger")
            .field("min_level", &self.level())
            .finish()
    }
}

impl WireLogger {
    /// Logger with the default minimum severity (`info`)
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self {
            min_level: AtomicU8::new(LogLevel::Info.severity()),
            broker,
        }
    }

    /// Current minimum severity
    pub fn level(&self) -> LogLevel {
        match self.min_level.load(Ordering::Relaxed) {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Notice,
            3 => LogLevel::Warning,
            4 => LogLevel::Error,
            5 => LogLevel::Critical,
            6 => LogLevel::Alert,
            _ => LogLevel::Emergency,
        }
    }

    /// Set the minimum severity
    pub fn set_level(&self, level: LogLevel) {
        self.min_level.store(level.severity(), Ordering::Relaxed);
    }

    /// Whether a message at `level` passes the filter
    pub fn should_emit(&self, level: LogLevel) -> bool {
        level.severity() >= self.min_level.load(Ordering::Relaxed)
    }

    /// Emit a log message to every session; `Ok(false)` when filtered
    pub async fn log(
        &self,
        level: LogLevel,
        data: Value,
        logger: Option<String>,
    ) -> ServerResult<bool> {
        if !self.should_emit(level) {
            return Ok(false);
        }
        let params = LoggingMessageParams {
            level,
            data,
            logger,
        };
        let notification =
            JsonRpcNotification::new(NOTIFICATION_MESSAGE, Some(serde_json::to_value(&params)?));
        if let Err(e) = self
            .broker
            .publish(
                topics::BROADCAST_NOTIFICATION,
                &serde_json::to_value(&notification)?,
            )
            .await
        {
            warn!(error = %e, "failed to publish log notification");
            return Ok(false);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stratomcp_state::MemoryMessageBroker;
    use tokio::sync::mpsc;

    fn capture_broker() -> (Arc<MemoryMessageBroker>, mpsc::UnboundedReceiver<Value>) {
        let broker = Arc::new(MemoryMessageBroker::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let broker_for_sub = broker.clone();
        tokio::spawn(async move {
            broker_for_sub
                .subscribe(
                    topics::BROADCAST_NOTIFICATION,
                    Arc::new(move |value| {
                        let tx = tx.clone();
                        Box::pin(async move {
                            let _ = tx.send(value);
                        })
                    }),
                )
                .await
                .unwrap();
        });
        (broker, rx)
    }

    #[tokio::test]
    async fn severity_filter_matches_rfc5424() {
        let broker = Arc::new(MemoryMessageBroker::new());
        let logger = WireLogger::new(broker);
        logger.set_level(LogLevel::Warning);

        assert!(!logger.should_emit(LogLevel::Debug));
        assert!(!logger.should_emit(LogLevel::Info));
        assert!(!logger.should_emit(LogLevel::Notice));
        assert!(logger.should_emit(LogLevel::Warning));
        assert!(logger.should_emit(LogLevel::Error));
        assert!(logger.should_emit(LogLevel::Emergency));
    }

    #[tokio::test]
    async fn filtered_messages_are_not_published() {
        let (broker, mut rx) = capture_broker();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let logger = WireLogger::new(broker);
        logger.set_level(LogLevel::Error);

        let emitted = logger.log(LogLevel::Info, json!("quiet"), None).await.unwrap();
        assert!(!emitted);

        let emitted = logger
            .log(LogLevel::Critical, json!("loud"), Some("core".into()))
            .await
            .unwrap();
        assert!(emitted);

        let value = rx.recv().await.unwrap();
        assert_eq!(value["method"], "notifications/message");
        assert_eq!(value["params"]["level"], "critical");
        assert_eq!(value["params"]["data"], "loud");
        assert_eq!(value["params"]["logger"], "core");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn default_level_is_info() {
        let logger = WireLogger::new(Arc::new(MemoryMessageBroker::new()));
        assert_eq!(logger.level(), LogLevel::Info);
        assert!(!logger.should_emit(LogLevel::Debug));
        assert!(logger.should_emit(LogLevel::Info));
    }
}
