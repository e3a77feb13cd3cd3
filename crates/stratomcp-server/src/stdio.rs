//! Standard I/O transport.
//!
//! Newline-delimited JSON-RPC over the process's stdin/stdout, reusing
//! the protocol engine with no session and no auth context. Stdout is
//! the protocol channel — anything diagnostic must go to stderr (see
//! [`crate::logging`]). Batches are accepted here and answered as one
//! batch line; unparseable input answers an error envelope with a null
//! id.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::BufReader;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, warn};

use stratomcp_protocol::{
    JsonRpcError, JsonRpcErrorCode, JsonRpcMessage, JsonRpcResponse,
};

use crate::context::HandlerContext;
use crate::engine::{EngineOutput, ProtocolEngine};
use crate::error::{ServerError, ServerResult};

/// Line-delimited stdio transport over the shared engine
pub struct StdioTransport {
    engine: Arc<ProtocolEngine>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport").finish()
    }
}

impl StdioTransport {
    /// Transport over the given engine
    pub fn new(engine: Arc<ProtocolEngine>) -> Self {
        Self { engine }
    }

    /// Serve until stdin closes
    pub async fn run(&self) -> ServerResult<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut reader = FramedRead::new(stdin, LinesCodec::new());
        let mut writer = FramedWrite::new(tokio::io::stdout(), LinesCodec::new());

        debug!("stdio transport serving");
        while let Some(line) = reader.next().await {
            let line =
                line.map_err(|e| ServerError::internal(format!("stdin framing error: {e}")))?;
            if line.trim().is_empty() {
                continue;
            }
            for response in self.handle_line(&line).await {
                let text = serde_json::to_string(&response)?;
                writer
                    .send(text)
                    .await
                    .map_err(|e| ServerError::internal(format!("stdout write failed: {e}")))?;
            }
        }
        debug!("stdin closed, stdio transport stopping");
        Ok(())
    }

    /// Process one input line into zero or more response lines
    /// (exposed for testing; `run` is a thin IO loop around it)
    pub async fn handle_line(&self, line: &str) -> Vec<StdioReply> {
        match JsonRpcMessage::parse(line) {
            Ok(JsonRpcMessage::Batch(items)) => {
                let mut responses = Vec::new();
                for item in items {
                    if let Some(response) = self.dispatch_single(item).await {
                        responses.push(response);
                    }
                }
                if responses.is_empty() {
                    Vec::new()
                } else {
                    vec![StdioReply::Batch(responses)]
                }
            }
            Ok(message) => self
                .dispatch_single(message)
                .await
                .map(StdioReply::Single)
                .into_iter()
                .collect(),
            Err(e) => {
                warn!(error = %e, "unparseable stdio input");
                vec![StdioReply::Single(JsonRpcResponse::parse_error(
                    JsonRpcError::new(JsonRpcErrorCode::ParseError, format!("parse error: {e}")),
                ))]
            }
        }
    }

    async fn dispatch_single(&self, message: JsonRpcMessage) -> Option<JsonRpcResponse> {
        match self
            .engine
            .dispatch(message, HandlerContext::anonymous())
            .await
        {
            EngineOutput::Response(response) => Some(response),
            EngineOutput::Stream {
                request_id,
                mut stream,
            } => {
                // No SSE on this transport: drain the sequence and
                // answer with its final item.
                let mut last = None;
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(result) => last = Some(result),
                        Err(e) => {
                            return Some(JsonRpcResponse::error(
                                request_id,
                                JsonRpcError::new(
                                    JsonRpcErrorCode::InternalError,
                                    e.to_string(),
                                ),
                            ))
                        }
                    }
                }
                let result = last?;
                serde_json::to_value(&result)
                    .ok()
                    .map(|value| JsonRpcResponse::success(request_id, value))
            }
            EngineOutput::None => None,
        }
    }
}

/// One stdout line: a single envelope or a batch
#[derive(Debug, Clone, serde::Serialize)]
#[serde(untagged)]
pub enum StdioReply {
    /// Single response envelope
    Single(JsonRpcResponse),
    /// Batch response (answers a batch request)
    Batch(Vec<JsonRpcResponse>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    use stratomcp_protocol::types::Tool;
    use stratomcp_state::MemoryMessageBroker;

    use crate::config::ServerConfig;
    use crate::handler::{tool_fn, ToolOutput};
    use crate::registry::HandlerRegistry;
    use crate::tasks::TaskService;
    use crate::wire_log::WireLogger;

    fn transport() -> StdioTransport {
        let mut registry = HandlerRegistry::new();
        registry
            .register_tool(
                Tool::new("echo"),
                Some(tool_fn(|args, _ctx| async move {
                    Ok(ToolOutput::Single(
                        stratomcp_protocol::types::CallToolResult::text(
                            args["text"].as_str().unwrap_or("").to_string(),
                        ),
                    ))
                })),
            )
            .unwrap();

        let broker = Arc::new(MemoryMessageBroker::new());
        let engine = Arc::new(ProtocolEngine::new(
            Arc::new(registry),
            Arc::new(ServerConfig::default()),
            Arc::new(TaskService::new(broker.clone())),
            Arc::new(WireLogger::new(broker)),
        ));
        StdioTransport::new(engine)
    }

    fn as_value(reply: &StdioReply) -> Value {
        serde_json::to_value(reply).unwrap()
    }

    #[tokio::test]
    async fn request_line_answers_one_line() {
        let transport = transport();
        let replies = transport
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
            .await;
        assert_eq!(replies.len(), 1);
        let value = as_value(&replies[0]);
        assert_eq!(value["id"], 1);
        assert_eq!(value["result"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn notification_line_answers_nothing() {
        let transport = transport();
        let replies = transport
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn parse_error_answers_null_id() {
        let transport = transport();
        let replies = transport.handle_line("{oops").await;
        assert_eq!(replies.len(), 1);
        let value = as_value(&replies[0]);
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn batch_line_answers_a_batch() {
        let transport = transport();
        let replies = transport
            .handle_line(
                r#"[{"jsonrpc":"2.0","id":1,"method":"ping"},{"jsonrpc":"2.0","method":"notifications/initialized"},{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo","arguments":{"text":"hi"}}}]"#,
            )
            .await;
        assert_eq!(replies.len(), 1);
        let value = as_value(&replies[0]);
        let batch = value.as_array().unwrap();
        // Notification contributes no response
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0]["id"], 1);
        assert_eq!(batch[1]["result"]["content"][0]["text"], "hi");
    }
}
