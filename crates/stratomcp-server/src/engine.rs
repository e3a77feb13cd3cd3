//! Protocol engine: parses, validates and dispatches JSON-RPC messages.
//!
//! The dispatch table is a match over the method constants. Two error
//! planes are kept strictly apart: engine-level failures (unknown
//! method, schema violations) become JSON-RPC error envelopes, while
//! tool/resource/prompt handler failures are folded into success
//! envelopes carrying an error-shaped result, so a buggy handler looks
//! like a tool that reported a problem rather than a broken server.

use std::sync::Arc;

use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use stratomcp_protocol::methods;
use stratomcp_protocol::types::{
    CallToolRequest, CallToolResult, CompleteRequest, CompleteResult, CompletionReference,
    EmptyResult, GetPromptRequest, GetPromptResult, InitializeRequest, InitializeResult,
    ListPromptsResult, ListResourcesResult, ListTasksResult, ListToolsResult, ReadResourceRequest,
    ReadResourceResult, ResourceContents, SetLevelRequest, TaskRequest,
};
use stratomcp_protocol::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};

use crate::config::ServerConfig;
use crate::context::HandlerContext;
use crate::error::{ServerError, ServerResult};
use crate::handler::ToolOutput;
use crate::registry::{validate_against, HandlerRegistry};
use crate::tasks::TaskService;
use crate::wire_log::WireLogger;

/// What the engine produced for one incoming message
pub enum EngineOutput {
    /// A single response envelope
    Response(JsonRpcResponse),
    /// A streaming tool invocation; the transport emits one event per
    /// item, each wrapped in a success envelope reusing `request_id`
    Stream {
        /// Id of the originating request
        request_id: RequestId,
        /// The lazy result sequence
        stream: BoxStream<'static, ServerResult<CallToolResult>>,
    },
    /// Nothing to send (notifications)
    None,
}

impl std::fmt::Debug for EngineOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Response(r) => f.debug_tuple("Response").field(r).finish(),
            Self::Stream { request_id, .. } => {
                f.debug_struct("Stream").field("request_id", request_id).finish()
            }
            Self::None => write!(f, "None"),
        }
    }
}

/// Method dispatcher shared by every transport
pub struct ProtocolEngine {
    registry: Arc<HandlerRegistry>,
    config: Arc<ServerConfig>,
    tasks: Arc<TaskService>,
    logger: Arc<WireLogger>,
}

impl std::fmt::Debug for ProtocolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("registry", &self.registry)
            .finish()
    }
}

impl ProtocolEngine {
    /// Engine over the frozen registry and shared services
    pub fn new(
        registry: Arc<HandlerRegistry>,
        config: Arc<ServerConfig>,
        tasks: Arc<TaskService>,
        logger: Arc<WireLogger>,
    ) -> Self {
        Self {
            registry,
            config,
            tasks,
            logger,
        }
    }

    /// Dispatch one parsed envelope. Batches are the transport's job;
    /// handing one in here answers INVALID_REQUEST.
    pub async fn dispatch(&self, message: JsonRpcMessage, ctx: HandlerContext) -> EngineOutput {
        match message {
            JsonRpcMessage::Request(request) => self.dispatch_request(request, ctx).await,
            JsonRpcMessage::Notification(notification) => {
                self.dispatch_notification(&notification);
                EngineOutput::None
            }
            JsonRpcMessage::Response(response) => {
                debug!(id = ?response.id, "ignoring client response envelope");
                EngineOutput::None
            }
            JsonRpcMessage::Batch(_) => EngineOutput::Response(JsonRpcResponse::parse_error(
                stratomcp_protocol::JsonRpcError::new(
                    stratomcp_protocol::JsonRpcErrorCode::InvalidRequest,
                    "batch messages are not accepted on this transport",
                ),
            )),
        }
    }

    async fn dispatch_request(&self, request: JsonRpcRequest, ctx: HandlerContext) -> EngineOutput {
        let request_id = request.id.clone();
        let ctx = HandlerContext {
            request_id: Some(request_id.clone()),
            ..ctx
        };
        match self.handle_request(request, ctx).await {
            Ok(output) => output,
            Err(error) => {
                EngineOutput::Response(JsonRpcResponse::error(request_id, error.to_json_rpc()))
            }
        }
    }

    async fn handle_request(
        &self,
        request: JsonRpcRequest,
        ctx: HandlerContext,
    ) -> ServerResult<EngineOutput> {
        let id = request.id.clone();
        match request.method.as_str() {
            methods::INITIALIZE => {
                let params: InitializeRequest = parse_params(request.params)?;
                info!(
                    client = %params.client_info.name,
                    client_version = %params.client_info.version,
                    protocol_version = %params.protocol_version,
                    "client initializing"
                );
                let result = InitializeResult {
                    protocol_version: methods::PROTOCOL_VERSION.to_string(),
                    capabilities: self.config.capabilities.clone(),
                    server_info: self.config.server_info.clone(),
                    instructions: self.config.instructions.clone(),
                };
                respond(id, &result)
            }
            methods::PING => respond(id, &EmptyResult {}),
            methods::TOOLS_LIST => respond(
                id,
                &ListToolsResult {
                    tools: self.registry.list_tools(),
                },
            ),
            methods::TOOLS_CALL => self.call_tool(id, request.params, ctx).await,
            methods::RESOURCES_LIST => respond(
                id,
                &ListResourcesResult {
                    resources: self.registry.list_resources(),
                },
            ),
            methods::RESOURCES_READ => self.read_resource(id, request.params, ctx).await,
            methods::PROMPTS_LIST => respond(
                id,
                &ListPromptsResult {
                    prompts: self.registry.list_prompts(),
                },
            ),
            methods::PROMPTS_GET => self.get_prompt(id, request.params, ctx).await,
            methods::COMPLETION_COMPLETE => self.complete(id, request.params).await,
            methods::LOGGING_SET_LEVEL => {
                let params: SetLevelRequest = parse_params(request.params)?;
                self.logger.set_level(params.level);
                info!(level = %params.level, "log level set");
                respond(id, &EmptyResult {})
            }
            methods::TASKS_GET => {
                self.require_tasks(methods::TASKS_GET)?;
                let params: TaskRequest = parse_params(request.params)?;
                let task = self.tasks.task(&params.task_id, ctx.auth.as_ref())?;
                respond(id, &task)
            }
            methods::TASKS_LIST => {
                self.require_tasks(methods::TASKS_LIST)?;
                let tasks = self.tasks.list_tasks(ctx.auth.as_ref())?;
                respond(id, &ListTasksResult { tasks })
            }
            methods::TASKS_CANCEL => {
                self.require_tasks(methods::TASKS_CANCEL)?;
                let params: TaskRequest = parse_params(request.params)?;
                let task = self.tasks.cancel_task(&params.task_id, ctx.auth.as_ref()).await?;
                respond(id, &task)
            }
            other => Err(ServerError::method_not_found(other)),
        }
    }

    async fn call_tool(
        &self,
        id: RequestId,
        params: Option<Value>,
        ctx: HandlerContext,
    ) -> ServerResult<EngineOutput> {
        let request: CallToolRequest = parse_params(params)?;
        let entry = self
            .registry
            .tool(&request.name)
            .ok_or_else(|| ServerError::invalid_params(format!("Unknown tool: {}", request.name)))?;

        let args = request.arguments.unwrap_or_else(|| json!({}));
        if let Some(validator) = &entry.validator {
            validate_against(validator, &args, "tool arguments")?;
        }

        let Some(handler) = entry.handler.clone() else {
            return respond(
                id,
                &CallToolResult::error(format!("Tool '{}' has no handler", request.name)),
            );
        };

        match handler.call(args, ctx).await {
            Ok(ToolOutput::Single(result)) => respond(id, &result),
            Ok(ToolOutput::Stream(stream)) => Ok(EngineOutput::Stream {
                request_id: id,
                stream,
            }),
            Err(error) => {
                warn!(tool = %request.name, error = %error, "tool handler failed");
                respond(id, &CallToolResult::error(error.to_string()))
            }
        }
    }

    async fn read_resource(
        &self,
        id: RequestId,
        params: Option<Value>,
        ctx: HandlerContext,
    ) -> ServerResult<EngineOutput> {
        let request: ReadResourceRequest = parse_params(params)?;
        let entry = self.registry.resource(&request.uri).ok_or_else(|| {
            ServerError::invalid_params(format!("Unknown resource: {}", request.uri))
        })?;

        let Some(handler) = entry.handler.clone() else {
            return respond(id, &error_contents(&request.uri, "resource has no handler"));
        };

        match handler.read(&request.uri, ctx).await {
            Ok(result) => respond(id, &result),
            Err(error) => {
                warn!(uri = %request.uri, error = %error, "resource handler failed");
                respond(id, &error_contents(&request.uri, &error.to_string()))
            }
        }
    }

    async fn get_prompt(
        &self,
        id: RequestId,
        params: Option<Value>,
        ctx: HandlerContext,
    ) -> ServerResult<EngineOutput> {
        let request: GetPromptRequest = parse_params(params)?;
        let entry = self.registry.prompt(&request.name).ok_or_else(|| {
            ServerError::invalid_params(format!("Unknown prompt: {}", request.name))
        })?;

        if let (Some(validator), Some(args)) = (&entry.validator, &request.arguments) {
            validate_against(validator, args, "prompt arguments")?;
        }

        let Some(handler) = entry.handler.clone() else {
            return respond(
                id,
                &GetPromptResult {
                    description: Some(format!("Error: prompt '{}' has no handler", request.name)),
                    messages: vec![],
                },
            );
        };

        match handler.get(request.arguments, ctx).await {
            Ok(result) => respond(id, &result),
            Err(error) => {
                warn!(prompt = %request.name, error = %error, "prompt handler failed");
                respond(
                    id,
                    &GetPromptResult {
                        description: Some(format!("Error: {error}")),
                        messages: vec![],
                    },
                )
            }
        }
    }

    async fn complete(&self, id: RequestId, params: Option<Value>) -> ServerResult<EngineOutput> {
        let request: CompleteRequest = parse_params(params)?;
        let provider = match &request.reference {
            CompletionReference::Prompt { name } => self.registry.prompt_completion(name),
            CompletionReference::Resource { uri } => self.registry.resource_completion(uri),
        };

        let values = match provider {
            Some(provider) => provider.complete(request.argument).await?,
            None => Vec::new(),
        };
        respond(id, &CompleteResult::from_values(values))
    }

    fn dispatch_notification(&self, notification: &JsonRpcNotification) {
        match notification.method.as_str() {
            methods::NOTIFICATION_INITIALIZED => {
                info!("client initialized");
            }
            methods::NOTIFICATION_CANCELLED => {
                info!(params = ?notification.params, "client cancelled a request");
            }
            other => {
                warn!(method = %other, "ignoring unexpected notification");
            }
        }
    }

    fn require_tasks(&self, method: &str) -> ServerResult<()> {
        if self.config.tasks_enabled() {
            Ok(())
        } else {
            Err(ServerError::method_not_found(method))
        }
    }

    /// The task service (host-facing surface reaches it through here)
    pub fn tasks(&self) -> &Arc<TaskService> {
        &self.tasks
    }

    /// The wire logger
    pub fn logger(&self) -> &Arc<WireLogger> {
        &self.logger
    }
}

fn respond<T: serde::Serialize>(id: RequestId, result: &T) -> ServerResult<EngineOutput> {
    Ok(EngineOutput::Response(JsonRpcResponse::success(
        id,
        serde_json::to_value(result)?,
    )))
}

fn error_contents(uri: &str, message: &str) -> ReadResourceResult {
    ReadResourceResult {
        contents: vec![ResourceContents {
            uri: uri.to_string(),
            mime_type: Some("text/plain".to_string()),
            text: Some(format!("Error: {message}")),
            blob: None,
        }],
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> ServerResult<T> {
    let params = params.unwrap_or_else(|| json!({}));
    serde_json::from_value(params).map_err(|e| {
        ServerError::invalid_params_with_details(
            format!("invalid params: {e}"),
            json!({ "error": e.to_string() }),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    use stratomcp_protocol::types::{ServerCapabilities, Tool};
    use stratomcp_state::MemoryMessageBroker;

    use crate::handler::tool_fn;

    fn engine_with(registry: HandlerRegistry, config: ServerConfig) -> ProtocolEngine {
        let broker = Arc::new(MemoryMessageBroker::new());
        ProtocolEngine::new(
            Arc::new(registry),
            Arc::new(config),
            Arc::new(TaskService::new(broker.clone())),
            Arc::new(WireLogger::new(broker)),
        )
    }

    fn request(id: i64, method: &str, params: Value) -> JsonRpcMessage {
        JsonRpcMessage::Request(JsonRpcRequest::new(
            method,
            Some(params),
            RequestId::Number(id),
        ))
    }

    async fn dispatch_value(engine: &ProtocolEngine, message: JsonRpcMessage) -> Value {
        match engine.dispatch(message, HandlerContext::anonymous()).await {
            EngineOutput::Response(response) => serde_json::to_value(&response).unwrap(),
            other => panic!("expected a response, got {other:?}"),
        }
    }

    fn calculator_registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry
            .register_tool(
                Tool::new("calculator").with_input_schema(json!({
                    "type": "object",
                    "properties": {
                        "operation": {"type": "string"},
                        "a": {"type": "number"},
                        "b": {"type": "number"},
                    },
                    "required": ["operation", "a", "b"],
                })),
                Some(tool_fn(|args, _ctx| async move {
                    let a = args["a"].as_f64().unwrap_or(0.0);
                    let b = args["b"].as_f64().unwrap_or(0.0);
                    let result = match args["operation"].as_str() {
                        Some("add") => a + b,
                        Some("subtract") => a - b,
                        Some("multiply") => a * b,
                        other => {
                            return Err(ServerError::handler(format!(
                                "unknown operation: {other:?}"
                            )))
                        }
                    };
                    Ok(ToolOutput::Single(CallToolResult::text(format!(
                        "Result: {result}"
                    ))))
                })),
            )
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn initialize_advertises_configured_identity() {
        let engine = engine_with(
            HandlerRegistry::new(),
            ServerConfig::new().with_server_info("test-server", "1.0.0"),
        );
        let value = dispatch_value(
            &engine,
            request(
                1,
                methods::INITIALIZE,
                json!({
                    "protocolVersion": "2025-03-26",
                    "capabilities": {},
                    "clientInfo": {"name": "c", "version": "1"},
                }),
            ),
        )
        .await;

        assert_eq!(value["result"]["serverInfo"]["name"], "test-server");
        assert_eq!(value["result"]["protocolVersion"], methods::PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn calculator_add_and_handler_error() {
        let engine = engine_with(calculator_registry(), ServerConfig::default());

        let value = dispatch_value(
            &engine,
            request(
                2,
                methods::TOOLS_CALL,
                json!({"name": "calculator", "arguments": {"operation": "add", "a": 5, "b": 3}}),
            ),
        )
        .await;
        assert_eq!(value["result"]["content"][0]["type"], "text");
        assert_eq!(value["result"]["content"][0]["text"], "Result: 8");
        assert!(value["result"].get("isError").is_none());

        // Handler rejection folds into an isError result, not an error
        // envelope
        let value = dispatch_value(
            &engine,
            request(
                3,
                methods::TOOLS_CALL,
                json!({"name": "calculator", "arguments": {"operation": "invalid", "a": 1, "b": 2}}),
            ),
        )
        .await;
        assert_eq!(value["result"]["isError"], true);
        assert!(value.get("error").is_none());
    }

    #[tokio::test]
    async fn schema_violation_is_an_error_envelope() {
        let engine = engine_with(calculator_registry(), ServerConfig::default());
        let value = dispatch_value(
            &engine,
            request(
                4,
                methods::TOOLS_CALL,
                json!({"name": "calculator", "arguments": {"operation": "add"}}),
            ),
        )
        .await;
        assert_eq!(value["error"]["code"], -32602);
        assert!(value.get("result").is_none());
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let engine = engine_with(HandlerRegistry::new(), ServerConfig::default());
        let value = dispatch_value(&engine, request(5, "no/such/method", json!({}))).await;
        assert_eq!(value["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn tasks_require_the_capability() {
        let engine = engine_with(HandlerRegistry::new(), ServerConfig::default());
        let value =
            dispatch_value(&engine, request(6, methods::TASKS_LIST, json!({}))).await;
        assert_eq!(value["error"]["code"], -32601);

        let engine = engine_with(
            HandlerRegistry::new(),
            ServerConfig::new().with_capabilities(ServerCapabilities::all()),
        );
        let value =
            dispatch_value(&engine, request(7, methods::TASKS_LIST, json!({}))).await;
        assert_eq!(value["result"]["tasks"], json!([]));
    }

    #[tokio::test]
    async fn unknown_log_level_is_invalid_params() {
        let engine = engine_with(HandlerRegistry::new(), ServerConfig::default());
        let value = dispatch_value(
            &engine,
            request(8, methods::LOGGING_SET_LEVEL, json!({"level": "verbose"})),
        )
        .await;
        assert_eq!(value["error"]["code"], -32602);

        let value = dispatch_value(
            &engine,
            request(9, methods::LOGGING_SET_LEVEL, json!({"level": "warning"})),
        )
        .await;
        assert!(value.get("result").is_some());
        assert_eq!(engine.logger().level().to_string(), "warning");
    }

    #[tokio::test]
    async fn streaming_tool_returns_a_stream_output() {
        let mut registry = HandlerRegistry::new();
        registry
            .register_tool(
                Tool::new("chunks"),
                Some(tool_fn(|_args, _ctx| async move {
                    let stream = futures::stream::iter(vec![
                        Ok(CallToolResult::text("one")),
                        Ok(CallToolResult::text("two")),
                        Ok(CallToolResult::text("done")),
                    ]);
                    Ok(ToolOutput::Stream(stream.boxed()))
                })),
            )
            .unwrap();
        let engine = engine_with(registry, ServerConfig::default());

        let output = engine
            .dispatch(
                request(3, methods::TOOLS_CALL, json!({"name": "chunks"})),
                HandlerContext::anonymous(),
            )
            .await;
        match output {
            EngineOutput::Stream { request_id, stream } => {
                assert_eq!(request_id, RequestId::Number(3));
                let items: Vec<_> = stream.collect().await;
                assert_eq!(items.len(), 3);
            }
            other => panic!("expected stream, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn notifications_produce_no_output() {
        let engine = engine_with(HandlerRegistry::new(), ServerConfig::default());
        let output = engine
            .dispatch(
                JsonRpcMessage::Notification(JsonRpcNotification::new(
                    methods::NOTIFICATION_INITIALIZED,
                    None,
                )),
                HandlerContext::anonymous(),
            )
            .await;
        assert!(matches!(output, EngineOutput::None));
    }

    #[tokio::test]
    async fn ping_answers_empty_object() {
        let engine = engine_with(HandlerRegistry::new(), ServerConfig::default());
        let value = dispatch_value(&engine, request(10, methods::PING, json!({}))).await;
        assert_eq!(value["result"], json!({}));
    }
}
