//! Server assembly and the host-facing API.
//!
//! [`ServerBuilder`] collects configuration and registrations, then
//! `build()` wires the backends (in-memory, or Redis when configured),
//! the engine, the background sweeps and the broadcast subscription into
//! an [`McpServer`]. Registries are frozen at this point; hosts that
//! need more tools must register them before building.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use stratomcp_auth::{AuthorizationConfig, BearerValidator, DcrProxy, TokenRefreshService};
use stratomcp_protocol::methods;
use stratomcp_protocol::types::{CreateMessageRequest, ElicitRequest, Prompt, Resource, Tool};
use stratomcp_protocol::{JsonRpcNotification, JsonRpcRequest, RequestId};
use stratomcp_state::{
    topics, DistributedLock, MemoryLock, MemoryMessageBroker, MemorySessionStore, MessageBroker,
    RedisLock, RedisMessageBroker, RedisSessionStore, SessionStore,
};

use crate::config::ServerConfig;
use crate::engine::ProtocolEngine;
use crate::error::{ServerError, ServerResult};
use crate::handler::{CompletionProvider, PromptHandler, ResourceHandler, ToolHandler};
use crate::registry::HandlerRegistry;
use crate::sse::{SseFrame, StreamRegistry};
use crate::stdio::StdioTransport;
use crate::tasks::TaskService;
use crate::wire_log::WireLogger;

/// Builder for [`McpServer`]
#[derive(Debug, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    registry: HandlerRegistry,
}

impl ServerBuilder {
    /// Builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the advertised server info
    pub fn server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.config = self.config.with_server_info(name, version);
        self
    }

    /// Set the `initialize` instructions
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config = self.config.with_instructions(instructions);
        self
    }

    /// Declare capabilities
    pub fn capabilities(
        mut self,
        capabilities: stratomcp_protocol::types::ServerCapabilities,
    ) -> Self {
        self.config = self.config.with_capabilities(capabilities);
        self
    }

    /// Enable or disable SSE
    pub fn enable_sse(mut self, enable: bool) -> Self {
        self.config = self.config.with_sse(enable);
        self
    }

    /// Select the Redis backends
    pub fn redis(mut self, url: impl Into<String>) -> Self {
        self.config = self.config.with_redis(url);
        self
    }

    /// Enable the authorization subsystem
    pub fn authorization(mut self, authorization: AuthorizationConfig) -> Self {
        self.config = self.config.with_authorization(authorization);
        self
    }

    /// Register a tool
    pub fn tool(
        mut self,
        definition: Tool,
        handler: Option<Arc<dyn ToolHandler>>,
    ) -> ServerResult<Self> {
        self.registry.register_tool(definition, handler)?;
        Ok(self)
    }

    /// Register a resource
    pub fn resource(
        mut self,
        definition: Resource,
        handler: Option<Arc<dyn ResourceHandler>>,
    ) -> Self {
        self.registry.register_resource(definition, handler);
        self
    }

    /// Register a prompt with an optional argument schema
    pub fn prompt(
        mut self,
        definition: Prompt,
        handler: Option<Arc<dyn PromptHandler>>,
        argument_schema: Option<Value>,
    ) -> ServerResult<Self> {
        self.registry.register_prompt(definition, handler, argument_schema)?;
        Ok(self)
    }

    /// Register a prompt completion provider
    pub fn prompt_completion(
        mut self,
        name: impl Into<String>,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        self.registry.register_prompt_completion(name, provider);
        self
    }

    /// Register a resource completion provider
    pub fn resource_completion(
        mut self,
        uri_pattern: impl Into<String>,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        self.registry.register_resource_completion(uri_pattern, provider);
        self
    }

    /// Wire the backends and freeze the registries
    pub async fn build(self) -> ServerResult<McpServer> {
        let config = Arc::new(self.config);
        let registry = Arc::new(self.registry);

        let (store, broker, lock): (
            Arc<dyn SessionStore>,
            Arc<dyn MessageBroker>,
            Arc<dyn DistributedLock>,
        ) = match &config.redis_url {
            Some(url) => {
                info!(url = %url, "using Redis state backends");
                (
                    Arc::new(
                        RedisSessionStore::connect_with(
                            url,
                            "mcp",
                            config.session_ttl_secs,
                            config.history_limit,
                        )
                        .await?,
                    ),
                    Arc::new(RedisMessageBroker::connect(url).await?),
                    Arc::new(RedisLock::connect(url).await?),
                )
            }
            None => (
                Arc::new(MemorySessionStore::with_limits(
                    config.session_ttl_secs,
                    config.history_limit,
                )),
                Arc::new(MemoryMessageBroker::new()),
                Arc::new(MemoryLock::new()),
            ),
        };

        McpServer::assemble(config, registry, store, broker, lock).await
    }

    /// Wire the server over caller-supplied backends. This is how
    /// multi-instance deployments share one store/broker/lock family,
    /// and how tests stand doubles in for Redis.
    pub async fn build_with_backends(
        self,
        store: Arc<dyn SessionStore>,
        broker: Arc<dyn MessageBroker>,
        lock: Arc<dyn DistributedLock>,
    ) -> ServerResult<McpServer> {
        McpServer::assemble(
            Arc::new(self.config),
            Arc::new(self.registry),
            store,
            broker,
            lock,
        )
        .await
    }
}

struct ServerInner {
    config: Arc<ServerConfig>,
    engine: Arc<ProtocolEngine>,
    store: Arc<dyn SessionStore>,
    broker: Arc<dyn MessageBroker>,
    streams: Arc<StreamRegistry>,
    logger: Arc<WireLogger>,
    tasks: Arc<TaskService>,
    validator: Option<BearerValidator>,
    dcr: Option<Arc<DcrProxy>>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

/// The assembled runtime
#[derive(Clone)]
pub struct McpServer {
    inner: Arc<ServerInner>,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("server", &self.inner.config.server_info.name)
            .finish()
    }
}

impl McpServer {
    /// Assemble a server over explicit backends (tests hand in doubles)
    pub(crate) async fn assemble(
        config: Arc<ServerConfig>,
        registry: Arc<HandlerRegistry>,
        store: Arc<dyn SessionStore>,
        broker: Arc<dyn MessageBroker>,
        lock: Arc<dyn DistributedLock>,
    ) -> ServerResult<Self> {
        let streams = Arc::new(StreamRegistry::new());
        let tasks = Arc::new(TaskService::new(broker.clone()));
        let logger = Arc::new(WireLogger::new(broker.clone()));
        let engine = Arc::new(ProtocolEngine::new(
            registry,
            config.clone(),
            tasks.clone(),
            logger.clone(),
        ));

        let validator = config
            .authorization
            .as_ref()
            .map(|auth| BearerValidator::from_strategy(&auth.strategy));
        let dcr = match config
            .authorization
            .as_ref()
            .and_then(|auth| auth.dcr_upstream.as_deref())
        {
            Some(upstream) => Some(Arc::new(DcrProxy::new(upstream)?)),
            None => None,
        };

        let mut background = Vec::new();

        // Broadcast notifications fan out to every session with local
        // streams, each copy under its own store-allocated event id.
        {
            let store = store.clone();
            let streams = streams.clone();
            broker
                .subscribe(
                    topics::BROADCAST_NOTIFICATION,
                    Arc::new(move |message: Value| {
                        let store = store.clone();
                        let streams = streams.clone();
                        Box::pin(async move {
                            for session_id in streams.session_ids() {
                                match store.add_message_auto_event_id(&session_id, &message).await {
                                    Ok(event_id) => {
                                        streams
                                            .send(&session_id, &SseFrame::event(event_id, &message));
                                    }
                                    Err(e) => {
                                        warn!(session_id = %session_id, error = %e, "broadcast delivery failed");
                                    }
                                }
                            }
                        })
                    }),
                )
                .await?;
        }

        // Periodic sweeps: expired sessions and expired tasks.
        {
            let store = store.clone();
            background.push(tokio::spawn(async move {
                let mut timer = tokio::time::interval(std::time::Duration::from_secs(60));
                loop {
                    timer.tick().await;
                    if let Err(e) = store.cleanup().await {
                        warn!(error = %e, "session cleanup failed");
                    }
                }
            }));
        }
        background.push(tasks.start_cleanup(config.task_cleanup_interval));

        // Background token refresh, guarded by the distributed lock.
        if let Some(auth) = &config.authorization {
            if auth.refresh.enabled {
                let service = Arc::new(TokenRefreshService::new(
                    store.clone(),
                    broker.clone(),
                    lock.clone(),
                    auth.refresh.clone(),
                ));
                background.push(service.start());
            }
        }

        Ok(Self {
            inner: Arc::new(ServerInner {
                config,
                engine,
                store,
                broker,
                streams,
                logger,
                tasks,
                validator,
                dcr,
                background: Mutex::new(background),
            }),
        })
    }

    /// Runtime configuration
    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.inner.config
    }

    /// The protocol engine
    pub fn engine(&self) -> &Arc<ProtocolEngine> {
        &self.inner.engine
    }

    /// The session store
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.inner.store
    }

    /// The message broker
    pub fn broker(&self) -> &Arc<dyn MessageBroker> {
        &self.inner.broker
    }

    /// The local stream registry
    pub fn streams(&self) -> &Arc<StreamRegistry> {
        &self.inner.streams
    }

    /// The bearer validator, when authorization is enabled
    pub fn validator(&self) -> Option<&BearerValidator> {
        self.inner.validator.as_ref()
    }

    /// The DCR proxy, when configured
    pub fn dcr(&self) -> Option<&Arc<DcrProxy>> {
        self.inner.dcr.as_ref()
    }

    /// The task service (create/update tasks from host code)
    pub fn tasks(&self) -> &Arc<TaskService> {
        &self.inner.tasks
    }

    /// The axum router serving the HTTP endpoints
    pub fn router(&self) -> axum::Router {
        crate::http::router(self.clone())
    }

    /// Serve HTTP on `addr` until the listener fails
    pub async fn run_http(&self, addr: &str) -> ServerResult<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr = %addr, "serving MCP over HTTP");
        axum::serve(listener, self.router())
            .await
            .map_err(|e| ServerError::internal(format!("HTTP server failed: {e}")))
    }

    /// Serve the stdio transport until stdin closes
    pub async fn run_stdio(&self) -> ServerResult<()> {
        StdioTransport::new(self.inner.engine.clone()).run().await
    }

    // ------------------------------------------------------------------
    // Host-facing API
    // ------------------------------------------------------------------

    /// Broadcast a notification to every session on every instance
    pub async fn broadcast_notification(
        &self,
        notification: JsonRpcNotification,
    ) -> ServerResult<()> {
        self.inner
            .broker
            .publish(
                topics::BROADCAST_NOTIFICATION,
                &serde_json::to_value(&notification)?,
            )
            .await?;
        Ok(())
    }

    /// Publish a message to one session.
    ///
    /// The publish is global — whichever instance holds the session's
    /// streams delivers it — but the returned boolean reports only
    /// process-local reachability: `false` means this instance has no
    /// live stream for the session (or the session is unknown).
    pub async fn send_to_session(&self, session_id: &str, message: Value) -> ServerResult<bool> {
        if self.inner.store.get(session_id).await?.is_none() {
            return Ok(false);
        }
        self.inner
            .broker
            .publish(&topics::session_message(session_id), &message)
            .await?;
        Ok(self.inner.streams.has_streams(session_id))
    }

    /// Ask the session's client to present an elicitation form
    pub async fn elicit(
        &self,
        session_id: &str,
        message: impl Into<String>,
        schema: Value,
        request_id: Option<RequestId>,
    ) -> ServerResult<bool> {
        let request = ElicitRequest {
            message: message.into(),
            requested_schema: schema,
        };
        self.send_server_request(session_id, methods::ELICITATION_CREATE, &request, request_id)
            .await
    }

    /// Ask the session's client to run a model generation
    pub async fn request_sampling(
        &self,
        session_id: &str,
        request: CreateMessageRequest,
        request_id: Option<RequestId>,
    ) -> ServerResult<bool> {
        self.send_server_request(
            session_id,
            methods::SAMPLING_CREATE_MESSAGE,
            &request,
            request_id,
        )
        .await
    }

    /// Ask the session's client for its filesystem roots
    pub async fn request_roots(&self, session_id: &str) -> ServerResult<bool> {
        self.send_server_request(session_id, methods::ROOTS_LIST, &json!({}), None)
            .await
    }

    async fn send_server_request<T: serde::Serialize>(
        &self,
        session_id: &str,
        method: &str,
        params: &T,
        request_id: Option<RequestId>,
    ) -> ServerResult<bool> {
        let id = request_id.unwrap_or_else(|| RequestId::String(Uuid::new_v4().to_string()));
        let request =
            JsonRpcRequest::new(method, Some(serde_json::to_value(params)?), id);
        self.send_to_session(session_id, serde_json::to_value(&request)?)
            .await
    }

    /// Emit a wire-level log message (RFC 5424 filtered)
    pub async fn log(
        &self,
        level: stratomcp_protocol::types::LogLevel,
        data: Value,
        logger: Option<String>,
    ) -> ServerResult<bool> {
        self.inner.logger.log(level, data, logger).await
    }

    /// Set the wire-level minimum severity
    pub fn set_log_level(&self, level: stratomcp_protocol::types::LogLevel) {
        self.inner.logger.set_level(level);
    }

    /// Current wire-level minimum severity
    pub fn log_level(&self) -> stratomcp_protocol::types::LogLevel {
        self.inner.logger.level()
    }

    // ------------------------------------------------------------------
    // Stream lifecycle (used by the HTTP transport)
    // ------------------------------------------------------------------

    /// Subscribe this instance to a session's topic so published
    /// messages reach its local streams, each under a fresh event id
    pub async fn subscribe_session_topic(&self, session_id: &str) -> ServerResult<()> {
        let store = self.inner.store.clone();
        let streams = self.inner.streams.clone();
        let sid = session_id.to_string();
        self.inner
            .broker
            .subscribe(
                &topics::session_message(session_id),
                Arc::new(move |message: Value| {
                    let store = store.clone();
                    let streams = streams.clone();
                    let sid = sid.clone();
                    Box::pin(async move {
                        match store.add_message_auto_event_id(&sid, &message).await {
                            Ok(event_id) => {
                                streams.send(&sid, &SseFrame::event(event_id, &message));
                            }
                            Err(e) => {
                                warn!(session_id = %sid, error = %e, "session delivery failed");
                            }
                        }
                    })
                }),
            )
            .await?;
        Ok(())
    }

    /// Drop the per-session topic subscription (last stream closed)
    pub async fn unsubscribe_session_topic(&self, session_id: &str) -> ServerResult<()> {
        self.inner
            .broker
            .unsubscribe(&topics::session_message(session_id))
            .await?;
        Ok(())
    }

    /// Orderly shutdown: stop timers, destroy streams, unsubscribe every
    /// topic in parallel, close the broker
    pub async fn shutdown(&self) -> ServerResult<()> {
        for handle in self.inner.background.lock().await.drain(..) {
            handle.abort();
        }

        let session_ids = self.inner.streams.session_ids();
        self.inner.streams.close_all();

        let session_topics: Vec<String> = session_ids
            .iter()
            .map(|id| topics::session_message(id))
            .collect();
        let unsubscribes = session_topics
            .iter()
            .map(|topic| self.inner.broker.unsubscribe(topic));
        let results = futures::future::join_all(unsubscribes).await;
        for result in results {
            if let Err(e) = result {
                warn!(error = %e, "unsubscribe failed during shutdown");
            }
        }
        self.inner
            .broker
            .unsubscribe(topics::BROADCAST_NOTIFICATION)
            .await?;
        self.inner.broker.close().await?;
        info!("server shut down");
        Ok(())
    }
}
