//! Server configuration.

use std::time::Duration;

use stratomcp_auth::AuthorizationConfig;
use stratomcp_protocol::types::{Implementation, ServerCapabilities};
use stratomcp_state::session::{DEFAULT_HISTORY_LIMIT, DEFAULT_SESSION_TTL_SECS};

/// Runtime configuration.
///
/// `redis_url` selects the backend family: when set, the session store,
/// broker and lock are Redis-backed and instances scale horizontally;
/// when absent, the in-memory variants serve a single instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Implementation info advertised by `initialize`
    pub server_info: Implementation,
    /// Declared capability families
    pub capabilities: ServerCapabilities,
    /// Free-form instructions returned by `initialize`
    pub instructions: Option<String>,
    /// Serve `GET /mcp` and the streaming code path
    pub enable_sse: bool,
    /// Redis connection URL; `None` selects the in-memory backends
    pub redis_url: Option<String>,
    /// Authorization subsystem; `None` disables the bearer pre-handler
    pub authorization: Option<AuthorizationConfig>,
    /// Session inactivity TTL in seconds
    pub session_ttl_secs: u64,
    /// Per-session history bound
    pub history_limit: usize,
    /// SSE heartbeat interval
    pub heartbeat_interval: Duration,
    /// Expired-task sweep interval
    pub task_cleanup_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_info: Implementation::new("stratomcp", env!("CARGO_PKG_VERSION")),
            capabilities: ServerCapabilities {
                tools: Some(Default::default()),
                resources: Some(Default::default()),
                prompts: Some(Default::default()),
                completions: Some(Default::default()),
                logging: Some(Default::default()),
                tasks: None,
            },
            instructions: None,
            enable_sse: true,
            redis_url: None,
            authorization: None,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            heartbeat_interval: Duration::from_secs(30),
            task_cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the advertised server info
    pub fn with_server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.server_info = Implementation::new(name, version);
        self
    }

    /// Set the declared capabilities
    pub fn with_capabilities(mut self, capabilities: ServerCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the `initialize` instructions text
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Enable or disable SSE
    pub fn with_sse(mut self, enable: bool) -> Self {
        self.enable_sse = enable;
        self
    }

    /// Select the Redis backends
    pub fn with_redis(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    /// Enable the authorization subsystem
    pub fn with_authorization(mut self, authorization: AuthorizationConfig) -> Self {
        self.authorization = Some(authorization);
        self
    }

    /// Set the session inactivity TTL
    pub fn with_session_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.session_ttl_secs = ttl_secs;
        self
    }

    /// Set the per-session history bound
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Whether the tasks method family is served
    pub fn tasks_enabled(&self) -> bool {
        self.capabilities.tasks.is_some()
    }
}
