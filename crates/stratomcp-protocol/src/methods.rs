//! MCP method names and protocol version.
//!
//! Every dispatchable method is a compile-time constant; the engine's
//! dispatch table and the transports match on these strings.

/// Protocol revision advertised in `initialize` responses
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Lifecycle: `initialize`
pub const INITIALIZE: &str = "initialize";
/// Lifecycle: `ping`
pub const PING: &str = "ping";

/// Tools: `tools/list`
pub const TOOLS_LIST: &str = "tools/list";
/// Tools: `tools/call`
pub const TOOLS_CALL: &str = "tools/call";

/// Resources: `resources/list`
pub const RESOURCES_LIST: &str = "resources/list";
/// Resources: `resources/read`
pub const RESOURCES_READ: &str = "resources/read";

/// Prompts: `prompts/list`
pub const PROMPTS_LIST: &str = "prompts/list";
/// Prompts: `prompts/get`
pub const PROMPTS_GET: &str = "prompts/get";

/// Completion: `completion/complete`
pub const COMPLETION_COMPLETE: &str = "completion/complete";

/// Logging: `logging/setLevel`
pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";

/// Tasks: `tasks/get`
pub const TASKS_GET: &str = "tasks/get";
/// Tasks: `tasks/list`
pub const TASKS_LIST: &str = "tasks/list";
/// Tasks: `tasks/cancel`
pub const TASKS_CANCEL: &str = "tasks/cancel";

/// Client lifecycle notification
pub const NOTIFICATION_INITIALIZED: &str = "notifications/initialized";
/// Client cancellation notification
pub const NOTIFICATION_CANCELLED: &str = "notifications/cancelled";
/// Wire-level log message notification
pub const NOTIFICATION_MESSAGE: &str = "notifications/message";
/// Emitted after a successful background token refresh
pub const NOTIFICATION_TOKEN_REFRESHED: &str = "notifications/token_refreshed";
/// Task status change notification
pub const NOTIFICATION_TASK_STATUS: &str = "notifications/tasks/status";

/// Server-initiated: `elicitation/create`
pub const ELICITATION_CREATE: &str = "elicitation/create";
/// Server-initiated: `sampling/createMessage`
pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";
/// Server-initiated: `roots/list`
pub const ROOTS_LIST: &str = "roots/list";

/// Prefix shared by every notification method
pub const NOTIFICATION_PREFIX: &str = "notifications/";
