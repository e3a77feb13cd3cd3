//! MCP wire types.
//!
//! Typed payloads for the method families the runtime serves: lifecycle,
//! tools, resources, prompts, completion, logging, tasks, and the
//! server-initiated request families (elicitation, sampling, roots).
//! Field names follow the MCP wire casing via serde renames.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Lifecycle
// ============================================================================

/// Implementation info advertised by either side of the connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Programmatic name
    pub name: String,
    /// Version string
    pub version: String,
    /// Display title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Implementation {
    /// Create implementation info from name and version
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            title: None,
        }
    }
}

/// Capability marker with no configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {}

/// Capability families the server declares at `initialize`.
///
/// A family that is `None` is not served; in particular the `tasks/*`
/// methods answer METHOD_NOT_FOUND unless `tasks` is declared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tools family
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Capability>,
    /// Resources family
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Capability>,
    /// Prompts family
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Capability>,
    /// Completion family
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<Capability>,
    /// Logging family
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<Capability>,
    /// Long-running tasks family
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Capability>,
}

impl ServerCapabilities {
    /// Capabilities with every family enabled
    pub fn all() -> Self {
        Self {
            tools: Some(Capability {}),
            resources: Some(Capability {}),
            prompts: Some(Capability {}),
            completions: Some(Capability {}),
            logging: Some(Capability {}),
            tasks: Some(Capability {}),
        }
    }
}

/// `initialize` request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeRequest {
    /// Protocol revision the client speaks
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Client capability declaration (opaque to the server)
    #[serde(default)]
    pub capabilities: Value,
    /// Client implementation info
    #[serde(rename = "clientInfo")]
    pub client_info: Implementation,
}

/// `initialize` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Protocol revision the server speaks
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Declared server capabilities
    pub capabilities: ServerCapabilities,
    /// Server implementation info
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,
    /// Free-form usage instructions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Empty result (e.g. `ping`, `logging/setLevel`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyResult {}

// ============================================================================
// Content
// ============================================================================

/// Content block carried in tool results and prompt messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    /// Text content
    Text {
        /// The text payload
        text: String,
    },
    /// Base64-encoded image content
    Image {
        /// Base64 image data
        data: String,
        /// Image MIME type
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl ContentBlock {
    /// Text content block
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

// ============================================================================
// Tools
// ============================================================================

/// Tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name (programmatic identifier)
    pub name: String,
    /// Display title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool arguments; absent entries skip validation
    #[serde(rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

impl Tool {
    /// Minimal tool definition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            input_schema: None,
        }
    }

    /// Set the human-readable description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the JSON Schema validated against call arguments
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

/// `tools/list` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// Registered tools
    pub tools: Vec<Tool>,
}

/// `tools/call` request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolRequest {
    /// Tool name
    pub name: String,
    /// Tool arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// `tools/call` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Result content
    pub content: Vec<ContentBlock>,
    /// Set when the handler failed; the envelope is still a success
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    /// Successful text result
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: None,
        }
    }

    /// Handler-error result (`isError: true` with a human-readable message)
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(message)],
            is_error: Some(true),
        }
    }
}

// ============================================================================
// Resources
// ============================================================================

/// Resource definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Resource URI (may be a URI template pattern)
    pub uri: String,
    /// Programmatic name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource contents
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Resource {
    /// Minimal resource definition
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: None,
            description: None,
            mime_type: None,
        }
    }
}

/// `resources/list` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResourcesResult {
    /// Registered resources
    pub resources: Vec<Resource>,
}

/// `resources/read` request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceRequest {
    /// Resource URI
    pub uri: String,
}

/// One contents entry of a `resources/read` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceContents {
    /// Resource URI
    pub uri: String,
    /// MIME type
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Text contents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64 binary contents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

/// `resources/read` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceResult {
    /// Resource contents
    pub contents: Vec<ResourceContents>,
}

impl ReadResourceResult {
    /// Text contents for a URI
    pub fn text(uri: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            contents: vec![ResourceContents {
                uri: uri.into(),
                mime_type: Some("text/plain".to_string()),
                text: Some(text.into()),
                blob: None,
            }],
        }
    }
}

// ============================================================================
// Prompts
// ============================================================================

/// Prompt argument declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name
    pub name: String,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the argument must be supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

/// Prompt definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    /// Prompt name (programmatic identifier)
    pub name: String,
    /// Display title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared template arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<PromptArgument>>,
}

impl Prompt {
    /// Minimal prompt definition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            arguments: None,
        }
    }
}

/// `prompts/list` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPromptsResult {
    /// Registered prompts
    pub prompts: Vec<Prompt>,
}

/// `prompts/get` request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptRequest {
    /// Prompt name
    pub name: String,
    /// Template arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message
    User,
    /// Assistant message
    Assistant,
}

/// One message of a rendered prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Message role
    pub role: Role,
    /// Message content
    pub content: ContentBlock,
}

/// `prompts/get` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptResult {
    /// Prompt description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Rendered messages
    pub messages: Vec<PromptMessage>,
}

// ============================================================================
// Completion
// ============================================================================

/// Maximum values a completion response may carry
pub const COMPLETION_MAX_VALUES: usize = 100;

/// Reference naming the completion target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompletionReference {
    /// Prompt-argument completion, keyed by prompt name
    #[serde(rename = "ref/prompt")]
    Prompt {
        /// Prompt name
        name: String,
    },
    /// Resource-URI completion, keyed by URI pattern
    #[serde(rename = "ref/resource")]
    Resource {
        /// Resource URI pattern
        uri: String,
    },
}

/// Argument being completed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionArgument {
    /// Argument name
    pub name: String,
    /// Current (partial) value
    pub value: String,
}

/// `completion/complete` request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRequest {
    /// Completion target
    #[serde(rename = "ref")]
    pub reference: CompletionReference,
    /// Argument under completion
    pub argument: CompletionArgument,
}

/// Completion values, capped at [`COMPLETION_MAX_VALUES`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Candidate values (at most 100)
    pub values: Vec<String>,
    /// Total candidates the provider produced, including truncated ones
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    /// Whether values were truncated to the cap
    #[serde(rename = "hasMore", skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

/// `completion/complete` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteResult {
    /// The completion payload
    pub completion: Completion,
}

impl CompleteResult {
    /// Build a result from raw provider output, applying the value cap
    pub fn from_values(values: Vec<String>) -> Self {
        let total = values.len();
        let has_more = total > COMPLETION_MAX_VALUES;
        let mut values = values;
        values.truncate(COMPLETION_MAX_VALUES);
        Self {
            completion: Completion {
                values,
                total: Some(total),
                has_more: Some(has_more),
            },
        }
    }
}

// ============================================================================
// Logging
// ============================================================================

/// RFC 5424 log severity, ordered `debug < info < ... < emergency`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug-level messages
    Debug,
    /// Informational messages
    Info,
    /// Normal but significant condition
    Notice,
    /// Warning conditions
    Warning,
    /// Error conditions
    Error,
    /// Critical conditions
    Critical,
    /// Action must be taken immediately
    Alert,
    /// System is unusable
    Emergency,
}

impl LogLevel {
    /// Numeric severity (0 = debug .. 7 = emergency)
    pub fn severity(self) -> u8 {
        self as u8
    }

    /// Lowercase wire name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Alert => "alert",
            Self::Emergency => "emergency",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "notice" => Ok(Self::Notice),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            "alert" => Ok(Self::Alert),
            "emergency" => Ok(Self::Emergency),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// `logging/setLevel` request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLevelRequest {
    /// Minimum severity to emit
    pub level: LogLevel,
}

/// Parameters of a `notifications/message` log notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingMessageParams {
    /// Message severity
    pub level: LogLevel,
    /// Arbitrary payload
    pub data: Value,
    /// Optional logger name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
}

// ============================================================================
// Tasks
// ============================================================================

/// Task lifecycle status; `working` is the only non-terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// In progress
    Working,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Cancelled before completion
    Cancelled,
}

impl TaskStatus {
    /// Whether the status is final
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Working)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Working => "working",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Externally visible task state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier (UUID)
    #[serde(rename = "taskId")]
    pub task_id: String,
    /// Current status
    pub status: TaskStatus,
    /// Optional status message
    #[serde(rename = "statusMessage", skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// Creation timestamp (RFC 3339)
    #[serde(rename = "createdAt")]
    pub created_at: String,
    /// Retention window in milliseconds
    pub ttl: u64,
    /// Suggested client poll interval in milliseconds
    #[serde(rename = "pollInterval")]
    pub poll_interval: u64,
}

/// `tasks/get` and `tasks/cancel` request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Task identifier
    #[serde(rename = "taskId")]
    pub task_id: String,
}

/// `tasks/list` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTasksResult {
    /// Tasks visible to the caller
    pub tasks: Vec<Task>,
}

// ============================================================================
// Server-initiated requests
// ============================================================================

/// `elicitation/create` request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitRequest {
    /// Message shown to the user
    pub message: String,
    /// JSON Schema describing the requested input
    #[serde(rename = "requestedSchema")]
    pub requested_schema: Value,
}

/// One message of a sampling conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingMessage {
    /// Message role
    pub role: Role,
    /// Message content
    pub content: ContentBlock,
}

/// `sampling/createMessage` request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessageRequest {
    /// Conversation messages
    pub messages: Vec<SamplingMessage>,
    /// System prompt
    #[serde(rename = "systemPrompt", skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Token budget for the generation
    #[serde(rename = "maxTokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// A filesystem root exposed by the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    /// Root URI (typically `file://...`)
    pub uri: String,
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
