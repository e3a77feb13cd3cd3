//! # stratomcp-server
//!
//! The MCP server runtime: a JSON-RPC 2.0 protocol engine behind two
//! transports (HTTP with SSE streaming, and line-delimited stdio), with
//! horizontally-scalable session state, OAuth 2.0 protected-resource
//! authorization, and the protocol feature services (tools, resources,
//! prompts, completion, logging, long-running tasks, elicitation,
//! sampling, roots).
//!
//! ## Example
//!
//! ```no_run
//! use stratomcp_protocol::types::{CallToolResult, Tool};
//! use stratomcp_server::{tool_fn, ServerBuilder, ToolOutput};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = ServerBuilder::new()
//!     .server_info("calc-server", "1.0.0")
//!     .tool(
//!         Tool::new("add").with_description("Add two numbers"),
//!         Some(tool_fn(|args, _ctx| async move {
//!             let sum = args["a"].as_f64().unwrap_or(0.0) + args["b"].as_f64().unwrap_or(0.0);
//!             Ok(ToolOutput::Single(CallToolResult::text(format!("Result: {sum}"))))
//!         })),
//!     )?
//!     .build()
//!     .await?;
//!
//! server.run_http("127.0.0.1:3000").await?;
//! # Ok(())
//! # }
//! ```
//!
//! Scaling out is a configuration change: `.redis("redis://...")`
//! switches the session store, broker and lock to their Redis
//! implementations, and any instance can then serve any session.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod handler;
pub mod http;
pub mod logging;
pub mod registry;
pub mod server;
pub mod sse;
pub mod stdio;
pub mod tasks;
pub mod wire_log;

pub use config::ServerConfig;
pub use context::HandlerContext;
pub use engine::{EngineOutput, ProtocolEngine};
pub use error::{ServerError, ServerResult};
pub use handler::{
    completion_fn, prompt_fn, resource_fn, tool_fn, CompletionProvider, PromptHandler,
    ResourceHandler, ToolHandler, ToolOutput,
};
pub use http::{LAST_EVENT_ID_HEADER, MCP_SESSION_HEADER};
pub use registry::HandlerRegistry;
pub use server::{McpServer, ServerBuilder};
pub use sse::{SseFrame, StreamRegistry};
pub use stdio::StdioTransport;
pub use tasks::TaskService;
pub use wire_log::WireLogger;
