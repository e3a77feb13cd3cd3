//! Handler traits and the tool output union.
//!
//! Hosts implement these traits (or hand in closures through the
//! adapters) to give tools, resources and prompts their behavior. A tool
//! may answer with a single result or with a lazy stream of partial
//! results; the transport branches on [`ToolOutput`] — a stream becomes
//! one SSE event per item, anything else stays a plain JSON response.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::Future;
use serde_json::Value;

use stratomcp_protocol::types::{
    CallToolResult, CompletionArgument, GetPromptResult, ReadResourceResult,
};

use crate::context::HandlerContext;
use crate::error::ServerResult;

/// What a tool invocation produced
pub enum ToolOutput {
    /// One result, returned as a plain response
    Single(CallToolResult),
    /// A lazy sequence of partial results; the final element is the
    /// tool's return value. An `Err` item ends the stream with a single
    /// error envelope.
    Stream(BoxStream<'static, ServerResult<CallToolResult>>),
}

impl std::fmt::Debug for ToolOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(result) => f.debug_tuple("Single").field(result).finish(),
            Self::Stream(_) => f.debug_tuple("Stream").field(&"<lazy>").finish(),
        }
    }
}

impl From<CallToolResult> for ToolOutput {
    fn from(result: CallToolResult) -> Self {
        Self::Single(result)
    }
}

/// Tool behavior
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Invoke the tool with its (already validated) arguments
    async fn call(&self, args: Value, ctx: HandlerContext) -> ServerResult<ToolOutput>;
}

/// Resource behavior
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Read the resource at `uri`
    async fn read(&self, uri: &str, ctx: HandlerContext) -> ServerResult<ReadResourceResult>;
}

/// Prompt behavior
#[async_trait]
pub trait PromptHandler: Send + Sync {
    /// Render the prompt with its template arguments
    async fn get(&self, args: Option<Value>, ctx: HandlerContext)
        -> ServerResult<GetPromptResult>;
}

/// Completion provider for one prompt name or resource URI pattern
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Candidate values for the argument; the engine applies the cap
    async fn complete(&self, argument: CompletionArgument) -> ServerResult<Vec<String>>;
}

// Closure adapters. `tool_fn(|args, ctx| async { .. })` and friends keep
// simple hosts free of trait impl boilerplate.

type BoxedFuture<T> = Pin<Box<dyn Future<Output = ServerResult<T>> + Send>>;

struct FnToolHandler<F>(F);

#[async_trait]
impl<F> ToolHandler for FnToolHandler<F>
where
    F: Fn(Value, HandlerContext) -> BoxedFuture<ToolOutput> + Send + Sync,
{
    async fn call(&self, args: Value, ctx: HandlerContext) -> ServerResult<ToolOutput> {
        (self.0)(args, ctx).await
    }
}

/// Wrap a closure as a [`ToolHandler`]
pub fn tool_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Value, HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ServerResult<ToolOutput>> + Send + 'static,
{
    Arc::new(FnToolHandler(move |args, ctx| {
        Box::pin(f(args, ctx)) as BoxedFuture<ToolOutput>
    }))
}

struct FnResourceHandler<F>(F);

#[async_trait]
impl<F> ResourceHandler for FnResourceHandler<F>
where
    F: Fn(String, HandlerContext) -> BoxedFuture<ReadResourceResult> + Send + Sync,
{
    async fn read(&self, uri: &str, ctx: HandlerContext) -> ServerResult<ReadResourceResult> {
        (self.0)(uri.to_string(), ctx).await
    }
}

/// Wrap a closure as a [`ResourceHandler`]
pub fn resource_fn<F, Fut>(f: F) -> Arc<dyn ResourceHandler>
where
    F: Fn(String, HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ServerResult<ReadResourceResult>> + Send + 'static,
{
    Arc::new(FnResourceHandler(move |uri, ctx| {
        Box::pin(f(uri, ctx)) as BoxedFuture<ReadResourceResult>
    }))
}

struct FnPromptHandler<F>(F);

#[async_trait]
impl<F> PromptHandler for FnPromptHandler<F>
where
    F: Fn(Option<Value>, HandlerContext) -> BoxedFuture<GetPromptResult> + Send + Sync,
{
    async fn get(
        &self,
        args: Option<Value>,
        ctx: HandlerContext,
    ) -> ServerResult<GetPromptResult> {
        (self.0)(args, ctx).await
    }
}

/// Wrap a closure as a [`PromptHandler`]
pub fn prompt_fn<F, Fut>(f: F) -> Arc<dyn PromptHandler>
where
    F: Fn(Option<Value>, HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ServerResult<GetPromptResult>> + Send + 'static,
{
    Arc::new(FnPromptHandler(move |args, ctx| {
        Box::pin(f(args, ctx)) as BoxedFuture<GetPromptResult>
    }))
}

struct FnCompletionProvider<F>(F);

#[async_trait]
impl<F> CompletionProvider for FnCompletionProvider<F>
where
    F: Fn(CompletionArgument) -> BoxedFuture<Vec<String>> + Send + Sync,
{
    async fn complete(&self, argument: CompletionArgument) -> ServerResult<Vec<String>> {
        (self.0)(argument).await
    }
}

/// Wrap a closure as a [`CompletionProvider`]
pub fn completion_fn<F, Fut>(f: F) -> Arc<dyn CompletionProvider>
where
    F: Fn(CompletionArgument) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ServerResult<Vec<String>>> + Send + 'static,
{
    Arc::new(FnCompletionProvider(move |argument| {
        Box::pin(f(argument)) as BoxedFuture<Vec<String>>
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closure_tool_roundtrip() {
        let handler = tool_fn(|args, _ctx| async move {
            let name = args["name"].as_str().unwrap_or("world").to_string();
            Ok(ToolOutput::Single(CallToolResult::text(format!(
                "hello {name}"
            ))))
        });

        let output = handler
            .call(serde_json::json!({"name": "mcp"}), HandlerContext::anonymous())
            .await
            .unwrap();
        match output {
            ToolOutput::Single(result) => {
                assert_eq!(
                    serde_json::to_value(&result.content[0]).unwrap()["text"],
                    "hello mcp"
                );
            }
            ToolOutput::Stream(_) => panic!("expected single result"),
        }
    }

    #[tokio::test]
    async fn closure_completion_roundtrip() {
        let provider = completion_fn(|argument| async move {
            Ok(vec![format!("{}-1", argument.value), format!("{}-2", argument.value)])
        });
        let values = provider
            .complete(CompletionArgument {
                name: "lang".into(),
                value: "py".into(),
            })
            .await
            .unwrap();
        assert_eq!(values, vec!["py-1", "py-2"]);
    }
}
