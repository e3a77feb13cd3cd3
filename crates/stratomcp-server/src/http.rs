//! HTTP endpoints and SSE wiring.
//!
//! - `POST /mcp` — one JSON-RPC envelope per request; answers JSON, or
//!   hijacks into SSE when the handler streams and the client accepts
//!   `text/event-stream`. A POST that accepts SSE without naming a
//!   session mints one and advertises it via `Mcp-Session-Id`.
//! - `GET /mcp` — attaches an SSE stream to an existing session, with
//!   `Last-Event-ID` replay and 30-second heartbeats.
//! - `DELETE /mcp` — explicit session teardown.
//! - Well-known endpoints for protected-resource metadata and liveness,
//!   and the optional DCR proxy route.
//!
//! The bearer pre-handler runs on everything except the configured
//! exclusions; failures answer 401 with a `WWW-Authenticate` challenge
//! pointing at the metadata URL, never a JSON-RPC envelope.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::StreamExt;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use stratomcp_auth::{extract_bearer, www_authenticate_challenge, ProtectedResourceMetadata};
use stratomcp_protocol::{
    JsonRpcError, JsonRpcErrorCode, JsonRpcMessage, JsonRpcResponse, RequestId,
};
use stratomcp_state::SessionMetadata;

use crate::context::HandlerContext;
use crate::engine::EngineOutput;
use crate::error::ServerResult;
use crate::server::McpServer;
use crate::sse::SseFrame;

/// Session header carried on both sides
pub const MCP_SESSION_HEADER: &str = "mcp-session-id";

/// Replay trigger header on GET
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Build the router for a server
pub fn router(server: McpServer) -> Router {
    let mut router = Router::new()
        .route(
            "/mcp",
            post(post_mcp).get(get_mcp).delete(delete_mcp),
        )
        .route("/.well-known/mcp-resource-health", get(health));

    if server.config().authorization.is_some() {
        router = router.route(
            "/.well-known/oauth-protected-resource",
            get(protected_resource_metadata),
        );
        if server.dcr().is_some() {
            router = router.route("/oauth/register", post(register_client));
        }
    }

    router
        .layer(middleware::from_fn_with_state(server.clone(), bearer_pre_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

async fn bearer_pre_handler(
    State(server): State<McpServer>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(auth_config) = server.config().authorization.clone() else {
        return next.run(request).await;
    };
    if auth_config.is_excluded(request.uri().path()) {
        return next.run(request).await;
    }
    let Some(validator) = server.validator().cloned() else {
        return next.run(request).await;
    };

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = match extract_bearer(header_value) {
        Ok(token) => token.to_string(),
        Err(e) => {
            debug!(error = %e, "rejecting unauthenticated request");
            return unauthorized(&auth_config.resource);
        }
    };

    match validator.validate(&token).await {
        Ok(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(e) => {
            debug!(error = %e, "bearer validation failed");
            unauthorized(&auth_config.resource)
        }
    }
}

fn unauthorized(resource: &str) -> Response {
    let challenge = www_authenticate_challenge(resource);
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, challenge)],
        Json(json!({"error": "invalid_token"})),
    )
        .into_response()
}

async fn post_mcp(
    State(server): State<McpServer>,
    headers: HeaderMap,
    request: Request,
) -> Response {
    let auth = request.extensions().get::<stratomcp_auth::AuthContext>().cloned();
    let body = match axum::body::to_bytes(request.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => return internal_error(format!("unreadable body: {e}")),
    };
    let text = String::from_utf8_lossy(&body);

    let message = match JsonRpcMessage::parse(&text) {
        Ok(message) => message,
        Err(e) => {
            let envelope = JsonRpcResponse::parse_error(
                JsonRpcError::new(JsonRpcErrorCode::ParseError, format!("parse error: {e}")),
            );
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(envelope)).into_response();
        }
    };

    let wants_sse = accepts_event_stream(&headers) && server.config().enable_sse;

    // Resolve or mint the session.
    let requested_session = session_id_from(&headers, None);
    let mut minted_session = None;
    let session_id = match requested_session {
        Some(id) => match server.store().get(&id).await {
            Ok(Some(_)) => {
                let _ = server.store().touch(&id).await;
                Some(id)
            }
            Ok(None) => {
                return (
                    StatusCode::NOT_FOUND,
                    Json(json!({"error": "session not found"})),
                )
                    .into_response()
            }
            Err(e) => return internal_error(e.to_string()),
        },
        None if wants_sse => {
            let metadata = SessionMetadata::new();
            let id = metadata.id.clone();
            if let Err(e) = server.store().create(metadata).await {
                return internal_error(e.to_string());
            }
            minted_session = Some(id.clone());
            Some(id)
        }
        None => None,
    };

    // Bind the bearer token to the session.
    if let (Some(id), Some(context)) = (&session_id, &auth) {
        if let Err(e) = bind_token(&server, id, context).await {
            warn!(session_id = %id, error = %e, "token binding failed");
        }
    }

    let ctx = HandlerContext {
        session_id: session_id.clone(),
        auth,
        request_id: None,
    };

    let output = server.engine().dispatch(message, ctx).await;
    let mut response = match output {
        EngineOutput::None => StatusCode::NO_CONTENT.into_response(),
        EngineOutput::Response(envelope) => Json(envelope).into_response(),
        EngineOutput::Stream { request_id, stream } => match &session_id {
            Some(id) if wants_sse => streaming_response(&server, id, request_id, stream),
            _ => collapse_stream(request_id, stream).await,
        },
    };

    if let Some(id) = minted_session {
        if let Ok(value) = HeaderValue::from_str(&id) {
            response.headers_mut().insert(MCP_SESSION_HEADER, value);
        }
    }
    response
}

/// Emit every yielded item as its own SSE event, ids allocated through
/// the session store so concurrent writers cannot collide.
fn streaming_response(
    server: &McpServer,
    session_id: &str,
    request_id: RequestId,
    mut stream: futures::stream::BoxStream<'static, ServerResult<stratomcp_protocol::types::CallToolResult>>,
) -> Response {
    let server = server.clone();
    let session_id = session_id.to_string();

    let body = async_stream::stream! {
        while let Some(item) = stream.next().await {
            let (envelope, is_error) = match item {
                Ok(result) => match serde_json::to_value(&result) {
                    Ok(value) => (JsonRpcResponse::success(request_id.clone(), value), false),
                    Err(e) => (
                        JsonRpcResponse::error(
                            request_id.clone(),
                            JsonRpcError::new(JsonRpcErrorCode::InternalError, e.to_string()),
                        ),
                        true,
                    ),
                },
                Err(e) => (
                    JsonRpcResponse::error(
                        request_id.clone(),
                        JsonRpcError::new(JsonRpcErrorCode::InternalError, e.to_string()),
                    ),
                    true,
                ),
            };
            let Ok(payload) = serde_json::to_value(&envelope) else {
                break;
            };
            match server.store().add_message_auto_event_id(&session_id, &payload).await {
                Ok(event_id) => {
                    yield Ok::<Bytes, Infallible>(Bytes::from(
                        SseFrame::event(event_id, &payload).to_wire(),
                    ));
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "event id allocation failed");
                    break;
                }
            }
            if is_error {
                break;
            }
        }
    };

    sse_response(Body::from_stream(body))
}

/// No SSE on the wire: drain the sequence and answer with its final item
async fn collapse_stream(
    request_id: RequestId,
    mut stream: futures::stream::BoxStream<'static, ServerResult<stratomcp_protocol::types::CallToolResult>>,
) -> Response {
    let mut last = None;
    while let Some(item) = stream.next().await {
        match item {
            Ok(result) => last = Some(result),
            Err(e) => {
                let envelope = JsonRpcResponse::error(
                    request_id.clone(),
                    JsonRpcError::new(JsonRpcErrorCode::InternalError, e.to_string()),
                );
                return Json(envelope).into_response();
            }
        }
    }
    let result = last.unwrap_or_else(|| stratomcp_protocol::types::CallToolResult::text(""));
    match serde_json::to_value(&result) {
        Ok(value) => Json(JsonRpcResponse::success(request_id, value)).into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn get_mcp(
    State(server): State<McpServer>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !server.config().enable_sse {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    if !accepts_event_stream(&headers) {
        return StatusCode::NOT_ACCEPTABLE.into_response();
    }
    let Some(session_id) = session_id_from(&headers, Some(&query)) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Mcp-Session-Id required"})),
        )
            .into_response();
    };
    match server.store().get(&session_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "session not found"})),
            )
                .into_response()
        }
        Err(e) => return internal_error(e.to_string()),
    }

    // Replay strictly-greater history before the stream goes live.
    let last_event_id = headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    let replay = match server.store().messages_from(&session_id, last_event_id).await {
        Ok(messages) => messages,
        Err(e) => return internal_error(e.to_string()),
    };

    let first_stream = !server.streams().has_streams(&session_id);
    let mut rx = server.streams().attach(&session_id);
    if first_stream {
        if let Err(e) = server.subscribe_session_topic(&session_id).await {
            warn!(session_id = %session_id, error = %e, "session topic subscription failed");
        }
    }

    let heartbeat = server.config().heartbeat_interval;
    let guard = StreamGuard {
        server: server.clone(),
        session_id: session_id.clone(),
    };

    let body = async_stream::stream! {
        let _guard = guard;
        for message in replay {
            yield Ok::<Bytes, Infallible>(Bytes::from(
                SseFrame::event(message.event_id, &message.message).to_wire(),
            ));
        }
        let mut ticker = tokio::time::interval(heartbeat);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // first tick is immediate
        loop {
            tokio::select! {
                frame = rx.recv() => {
                    match frame {
                        Some(frame) => yield Ok(Bytes::from(frame.to_wire())),
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    yield Ok(Bytes::from(SseFrame::Heartbeat.to_wire()));
                }
            }
        }
    };

    sse_response(Body::from_stream(body))
}

/// Detaches the stream on disconnect; dropping the response body is the
/// only close signal axum gives us.
struct StreamGuard {
    server: McpServer,
    session_id: String,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let server = self.server.clone();
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            if server.streams().prune(&session_id) {
                if let Err(e) = server.unsubscribe_session_topic(&session_id).await {
                    debug!(session_id = %session_id, error = %e, "unsubscribe after close failed");
                }
            }
        });
    }
}

async fn delete_mcp(State(server): State<McpServer>, headers: HeaderMap) -> Response {
    let Some(session_id) = session_id_from(&headers, None) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Mcp-Session-Id required"})),
        )
            .into_response();
    };
    match server.store().delete(&session_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn protected_resource_metadata(State(server): State<McpServer>) -> Response {
    match &server.config().authorization {
        Some(config) => Json(ProtectedResourceMetadata::from_config(config)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn register_client(State(server): State<McpServer>, Json(body): Json<Value>) -> Response {
    let Some(proxy) = server.dcr() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match proxy.register(body).await {
        Ok(registered) => (StatusCode::CREATED, Json(registered)).into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

async fn bind_token(
    server: &McpServer,
    session_id: &str,
    context: &stratomcp_auth::AuthContext,
) -> ServerResult<()> {
    let Some(meta) = server.store().get(session_id).await? else {
        return Ok(());
    };
    let already_bound = meta
        .auth
        .as_ref()
        .is_some_and(|auth| auth.token_hash == context.token_hash);
    if !already_bound {
        server
            .store()
            .update_auth(session_id, context.clone(), meta.refresh)
            .await?;
    }
    Ok(())
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

fn session_id_from(headers: &HeaderMap, query: Option<&HashMap<String, String>>) -> Option<String> {
    if let Some(id) = headers
        .get(MCP_SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| !id.is_empty())
    {
        return Some(id.to_string());
    }
    query.and_then(|q| {
        q.get("sessionId")
            .or_else(|| q.get("mcp-session-id"))
            .filter(|id| !id.is_empty())
            .cloned()
    })
}

fn sse_response(body: Body) -> Response {
    let mut response = Response::new(body);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn internal_error(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": message})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use stratomcp_protocol::types::Tool;

    use crate::handler::{tool_fn, ToolOutput};
    use crate::server::ServerBuilder;

    async fn test_server() -> McpServer {
        ServerBuilder::new()
            .server_info("test-server", "1.0.0")
            .tool(
                Tool::new("streamer"),
                Some(tool_fn(|_args, _ctx| async move {
                    let chunks = futures::stream::iter(vec![
                        Ok(stratomcp_protocol::types::CallToolResult::text("chunk-1")),
                        Ok(stratomcp_protocol::types::CallToolResult::text("chunk-2")),
                        Ok(stratomcp_protocol::types::CallToolResult::text("chunk-3")),
                        Ok(stratomcp_protocol::types::CallToolResult::text("final")),
                    ]);
                    Ok(ToolOutput::Stream(chunks.boxed()))
                })),
            )
            .unwrap()
            .build()
            .await
            .unwrap()
    }

    fn post_request(body: &str, accept_sse: bool, session: Option<&str>) -> Request {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/mcp")
            .header(header::CONTENT_TYPE, "application/json");
        if accept_sse {
            builder = builder.header(header::ACCEPT, "text/event-stream");
        }
        if let Some(id) = session {
            builder = builder.header(MCP_SESSION_HEADER, id);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_is_open() {
        let app = test_server().await.router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/.well-known/mcp-resource-health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("ok"));
    }

    #[tokio::test]
    async fn initialize_round_trip() {
        let app = test_server().await.router();
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26","capabilities":{},"clientInfo":{"name":"c","version":"1"}}}"#;
        let response = app.oneshot(post_request(body, false, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let value: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(value["result"]["serverInfo"]["name"], "test-server");
        assert_eq!(value["result"]["protocolVersion"], "2025-03-26");
    }

    #[tokio::test]
    async fn notification_answers_204() {
        let app = test_server().await.router();
        let body = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let response = app.oneshot(post_request(body, false, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn malformed_body_is_500_with_null_id() {
        let app = test_server().await.router();
        let response = app
            .oneshot(post_request("{not json", false, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let value: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn sse_post_without_session_mints_one() {
        let app = test_server().await.router();
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
        let response = app.oneshot(post_request(body, true, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let session_id = response
            .headers()
            .get(MCP_SESSION_HEADER)
            .expect("session header")
            .to_str()
            .unwrap();
        assert!(uuid::Uuid::parse_str(session_id).is_ok());
    }

    #[tokio::test]
    async fn unknown_session_is_404() {
        let app = test_server().await.router();
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
        let response = app
            .oneshot(post_request(body, false, Some("no-such-session")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn streaming_tool_over_sse_numbers_events_from_the_store() {
        let server = test_server().await;
        let app = server.router();

        // Mint a session first
        let response = app
            .clone()
            .oneshot(post_request(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#, true, None))
            .await
            .unwrap();
        let session_id = response
            .headers()
            .get(MCP_SESSION_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let body = r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"streamer"}}"#;
        let response = app
            .oneshot(post_request(body, true, Some(&session_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );

        let text = body_text(response).await;
        let events: Vec<&str> = text.split("\n\n").filter(|s| !s.is_empty()).collect();
        assert_eq!(events.len(), 4);
        for (index, event) in events.iter().enumerate() {
            let mut lines = event.lines();
            let id_line = lines.next().unwrap();
            assert_eq!(id_line, format!("id: {}", index + 1));
            let data_line = lines.next().unwrap();
            let envelope: Value =
                serde_json::from_str(data_line.strip_prefix("data: ").unwrap()).unwrap();
            assert_eq!(envelope["id"], 3);
            assert!(envelope["result"]["content"][0]["text"].is_string());
        }
        // Last event carries the final value
        assert!(text.contains("final"));

        // Streamed events were persisted for replay
        let history = server.store().messages_from(&session_id, 0).await.unwrap();
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn get_requires_sse_and_a_session() {
        let server = ServerBuilder::new().enable_sse(false).build().await.unwrap();
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/mcp")
                    .header(header::ACCEPT, "text/event-stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let server = test_server().await;
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/mcp")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/mcp")
                    .header(header::ACCEPT, "text/event-stream")
                    .header(MCP_SESSION_HEADER, "missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_tears_the_session_down() {
        let server = test_server().await;
        let app = server.router();

        let response = app
            .clone()
            .oneshot(post_request(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#, true, None))
            .await
            .unwrap();
        let session_id = response
            .headers()
            .get(MCP_SESSION_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/mcp")
                    .header(MCP_SESSION_HEADER, &session_id)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(server.store().get(&session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_bearer_is_401_with_challenge() {
        use stratomcp_auth::{AuthorizationConfig, ValidationStrategy};

        let server = ServerBuilder::new()
            .authorization(AuthorizationConfig::new(
                "https://mcp.example.com",
                ValidationStrategy::Jwks {
                    jwks_uri: "https://auth.example.com/jwks".into(),
                    issuer: None,
                    audience: None,
                },
            ))
            .build()
            .await
            .unwrap();

        let response = server
            .router()
            .oneshot(post_request(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#, false, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(challenge.contains("/.well-known/oauth-protected-resource"));

        // Health stays open
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/.well-known/mcp-resource-health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Metadata endpoint is excluded and serves the document
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/.well-known/oauth-protected-resource")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(value["resource"], "https://mcp.example.com");
    }
}
