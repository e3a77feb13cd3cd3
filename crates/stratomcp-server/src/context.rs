//! Handler invocation context.
//!
//! The context is explicit — no request-local storage. Whatever a
//! handler needs from the transport (session identity, the caller's auth
//! context, the originating request id) travels in this struct.

use stratomcp_auth::AuthContext;
use stratomcp_protocol::RequestId;

/// Context passed to every tool/resource/prompt invocation
#[derive(Debug, Clone, Default)]
pub struct HandlerContext {
    /// Session the request arrived on, when the transport has one
    pub session_id: Option<String>,
    /// Auth context produced by the bearer pre-handler
    pub auth: Option<AuthContext>,
    /// Id of the originating JSON-RPC request
    pub request_id: Option<RequestId>,
}

impl HandlerContext {
    /// Context with no session and no auth (stdio transport)
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Context bound to a session
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            auth: None,
            request_id: None,
        }
    }

    /// Attach an auth context
    pub fn with_auth(mut self, auth: AuthContext) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Authenticated user id, when present
    pub fn user_id(&self) -> Option<&str> {
        self.auth.as_ref().map(|a| a.user_id.as_str())
    }
}
