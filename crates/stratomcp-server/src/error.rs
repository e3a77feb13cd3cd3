//! Server error types and their JSON-RPC mapping.
//!
//! Engine-level failures (unknown method, bad params) become JSON-RPC
//! error envelopes; handler failures never reach this type on the wire —
//! the engine folds them into `isError` results instead.

use serde_json::Value;

use stratomcp_protocol::{JsonRpcError, JsonRpcErrorCode};

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Server error types
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServerError {
    /// Method is not in the dispatch table (or its capability is off)
    #[error("Method not found: {method}")]
    MethodNotFound {
        /// The unknown method
        method: String,
    },

    /// Request params failed validation
    #[error("Invalid params: {message}")]
    InvalidParams {
        /// Human-readable failure
        message: String,
        /// Structured validation details
        details: Option<Value>,
    },

    /// Handler execution failure (folded into `isError` results)
    #[error("Handler error: {0}")]
    Handler(String),

    /// Task lookup failed or access was denied; always the same message
    /// so task ids cannot be probed
    #[error("Task not found")]
    TaskNotFound,

    /// Illegal task state transition
    #[error("Task state error: {0}")]
    TaskState(String),

    /// State backend failure
    #[error("State error: {0}")]
    State(#[from] stratomcp_state::StateError),

    /// Authorization failure
    #[error("Auth error: {0}")]
    Auth(#[from] stratomcp_auth::AuthError),

    /// Configuration is unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a method-not-found error
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Create an invalid-params error
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
            details: None,
        }
    }

    /// Create an invalid-params error with structured details
    pub fn invalid_params_with_details(message: impl Into<String>, details: Value) -> Self {
        Self::InvalidParams {
            message: message.into(),
            details: Some(details),
        }
    }

    /// Create a handler error
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The wire error object for this failure
    pub fn to_json_rpc(&self) -> JsonRpcError {
        match self {
            Self::MethodNotFound { method } => JsonRpcError::new(
                JsonRpcErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ),
            Self::InvalidParams { message, details } => {
                let error = JsonRpcError::new(JsonRpcErrorCode::InvalidParams, message.clone());
                match details {
                    Some(details) => error.with_data(details.clone()),
                    None => error,
                }
            }
            Self::TaskNotFound => {
                JsonRpcError::new(JsonRpcErrorCode::InvalidParams, "Task not found")
            }
            Self::TaskState(message) => {
                JsonRpcError::new(JsonRpcErrorCode::InvalidParams, message.clone())
            }
            other => JsonRpcError::new(JsonRpcErrorCode::InternalError, other.to_string()),
        }
    }
}
