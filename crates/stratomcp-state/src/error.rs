//! State backend error types

/// Result type for state backend operations
pub type StateResult<T> = Result<T, StateError>;

/// Errors surfaced by the store, broker and lock backends
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StateError {
    /// Session does not exist (or has expired)
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Backend connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Backend command failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Serialization failure for stored payloads
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StateError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

impl From<redis::RedisError> for StateError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
            Self::Connection(err.to_string())
        } else {
            Self::Backend(err.to_string())
        }
    }
}
