//! Authorization error types

/// Result type for authorization operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors surfaced by bearer validation and the OAuth clients
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No `Authorization: Bearer` header was presented
    #[error("Missing bearer token")]
    MissingToken,

    /// The token failed validation (signature, claims, or revocation)
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// An upstream HTTP call failed (JWKS, introspection, refresh, DCR)
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    /// Configuration is unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// State backend failure while binding tokens to sessions
    #[error("State error: {0}")]
    State(#[from] stratomcp_state::StateError),

    /// Payload (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuthError {
    /// Create an invalid-token error
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken(message.into())
    }

    /// Create an upstream error
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}
