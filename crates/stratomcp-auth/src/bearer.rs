//! Bearer token extraction and the unified validation entry point.

use crate::config::ValidationStrategy;
use crate::context::AuthContext;
use crate::error::{AuthError, AuthResult};
use crate::introspection::IntrospectionClient;
use crate::validator::JwtValidator;

/// Pull the token out of an `Authorization: Bearer ...` header value
pub fn extract_bearer(header_value: Option<&str>) -> AuthResult<&str> {
    let value = header_value.ok_or(AuthError::MissingToken)?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::invalid_token("authorization scheme must be Bearer"))?
        .trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

/// Validation path selected by configuration
#[derive(Debug, Clone)]
pub enum BearerValidator {
    /// Local JWT verification over JWKS
    Jwt(JwtValidator),
    /// RFC 7662 introspection
    Introspection(IntrospectionClient),
}

impl BearerValidator {
    /// Build the validator the configuration asks for
    pub fn from_strategy(strategy: &ValidationStrategy) -> Self {
        match strategy {
            ValidationStrategy::Jwks {
                jwks_uri,
                issuer,
                audience,
            } => Self::Jwt(JwtValidator::new(
                jwks_uri.clone(),
                issuer.clone(),
                audience.clone(),
            )),
            ValidationStrategy::Introspection { endpoint, auth } => {
                Self::Introspection(IntrospectionClient::new(endpoint.clone(), auth.clone()))
            }
        }
    }

    /// Validate a bearer token and produce its auth context
    pub async fn validate(&self, token: &str) -> AuthResult<AuthContext> {
        match self {
            Self::Jwt(validator) => validator.validate(token).await,
            Self::Introspection(client) => client.validate(token).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_extraction() {
        assert_eq!(extract_bearer(Some("Bearer abc123")).unwrap(), "abc123");
        assert!(matches!(
            extract_bearer(None).unwrap_err(),
            AuthError::MissingToken
        ));
        assert!(matches!(
            extract_bearer(Some("Basic abc")).unwrap_err(),
            AuthError::InvalidToken(_)
        ));
        assert!(matches!(
            extract_bearer(Some("Bearer ")).unwrap_err(),
            AuthError::MissingToken
        ));
    }
}
