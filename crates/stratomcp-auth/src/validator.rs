//! JWT validation against a JWKS endpoint.
//!
//! Verifies signature, issuer, audience (when configured), expiry and
//! not-before with 60 seconds of clock-skew leeway. A failed validation
//! triggers one JWKS refresh and retry to absorb key rotations.

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, TokenData, Validation};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::{context_from_claims, AuthContext};
use crate::error::{AuthError, AuthResult};
use crate::jwks::JwksClient;

/// JWT validator backed by a cached JWKS
#[derive(Debug, Clone)]
pub struct JwtValidator {
    jwks_client: Arc<JwksClient>,
    issuer: Option<String>,
    audience: Option<String>,
    leeway_secs: u64,
    allowed_algorithms: Vec<Algorithm>,
}

impl JwtValidator {
    /// Validator for a JWKS endpoint; issuer/audience checks apply only
    /// when configured
    pub fn new(jwks_uri: String, issuer: Option<String>, audience: Option<String>) -> Self {
        Self {
            jwks_client: Arc::new(JwksClient::new(jwks_uri)),
            issuer,
            audience,
            leeway_secs: 60,
            allowed_algorithms: vec![Algorithm::ES256, Algorithm::RS256, Algorithm::PS256],
        }
    }

    /// Use a shared JWKS client (e.g. to share the cache across validators)
    pub fn with_jwks_client(mut self, client: Arc<JwksClient>) -> Self {
        self.jwks_client = client;
        self
    }

    /// Validate a token and build its auth context, refreshing the JWKS
    /// once on failure to absorb key rotations
    pub async fn validate(&self, token: &str) -> AuthResult<AuthContext> {
        match self.validate_once(token).await {
            Ok(context) => Ok(context),
            Err(first_error) => {
                warn!(error = %first_error, "JWT validation failed, refreshing JWKS and retrying");
                self.jwks_client.refresh().await?;
                self.validate_once(token).await
            }
        }
    }

    async fn validate_once(&self, token: &str) -> AuthResult<AuthContext> {
        let header = decode_header(token)
            .map_err(|e| AuthError::invalid_token(format!("invalid JWT format: {e}")))?;

        if !self.allowed_algorithms.contains(&header.alg) {
            return Err(AuthError::invalid_token(format!(
                "algorithm {:?} not allowed",
                header.alg
            )));
        }

        let key_id = header
            .kid
            .clone()
            .ok_or_else(|| AuthError::invalid_token("JWT header has no kid"))?;
        let decoding_key = self.decoding_key(&key_id).await?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.leeway_secs;
        validation.validate_nbf = true;
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        let token_data: TokenData<Value> = decode(token, &decoding_key, &validation)
            .map_err(|e| AuthError::invalid_token(format!("JWT validation failed: {e}")))?;

        debug!(
            subject = token_data.claims.get("sub").and_then(serde_json::Value::as_str),
            algorithm = ?header.alg,
            "JWT validated"
        );

        context_from_claims(token, &token_data.claims)
    }

    async fn decoding_key(&self, key_id: &str) -> AuthResult<DecodingKey> {
        let jwks = self.jwks_client.get_jwks().await?;
        let jwk = jwks
            .find(key_id)
            .ok_or_else(|| AuthError::invalid_token(format!("key id '{key_id}' not in JWKS")))?;
        DecodingKey::from_jwk(jwk)
            .map_err(|e| AuthError::upstream(format!("unusable JWK '{key_id}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_token_is_rejected_early() {
        let validator = JwtValidator::new("https://auth.example.com/jwks".into(), None, None);
        let err = validator.validate_once("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn unsigned_token_is_rejected_without_network() {
        // alg "none" is never in the allowlist, so rejection happens
        // before any JWKS fetch.
        let header = base64_url(br#"{"alg":"none","typ":"JWT"}"#);
        let body = base64_url(br#"{"sub":"u"}"#);
        let token = format!("{header}.{body}.");

        let validator = JwtValidator::new("https://auth.invalid/jwks".into(), None, None);
        let err = validator.validate_once(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    fn base64_url(data: &[u8]) -> String {
        use base64::Engine;
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
    }
}
