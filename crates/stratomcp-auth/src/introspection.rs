//! OAuth 2.0 token introspection (RFC 7662).
//!
//! Complements local JWT validation with real-time revocation checking
//! and opaque-token support: the token is POSTed to the authorization
//! server's introspection endpoint and accepted only when the response
//! carries `active: true`.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::config::IntrospectionAuth;
use crate::context::{context_from_claims, AuthContext};
use crate::error::{AuthError, AuthResult};

/// Introspection response per RFC 7662 Section 2.2
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntrospectionResponse {
    /// Whether the token is currently active (REQUIRED)
    pub active: bool,

    /// Scope(s) associated with the token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Client identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Token type (Bearer, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Expiration timestamp (seconds since epoch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,

    /// Issued at timestamp (seconds since epoch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,

    /// Subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Audience
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Value>,

    /// Issuer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Additional fields
    #[serde(flatten)]
    pub additional: HashMap<String, Value>,
}

/// RFC 7662 introspection client
#[derive(Clone)]
pub struct IntrospectionClient {
    endpoint: String,
    auth: IntrospectionAuth,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for IntrospectionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntrospectionClient")
            .field("endpoint", &self.endpoint)
            .field("auth", &self.auth)
            .finish()
    }
}

impl IntrospectionClient {
    /// Client for an introspection endpoint with the given client auth
    pub fn new(endpoint: String, auth: IntrospectionAuth) -> Self {
        Self {
            endpoint,
            auth,
            http_client: reqwest::Client::new(),
        }
    }

    /// Introspect a token; error unless the server answers `active: true`
    pub async fn validate(&self, token: &str) -> AuthResult<AuthContext> {
        let response = self.introspect(token).await?;
        if !response.active {
            return Err(AuthError::invalid_token("token is not active"));
        }

        // RFC 7662 claims share names with JWT claims, so the same
        // context mapping applies.
        let claims = serde_json::to_value(&response)?;
        context_from_claims(token, &claims)
    }

    /// Raw introspection call
    pub async fn introspect(&self, token: &str) -> AuthResult<IntrospectionResponse> {
        let form = [("token", token), ("token_type_hint", "access_token")];

        let mut request = self.http_client.post(&self.endpoint).form(&form);
        request = match &self.auth {
            IntrospectionAuth::None => request,
            IntrospectionAuth::Bearer(bearer) => request.bearer_auth(bearer),
            IntrospectionAuth::Basic {
                client_id,
                client_secret,
            } => {
                let credentials = base64::engine::general_purpose::STANDARD
                    .encode(format!("{client_id}:{client_secret}"));
                request.header("Authorization", format!("Basic {credentials}"))
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::upstream(format!("introspection request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::upstream(format!(
                "introspection endpoint returned {status}: {body}"
            )));
        }

        let introspection = response
            .json::<IntrospectionResponse>()
            .await
            .map_err(|e| AuthError::upstream(format!("bad introspection response: {e}")))?;

        debug!(active = introspection.active, "introspection completed");
        Ok(introspection)
    }
}
