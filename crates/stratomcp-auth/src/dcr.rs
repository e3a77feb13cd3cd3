//! Dynamic client registration proxy (RFC 7591).
//!
//! Forwards registration bodies to a configured upstream authorization
//! server, with optional hooks to rewrite the request before forwarding
//! and the response before returning it. The upstream URL is mandatory
//! so a misconfigured discovery document can never point the endpoint at
//! itself.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AuthError, AuthResult};

/// Hook rewriting a registration request or response body in place
pub type DcrHook = Box<dyn Fn(&mut Value) + Send + Sync>;

/// Registration proxy for a single upstream endpoint
pub struct DcrProxy {
    upstream: String,
    http_client: reqwest::Client,
    before_forward: Option<DcrHook>,
    after_forward: Option<DcrHook>,
}

impl std::fmt::Debug for DcrProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DcrProxy")
            .field("upstream", &self.upstream)
            .field("before_forward", &self.before_forward.as_ref().map(|_| "<hook>"))
            .field("after_forward", &self.after_forward.as_ref().map(|_| "<hook>"))
            .finish()
    }
}

impl DcrProxy {
    /// Proxy for an explicit upstream registration endpoint
    pub fn new(upstream: impl Into<String>) -> AuthResult<Self> {
        let upstream = upstream.into();
        if upstream.is_empty() {
            return Err(AuthError::configuration(
                "DCR proxy requires an explicit upstream registration endpoint",
            ));
        }
        url::Url::parse(&upstream)
            .map_err(|e| AuthError::configuration(format!("bad DCR upstream URL: {e}")))?;
        Ok(Self {
            upstream,
            http_client: reqwest::Client::new(),
            before_forward: None,
            after_forward: None,
        })
    }

    /// Rewrite registration requests before they are forwarded
    pub fn with_before_forward(mut self, hook: DcrHook) -> Self {
        self.before_forward = Some(hook);
        self
    }

    /// Rewrite registration responses before they are returned
    pub fn with_after_forward(mut self, hook: DcrHook) -> Self {
        self.after_forward = Some(hook);
        self
    }

    /// Forward a registration body upstream
    pub async fn register(&self, mut body: Value) -> AuthResult<Value> {
        if let Some(hook) = &self.before_forward {
            hook(&mut body);
        }

        debug!(upstream = %self.upstream, "forwarding client registration");
        let response = self
            .http_client
            .post(&self.upstream)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            warn!(upstream = %self.upstream, status = %status, "registration rejected upstream");
            return Err(AuthError::upstream(format!(
                "registration endpoint returned {status}: {detail}"
            )));
        }

        let mut registered: Value = response
            .json()
            .await
            .map_err(|e| AuthError::upstream(format!("bad registration response: {e}")))?;

        if let Some(hook) = &self.after_forward {
            hook(&mut registered);
        }
        Ok(registered)
    }
}
