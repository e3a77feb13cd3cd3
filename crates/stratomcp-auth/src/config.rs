//! Authorization configuration.

use std::time::Duration;

/// How the introspection client authenticates to the endpoint
#[derive(Clone)]
pub enum IntrospectionAuth {
    /// No client authentication
    None,
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// HTTP basic authentication
    Basic {
        /// Client id
        client_id: String,
        /// Client secret
        client_secret: String,
    },
}

impl std::fmt::Debug for IntrospectionAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bearer(_) => write!(f, "Bearer([REDACTED])"),
            Self::Basic { client_id, .. } => f
                .debug_struct("Basic")
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Which validation path incoming bearer tokens take
#[derive(Debug, Clone)]
pub enum ValidationStrategy {
    /// Verify JWTs locally against the issuer's JWKS
    Jwks {
        /// JWKS endpoint URL
        jwks_uri: String,
        /// Expected `iss` claim; unchecked when absent
        issuer: Option<String>,
        /// Expected `aud` claim; audience validation is off when absent
        audience: Option<String>,
    },
    /// Ask the authorization server via RFC 7662 introspection
    Introspection {
        /// Introspection endpoint URL
        endpoint: String,
        /// Client authentication for the endpoint
        auth: IntrospectionAuth,
    },
}

/// Background token refresh tuning
#[derive(Debug, Clone)]
pub struct TokenRefreshConfig {
    /// Whether the refresh service runs at all
    pub enabled: bool,
    /// Sweep interval
    pub interval: Duration,
    /// Refresh tokens expiring within this window
    pub expiry_buffer: Duration,
    /// Per-session distributed lock TTL
    pub lock_ttl: Duration,
    /// Failed attempts after which a session's refresh is disabled
    pub max_attempts: u32,
}

impl Default for TokenRefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            expiry_buffer: Duration::from_secs(300),
            lock_ttl: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

/// Authorization subsystem configuration
#[derive(Debug, Clone)]
pub struct AuthorizationConfig {
    /// Canonical URI of this protected resource
    pub resource: String,
    /// Authorization servers advertised in the metadata document
    pub authorization_servers: Vec<String>,
    /// Bearer validation path
    pub strategy: ValidationStrategy,
    /// Request paths excluded from the bearer pre-handler
    pub excluded_paths: Vec<String>,
    /// Background token refresh tuning
    pub refresh: TokenRefreshConfig,
    /// Upstream endpoint of the dynamic-client-registration proxy;
    /// the proxy route is served only when this is set
    pub dcr_upstream: Option<String>,
}

impl AuthorizationConfig {
    /// Configuration with the standard exclusions (well-known + health)
    pub fn new(resource: impl Into<String>, strategy: ValidationStrategy) -> Self {
        Self {
            resource: resource.into(),
            authorization_servers: Vec::new(),
            strategy,
            excluded_paths: vec![
                "/.well-known/oauth-protected-resource".to_string(),
                "/.well-known/mcp-resource-health".to_string(),
                // Clients register before they hold any token
                "/oauth/register".to_string(),
            ],
            refresh: TokenRefreshConfig::default(),
            dcr_upstream: None,
        }
    }

    /// Add an advertised authorization server
    pub fn with_authorization_server(mut self, server: impl Into<String>) -> Self {
        self.authorization_servers.push(server.into());
        self
    }

    /// Whether `path` bypasses the bearer pre-handler
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths.iter().any(|p| p == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_exclusions_cover_well_known_and_health() {
        let config = AuthorizationConfig::new(
            "https://mcp.example.com",
            ValidationStrategy::Jwks {
                jwks_uri: "https://auth.example.com/jwks".into(),
                issuer: None,
                audience: None,
            },
        );
        assert!(config.is_excluded("/.well-known/oauth-protected-resource"));
        assert!(config.is_excluded("/.well-known/mcp-resource-health"));
        assert!(!config.is_excluded("/mcp"));
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let auth = IntrospectionAuth::Basic {
            client_id: "app".into(),
            client_secret: "hunter2".into(),
        };
        let rendered = format!("{auth:?}");
        assert!(rendered.contains("app"));
        assert!(!rendered.contains("hunter2"));
    }
}
