//! Protected-resource metadata (RFC 9728) and the 401 challenge.

use serde::{Deserialize, Serialize};

use crate::config::AuthorizationConfig;

/// `/.well-known/oauth-protected-resource` document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// Canonical URI of this resource server
    pub resource: String,
    /// Authorization servers that issue tokens for it
    pub authorization_servers: Vec<String>,
}

impl ProtectedResourceMetadata {
    /// Build the document from the authorization configuration
    pub fn from_config(config: &AuthorizationConfig) -> Self {
        Self {
            resource: config.resource.clone(),
            authorization_servers: config.authorization_servers.clone(),
        }
    }
}

/// Path of the metadata document
pub const METADATA_PATH: &str = "/.well-known/oauth-protected-resource";

/// `WWW-Authenticate` challenge pointing clients at the metadata URL
pub fn www_authenticate_challenge(resource: &str) -> String {
    format!(
        "Bearer resource_metadata=\"{}{}\"",
        resource.trim_end_matches('/'),
        METADATA_PATH
    )
}
