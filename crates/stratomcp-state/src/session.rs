//! Session data model.
//!
//! A session is the unit of continuity between a client and the runtime:
//! an opaque UUID carrying an event counter (the source of truth for SSE
//! event IDs), a bounded message history for reconnect replay, and the
//! optional authorization state bound to the bearer token that created
//! it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Default inactivity TTL for sessions (one hour)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

/// Default bound on per-session message history
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// SHA-256 hex digest of an access token; the key of the token→session map
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Authorization state bound to a session.
///
/// Built by the auth subsystem from validated token claims and persisted
/// with the session so any instance can recover it from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    /// Token subject (`sub` claim)
    pub user_id: String,
    /// OAuth client (`client_id` or `azp` claim)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Granted scopes
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Token audience, normalized to a list
    #[serde(default)]
    pub audience: Vec<String>,
    /// Issuing authorization server (`iss` claim)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<String>,
    /// Token type (always `Bearer` for this runtime)
    pub token_type: String,
    /// SHA-256 hex digest of the access token
    pub token_hash: String,
    /// Expiry (Unix seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// Issued-at (Unix seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<u64>,
    /// Refresh token, when the grant supplied one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl AuthState {
    /// Seconds until expiry relative to `now`; `None` when the token
    /// carries no expiry
    pub fn expires_in(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at
            .map(|exp| exp as i64 - now.timestamp())
    }
}

/// Background token-refresh bookkeeping for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRefreshState {
    /// Refresh token to present to the authorization server
    pub refresh_token: String,
    /// Client id the token was issued to
    pub client_id: String,
    /// Authorization server token endpoint base
    pub authorization_server: String,
    /// Scopes of the original grant
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Last successful refresh
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<DateTime<Utc>>,
    /// Consecutive failed attempts; refresh disables past the bound
    #[serde(default)]
    pub attempts: u32,
}

/// Auth sub-session minted during an in-flight OAuth authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthSubSession {
    /// PKCE code verifier
    pub pkce_verifier: String,
    /// Redirect URI of the flow
    pub redirect_uri: String,
}

/// Session metadata persisted in the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Session identifier (UUID)
    pub id: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp; expiry is measured from here
    pub last_activity: DateTime<Utc>,
    /// Monotonic event counter; source of truth for SSE event IDs
    pub event_counter: u64,
    /// Authorization state, when the session is token-bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthState>,
    /// Token-refresh bookkeeping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<TokenRefreshState>,
    /// In-flight OAuth authorization state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth_session: Option<OAuthSubSession>,
}

impl SessionMetadata {
    /// Fresh metadata with a random UUID
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// Fresh metadata with a caller-supplied id
    pub fn with_id(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            last_activity: now,
            event_counter: 0,
            auth: None,
            refresh: None,
            oauth_session: None,
        }
    }

    /// Whether the session has been inactive longer than `ttl_secs`
    pub fn is_expired(&self, now: DateTime<Utc>, ttl_secs: u64) -> bool {
        now.signed_duration_since(self.last_activity)
            .num_seconds()
            .max(0) as u64
            >= ttl_secs
    }
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// One replayable history entry: `(event_id, message)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMessage {
    /// Event id (the counter value at insertion)
    pub event_id: u64,
    /// The JSON-RPC envelope delivered under that id
    pub message: Value,
}
