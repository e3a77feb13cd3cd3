//! Auth context construction from validated token claims.
//!
//! The context is the [`AuthState`] persisted with the session; this
//! module owns the claim-mapping rules: `sub` becomes the user id,
//! `client_id` falls back to `azp`, `scope` is split on spaces (or taken
//! from a `scopes` array), and `aud` is normalized to a list.

use chrono::Utc;
use serde_json::Value;

use stratomcp_state::{hash_token, AuthState};

use crate::error::{AuthError, AuthResult};

/// Authorization context attached to requests and sessions
pub type AuthContext = AuthState;

/// Build an [`AuthContext`] from validated claims and the raw token
pub fn context_from_claims(token: &str, claims: &Value) -> AuthResult<AuthContext> {
    let user_id = claims
        .get("sub")
        .and_then(Value::as_str)
        .ok_or_else(|| AuthError::invalid_token("token has no sub claim"))?
        .to_string();

    let client_id = claims
        .get("client_id")
        .or_else(|| claims.get("azp"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let scopes = extract_scopes(claims);
    let audience = normalize_audience(claims.get("aud"));

    Ok(AuthState {
        user_id,
        client_id,
        scopes,
        audience,
        authorization_server: claims
            .get("iss")
            .and_then(Value::as_str)
            .map(str::to_string),
        token_type: "Bearer".to_string(),
        token_hash: hash_token(token),
        expires_at: claims.get("exp").and_then(Value::as_u64),
        issued_at: claims.get("iat").and_then(Value::as_u64),
        refresh_token: None,
    })
}

fn extract_scopes(claims: &Value) -> Vec<String> {
    if let Some(scope) = claims.get("scope").and_then(Value::as_str) {
        return scope.split(' ').filter(|s| !s.is_empty()).map(str::to_string).collect();
    }
    if let Some(scopes) = claims.get("scopes").and_then(Value::as_array) {
        return scopes
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }
    Vec::new()
}

fn normalize_audience(aud: Option<&Value>) -> Vec<String> {
    match aud {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Whether the context's token has expired as of now
pub fn is_expired(context: &AuthContext) -> bool {
    context
        .expires_at
        .is_some_and(|exp| (exp as i64) <= Utc::now().timestamp())
}
