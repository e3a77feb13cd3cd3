//! Background token refresh.
//!
//! A periodic sweep walks every live session whose auth context expires
//! within the configured buffer and refreshes its access token with the
//! refresh-token grant. The per-session distributed lock guarantees at
//! most one instance refreshes a given session per cycle; losing the
//! lock is silent and the session is retried next sweep. Failures count
//! against a bounded attempt counter, after which the session's refresh
//! stays disabled until it is reauthorized.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use stratomcp_protocol::methods::NOTIFICATION_TOKEN_REFRESHED;
use stratomcp_protocol::JsonRpcNotification;
use stratomcp_state::{
    hash_token, topics, AuthState, DistributedLock, MessageBroker, SessionStore,
    TokenRefreshState,
};

use crate::config::TokenRefreshConfig;
use crate::error::{AuthError, AuthResult};

/// Token endpoint response for the refresh-token grant
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    scope: Option<String>,
}

/// Singleton service refreshing expiring session tokens
pub struct TokenRefreshService {
    store: Arc<dyn SessionStore>,
    broker: Arc<dyn MessageBroker>,
    lock: Arc<dyn DistributedLock>,
    http_client: reqwest::Client,
    config: TokenRefreshConfig,
    /// Lock owner identity of this instance
    instance_id: String,
}

impl std::fmt::Debug for TokenRefreshService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefreshService")
            .field("instance_id", &self.instance_id)
            .field("config", &self.config)
            .finish()
    }
}

impl TokenRefreshService {
    /// Create the service over the shared state backends
    pub fn new(
        store: Arc<dyn SessionStore>,
        broker: Arc<dyn MessageBroker>,
        lock: Arc<dyn DistributedLock>,
        config: TokenRefreshConfig,
    ) -> Self {
        Self {
            store,
            broker,
            lock,
            http_client: reqwest::Client::new(),
            config,
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Spawn the periodic sweep; abort the handle on shutdown
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let interval = self.config.interval;
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                if let Err(e) = self.run_once().await {
                    warn!(error = %e, "token refresh sweep failed");
                }
            }
        })
    }

    /// One sweep over all sessions (exposed for testing)
    pub async fn run_once(&self) -> AuthResult<usize> {
        let mut refreshed = 0;
        for session_id in self.store.session_ids().await? {
            if self.refresh_session(&session_id).await? {
                refreshed += 1;
            }
        }
        Ok(refreshed)
    }

    /// Refresh one session if it is due; `true` when a refresh happened
    async fn refresh_session(&self, session_id: &str) -> AuthResult<bool> {
        let Some(meta) = self.store.get(session_id).await? else {
            return Ok(false);
        };
        let (Some(auth), Some(refresh)) = (meta.auth, meta.refresh) else {
            return Ok(false);
        };

        if refresh.attempts >= self.config.max_attempts {
            return Ok(false);
        }
        let now = Utc::now();
        let due = auth
            .expires_in(now)
            .is_some_and(|secs| secs <= self.config.expiry_buffer.as_secs() as i64);
        if !due {
            return Ok(false);
        }

        let lock_key = format!("refresh:{session_id}");
        if !self
            .lock
            .acquire(&lock_key, self.config.lock_ttl, &self.instance_id)
            .await?
        {
            // Another instance holds the lock; retry next cycle.
            debug!(session_id = %session_id, "refresh lock busy");
            return Ok(false);
        }

        let outcome = self.do_refresh(session_id, &auth, &refresh).await;
        let _ = self.lock.release(&lock_key, &self.instance_id).await;

        match outcome {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "token refresh failed");
                let failed = TokenRefreshState {
                    attempts: refresh.attempts + 1,
                    ..refresh
                };
                if failed.attempts >= self.config.max_attempts {
                    info!(
                        session_id = %session_id,
                        attempts = failed.attempts,
                        "refresh disabled until session reauthorizes"
                    );
                }
                self.store
                    .update_auth(session_id, auth, Some(failed))
                    .await?;
                Ok(false)
            }
        }
    }

    async fn do_refresh(
        &self,
        session_id: &str,
        auth: &AuthState,
        refresh: &TokenRefreshState,
    ) -> AuthResult<()> {
        let scope = refresh.scopes.join(" ");
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh.refresh_token.as_str()),
            ("client_id", refresh.client_id.as_str()),
        ];
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }

        let response = self
            .http_client
            .post(&refresh.authorization_server)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::upstream(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::upstream(format!("bad token response: {e}")))?;

        let now = Utc::now();
        let new_auth = AuthState {
            token_hash: hash_token(&tokens.access_token),
            expires_at: tokens
                .expires_in
                .map(|secs| now.timestamp() as u64 + secs),
            issued_at: Some(now.timestamp() as u64),
            scopes: tokens
                .scope
                .as_deref()
                .map(|s| s.split(' ').map(str::to_string).collect())
                .unwrap_or_else(|| auth.scopes.clone()),
            refresh_token: tokens.refresh_token.clone(),
            ..auth.clone()
        };
        let new_refresh = TokenRefreshState {
            // Rotating authorization servers hand out a new refresh token
            refresh_token: tokens
                .refresh_token
                .unwrap_or_else(|| refresh.refresh_token.clone()),
            last_refresh: Some(now),
            attempts: 0,
            ..refresh.clone()
        };

        self.store
            .update_auth(session_id, new_auth, Some(new_refresh))
            .await?;

        let notification = JsonRpcNotification::new(
            NOTIFICATION_TOKEN_REFRESHED,
            Some(json!({ "sessionId": session_id })),
        );
        self.broker
            .publish(
                &topics::session_message(session_id),
                &serde_json::to_value(&notification)?,
            )
            .await?;

        info!(session_id = %session_id, "access token refreshed");
        Ok(())
    }
}
