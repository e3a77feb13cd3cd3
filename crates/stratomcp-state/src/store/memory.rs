//! In-process session store.
//!
//! Backs single-instance deployments. All state lives behind one
//! `tokio::sync::RwLock` so the token map and session metadata always
//! move together; history is a `VecDeque` trimmed exactly to the
//! configured bound on every append.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::session::{
    AuthState, SessionMessage, SessionMetadata, TokenRefreshState, DEFAULT_HISTORY_LIMIT,
    DEFAULT_SESSION_TTL_SECS,
};
use crate::store::SessionStore;

struct SessionEntry {
    meta: SessionMetadata,
    history: VecDeque<SessionMessage>,
}

#[derive(Default)]
struct StoreState {
    sessions: HashMap<String, SessionEntry>,
    token_map: HashMap<String, String>,
}

/// In-memory [`SessionStore`] implementation
#[derive(Clone)]
pub struct MemorySessionStore {
    state: Arc<RwLock<StoreState>>,
    ttl_secs: u64,
    history_limit: usize,
}

impl std::fmt::Debug for MemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySessionStore")
            .field("ttl_secs", &self.ttl_secs)
            .field("history_limit", &self.history_limit)
            .finish()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    /// Store with default TTL (1 h) and history bound (100)
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_SESSION_TTL_SECS, DEFAULT_HISTORY_LIMIT)
    }

    /// Store with explicit inactivity TTL and history bound
    pub fn with_limits(ttl_secs: u64, history_limit: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            ttl_secs,
            history_limit,
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, metadata: SessionMetadata) -> StateResult<()> {
        let mut state = self.state.write().await;
        debug!(session_id = %metadata.id, "creating session");
        state.sessions.insert(
            metadata.id.clone(),
            SessionEntry {
                meta: metadata,
                history: VecDeque::new(),
            },
        );
        Ok(())
    }

    async fn get(&self, id: &str) -> StateResult<Option<SessionMetadata>> {
        let state = self.state.read().await;
        let now = Utc::now();
        Ok(state
            .sessions
            .get(id)
            .filter(|entry| !entry.meta.is_expired(now, self.ttl_secs))
            .map(|entry| entry.meta.clone()))
    }

    async fn delete(&self, id: &str) -> StateResult<()> {
        let mut state = self.state.write().await;
        if let Some(entry) = state.sessions.remove(id) {
            if let Some(auth) = entry.meta.auth {
                state.token_map.remove(&auth.token_hash);
            }
            debug!(session_id = %id, "deleted session");
        }
        Ok(())
    }

    async fn touch(&self, id: &str) -> StateResult<()> {
        let mut state = self.state.write().await;
        if let Some(entry) = state.sessions.get_mut(id) {
            entry.meta.last_activity = Utc::now();
        }
        Ok(())
    }

    async fn add_message(&self, id: &str, event_id: u64, message: &Value) -> StateResult<()> {
        let mut state = self.state.write().await;
        let entry = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| StateError::SessionNotFound(id.to_string()))?;
        entry.meta.last_activity = Utc::now();
        if event_id > entry.meta.event_counter {
            entry.meta.event_counter = event_id;
        }
        entry.history.push_back(SessionMessage {
            event_id,
            message: message.clone(),
        });
        while entry.history.len() > self.history_limit {
            entry.history.pop_front();
        }
        Ok(())
    }

    async fn add_message_auto_event_id(&self, id: &str, message: &Value) -> StateResult<u64> {
        let mut state = self.state.write().await;
        let limit = self.history_limit;
        let entry = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| StateError::SessionNotFound(id.to_string()))?;
        entry.meta.event_counter += 1;
        entry.meta.last_activity = Utc::now();
        let event_id = entry.meta.event_counter;
        entry.history.push_back(SessionMessage {
            event_id,
            message: message.clone(),
        });
        while entry.history.len() > limit {
            entry.history.pop_front();
        }
        Ok(event_id)
    }

    async fn messages_from(
        &self,
        id: &str,
        from_event_id: u64,
    ) -> StateResult<Vec<SessionMessage>> {
        let state = self.state.read().await;
        let entry = state
            .sessions
            .get(id)
            .ok_or_else(|| StateError::SessionNotFound(id.to_string()))?;
        Ok(entry
            .history
            .iter()
            .filter(|m| m.event_id > from_event_id)
            .cloned()
            .collect())
    }

    async fn session_ids(&self) -> StateResult<Vec<String>> {
        let state = self.state.read().await;
        let now = Utc::now();
        Ok(state
            .sessions
            .iter()
            .filter(|(_, entry)| !entry.meta.is_expired(now, self.ttl_secs))
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn session_by_token_hash(&self, hash: &str) -> StateResult<Option<SessionMetadata>> {
        let state = self.state.read().await;
        let now = Utc::now();
        Ok(state.token_map.get(hash).and_then(|id| {
            state
                .sessions
                .get(id)
                .filter(|entry| !entry.meta.is_expired(now, self.ttl_secs))
                .map(|entry| entry.meta.clone())
        }))
    }

    async fn add_token_mapping(&self, hash: &str, session_id: &str) -> StateResult<()> {
        let mut state = self.state.write().await;
        state.token_map.insert(hash.to_string(), session_id.to_string());
        Ok(())
    }

    async fn remove_token_mapping(&self, hash: &str) -> StateResult<()> {
        let mut state = self.state.write().await;
        state.token_map.remove(hash);
        Ok(())
    }

    async fn update_auth(
        &self,
        id: &str,
        auth: AuthState,
        refresh: Option<TokenRefreshState>,
    ) -> StateResult<()> {
        let mut state = self.state.write().await;
        let old_hash = {
            let entry = state
                .sessions
                .get_mut(id)
                .ok_or_else(|| StateError::SessionNotFound(id.to_string()))?;
            let old_hash = entry.meta.auth.as_ref().map(|a| a.token_hash.clone());
            entry.meta.auth = Some(auth.clone());
            entry.meta.refresh = refresh;
            entry.meta.last_activity = Utc::now();
            old_hash
        };
        if let Some(old) = old_hash {
            state.token_map.remove(&old);
        }
        state.token_map.insert(auth.token_hash, id.to_string());
        Ok(())
    }

    async fn cleanup(&self) -> StateResult<usize> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let ttl = self.ttl_secs;
        let expired: Vec<String> = state
            .sessions
            .iter()
            .filter(|(_, entry)| entry.meta.is_expired(now, ttl))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if let Some(entry) = state.sessions.remove(id) {
                if let Some(auth) = entry.meta.auth {
                    state.token_map.remove(&auth.token_hash);
                }
            }
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "cleaned up expired sessions");
        }
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::session::hash_token;

    fn auth_for(token: &str) -> AuthState {
        AuthState {
            user_id: "user-1".into(),
            client_id: Some("client-1".into()),
            scopes: vec!["mcp:tools".into()],
            audience: vec![],
            authorization_server: None,
            token_type: "Bearer".into(),
            token_hash: hash_token(token),
            expires_at: None,
            issued_at: None,
            refresh_token: None,
        }
    }

    #[tokio::test]
    async fn auto_event_ids_are_strictly_increasing() {
        let store = MemorySessionStore::new();
        let meta = SessionMetadata::new();
        let id = meta.id.clone();
        store.create(meta).await.unwrap();

        let mut last = 0;
        for i in 0..10 {
            let event_id = store
                .add_message_auto_event_id(&id, &json!({"seq": i}))
                .await
                .unwrap();
            assert!(event_id > last);
            last = event_id;
        }
        assert_eq!(last, 10);
    }

    #[tokio::test]
    async fn concurrent_writers_never_collide() {
        let store = MemorySessionStore::new();
        let meta = SessionMetadata::new();
        let id = meta.id.clone();
        store.create(meta).await.unwrap();

        let mut handles = Vec::new();
        for task in 0..8 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                for i in 0..25 {
                    let event_id = store
                        .add_message_auto_event_id(&id, &json!({"task": task, "seq": i}))
                        .await
                        .unwrap();
                    ids.push(event_id);
                }
                ids
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        let expected: Vec<u64> = (1..=200).collect();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn history_is_trimmed_exactly() {
        let store = MemorySessionStore::with_limits(3600, 5);
        let meta = SessionMetadata::new();
        let id = meta.id.clone();
        store.create(meta).await.unwrap();

        for i in 0..12 {
            store
                .add_message_auto_event_id(&id, &json!({"seq": i}))
                .await
                .unwrap();
        }

        let messages = store.messages_from(&id, 0).await.unwrap();
        assert_eq!(messages.len(), 5);
        // Oldest entries were evicted first
        assert_eq!(messages[0].event_id, 8);
        assert_eq!(messages[4].event_id, 12);
    }

    #[tokio::test]
    async fn replay_returns_strictly_greater_in_order() {
        let store = MemorySessionStore::new();
        let meta = SessionMetadata::new();
        let id = meta.id.clone();
        store.create(meta).await.unwrap();

        for i in 0..6 {
            store
                .add_message_auto_event_id(&id, &json!({"seq": i}))
                .await
                .unwrap();
        }

        let replayed = store.messages_from(&id, 3).await.unwrap();
        let ids: Vec<u64> = replayed.iter().map(|m| m.event_id).collect();
        assert_eq!(ids, vec![4, 5, 6]);
    }

    #[tokio::test]
    async fn token_mapping_is_exclusive_and_swapped_atomically() {
        let store = MemorySessionStore::new();
        let meta = SessionMetadata::new();
        let id = meta.id.clone();
        store.create(meta).await.unwrap();

        store.update_auth(&id, auth_for("token-a"), None).await.unwrap();
        let found = store
            .session_by_token_hash(&hash_token("token-a"))
            .await
            .unwrap();
        assert_eq!(found.unwrap().id, id);

        // Rebinding to a new token removes the old hash
        store.update_auth(&id, auth_for("token-b"), None).await.unwrap();
        assert!(store
            .session_by_token_hash(&hash_token("token-a"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store
                .session_by_token_hash(&hash_token("token-b"))
                .await
                .unwrap()
                .unwrap()
                .id,
            id
        );
    }

    #[tokio::test]
    async fn delete_removes_history_and_token_mapping() {
        let store = MemorySessionStore::new();
        let meta = SessionMetadata::new();
        let id = meta.id.clone();
        store.create(meta).await.unwrap();
        store.update_auth(&id, auth_for("tok"), None).await.unwrap();
        store
            .add_message_auto_event_id(&id, &json!({}))
            .await
            .unwrap();

        store.delete(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());
        assert!(store
            .session_by_token_hash(&hash_token("tok"))
            .await
            .unwrap()
            .is_none());
        assert!(store.messages_from(&id, 0).await.is_err());
    }

    #[tokio::test]
    async fn expired_sessions_are_invisible_and_cleaned() {
        let store = MemorySessionStore::with_limits(0, 100);
        let meta = SessionMetadata::new();
        let id = meta.id.clone();
        store.create(meta).await.unwrap();

        // TTL of zero expires immediately
        assert!(store.get(&id).await.unwrap().is_none());
        let removed = store.cleanup().await.unwrap();
        assert_eq!(removed, 1);
    }
}
