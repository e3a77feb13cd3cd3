//! Redis-backed session store.
//!
//! Layout per session:
//!
//! - `{prefix}:session:{id}` — hash with `created_at`, `last_activity`,
//!   `event_counter` (integer, `HINCRBY`-able), and JSON-encoded `auth`,
//!   `refresh`, `oauth` fields.
//! - `{prefix}:session:{id}:history` — stream of `(event_id, message)`
//!   entries, trimmed to the history bound with exact `XTRIM MAXLEN`.
//! - `{prefix}:token:{hash}` — token→session string key.
//!
//! Event-id allocation runs as a single server-side script so concurrent
//! writers on different instances can never allocate the same id. Session
//! expiry rides on key TTLs, re-armed on every activity.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::streams::StreamRangeReply;
use redis::{AsyncCommands, Script};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::session::{
    AuthState, SessionMessage, SessionMetadata, TokenRefreshState, DEFAULT_HISTORY_LIMIT,
    DEFAULT_SESSION_TTL_SECS,
};
use crate::store::SessionStore;

/// Allocates the next event id and appends the message atomically.
///
/// KEYS[1] = session hash, KEYS[2] = history stream
/// ARGV[1] = message JSON, ARGV[2] = last_activity, ARGV[3] = history
/// bound, ARGV[4] = TTL millis
const AUTO_EVENT_ID_SCRIPT: &str = r"
local counter = redis.call('HINCRBY', KEYS[1], 'event_counter', 1)
redis.call('HSET', KEYS[1], 'last_activity', ARGV[2])
redis.call('XADD', KEYS[2], '*', 'event_id', counter, 'message', ARGV[1])
redis.call('XTRIM', KEYS[2], 'MAXLEN', tonumber(ARGV[3]))
redis.call('PEXPIRE', KEYS[1], ARGV[4])
redis.call('PEXPIRE', KEYS[2], ARGV[4])
return counter
";

fn session_key(prefix: &str, id: &str) -> String {
    format!("{prefix}:session:{id}")
}

fn history_key(prefix: &str, id: &str) -> String {
    format!("{prefix}:session:{id}:history")
}

fn token_key(prefix: &str, hash: &str) -> String {
    format!("{prefix}:token:{hash}")
}

/// Redis-backed [`SessionStore`] implementation
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: redis::aio::MultiplexedConnection,
    prefix: String,
    ttl_secs: u64,
    history_limit: usize,
    auto_event_id: Script,
}

impl std::fmt::Debug for RedisSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSessionStore")
            .field("prefix", &self.prefix)
            .field("ttl_secs", &self.ttl_secs)
            .field("history_limit", &self.history_limit)
            .finish()
    }
}

impl RedisSessionStore {
    /// Connect and verify the server is responsive
    pub async fn connect(connection_string: &str) -> StateResult<Self> {
        Self::connect_with(
            connection_string,
            "mcp",
            DEFAULT_SESSION_TTL_SECS,
            DEFAULT_HISTORY_LIMIT,
        )
        .await
    }

    /// Connect with an explicit key prefix, TTL and history bound
    pub async fn connect_with(
        connection_string: &str,
        prefix: &str,
        ttl_secs: u64,
        history_limit: usize,
    ) -> StateResult<Self> {
        let client = redis::Client::open(connection_string)
            .map_err(|e| StateError::connection(format!("invalid Redis URL: {e}")))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StateError::connection(format!("failed to connect to Redis: {e}")))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StateError::connection(format!("Redis ping failed: {e}")))?;

        debug!("Redis connection established");

        Ok(Self {
            conn,
            prefix: prefix.to_string(),
            ttl_secs,
            history_limit,
            auto_event_id: Script::new(AUTO_EVENT_ID_SCRIPT),
        })
    }

    fn session_key(&self, id: &str) -> String {
        session_key(&self.prefix, id)
    }

    fn history_key(&self, id: &str) -> String {
        history_key(&self.prefix, id)
    }

    fn token_key(&self, hash: &str) -> String {
        token_key(&self.prefix, hash)
    }

    fn ttl_millis(&self) -> u64 {
        self.ttl_secs * 1000
    }

    fn metadata_fields(meta: &SessionMetadata) -> StateResult<Vec<(String, String)>> {
        let mut fields = vec![
            ("created_at".to_string(), meta.created_at.to_rfc3339()),
            ("last_activity".to_string(), meta.last_activity.to_rfc3339()),
            ("event_counter".to_string(), meta.event_counter.to_string()),
        ];
        if let Some(auth) = &meta.auth {
            fields.push(("auth".to_string(), serde_json::to_string(auth)?));
        }
        if let Some(refresh) = &meta.refresh {
            fields.push(("refresh".to_string(), serde_json::to_string(refresh)?));
        }
        if let Some(oauth) = &meta.oauth_session {
            fields.push(("oauth".to_string(), serde_json::to_string(oauth)?));
        }
        Ok(fields)
    }

    fn metadata_from_fields(
        id: &str,
        fields: &HashMap<String, String>,
    ) -> StateResult<SessionMetadata> {
        let parse_time = |field: &str| -> StateResult<DateTime<Utc>> {
            let raw = fields
                .get(field)
                .ok_or_else(|| StateError::backend(format!("session hash missing {field}")))?;
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| StateError::backend(format!("bad {field} timestamp: {e}")))
        };

        Ok(SessionMetadata {
            id: id.to_string(),
            created_at: parse_time("created_at")?,
            last_activity: parse_time("last_activity")?,
            event_counter: fields
                .get("event_counter")
                .and_then(|c| c.parse().ok())
                .unwrap_or(0),
            auth: fields
                .get("auth")
                .map(|raw| serde_json::from_str(raw))
                .transpose()?,
            refresh: fields
                .get("refresh")
                .map(|raw| serde_json::from_str(raw))
                .transpose()?,
            oauth_session: fields
                .get("oauth")
                .map(|raw| serde_json::from_str(raw))
                .transpose()?,
        })
    }

    fn parse_history(reply: StreamRangeReply) -> Vec<SessionMessage> {
        let mut messages = Vec::with_capacity(reply.ids.len());
        for entry in reply.ids {
            let event_id = entry
                .map
                .get("event_id")
                .and_then(|v| redis::from_redis_value::<String>(v).ok())
                .and_then(|s| s.parse::<u64>().ok());
            let message = entry
                .map
                .get("message")
                .and_then(|v| redis::from_redis_value::<String>(v).ok())
                .and_then(|s| serde_json::from_str::<Value>(&s).ok());
            match (event_id, message) {
                (Some(event_id), Some(message)) => {
                    messages.push(SessionMessage { event_id, message });
                }
                _ => warn!(stream_id = %entry.id, "skipping malformed history entry"),
            }
        }
        messages
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, metadata: SessionMetadata) -> StateResult<()> {
        let mut conn = self.conn.clone();
        let key = self.session_key(&metadata.id);
        let fields = Self::metadata_fields(&metadata)?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset_multiple(&key, &fields);
        pipe.pexpire(&key, self.ttl_millis() as i64);
        let _: () = pipe.query_async(&mut conn).await?;

        if let Some(auth) = &metadata.auth {
            let _: () = conn
                .set_ex(self.token_key(&auth.token_hash), &metadata.id, self.ttl_secs)
                .await?;
        }
        debug!(session_id = %metadata.id, "created session");
        Ok(())
    }

    async fn get(&self, id: &str) -> StateResult<Option<SessionMetadata>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(self.session_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Self::metadata_from_fields(id, &fields).map(Some)
    }

    async fn delete(&self, id: &str) -> StateResult<()> {
        let mut conn = self.conn.clone();
        let auth_raw: Option<String> = conn.hget(self.session_key(id), "auth").await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        if let Some(raw) = auth_raw {
            if let Ok(auth) = serde_json::from_str::<AuthState>(&raw) {
                pipe.del(self.token_key(&auth.token_hash));
            }
        }
        pipe.del(self.session_key(id));
        pipe.del(self.history_key(id));
        let _: () = pipe.query_async(&mut conn).await?;
        debug!(session_id = %id, "deleted session");
        Ok(())
    }

    async fn touch(&self, id: &str) -> StateResult<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset(self.session_key(id), "last_activity", Utc::now().to_rfc3339());
        pipe.pexpire(self.session_key(id), self.ttl_millis() as i64);
        pipe.pexpire(self.history_key(id), self.ttl_millis() as i64);
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn add_message(&self, id: &str, event_id: u64, message: &Value) -> StateResult<()> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(self.session_key(id)).await?;
        if !exists {
            return Err(StateError::SessionNotFound(id.to_string()));
        }

        let payload = serde_json::to_string(message)?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("XADD")
            .arg(self.history_key(id))
            .arg("*")
            .arg("event_id")
            .arg(event_id)
            .arg("message")
            .arg(&payload);
        pipe.cmd("XTRIM")
            .arg(self.history_key(id))
            .arg("MAXLEN")
            .arg(self.history_limit);
        pipe.hset(self.session_key(id), "last_activity", Utc::now().to_rfc3339());
        pipe.pexpire(self.session_key(id), self.ttl_millis() as i64);
        pipe.pexpire(self.history_key(id), self.ttl_millis() as i64);
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn add_message_auto_event_id(&self, id: &str, message: &Value) -> StateResult<u64> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(self.session_key(id)).await?;
        if !exists {
            return Err(StateError::SessionNotFound(id.to_string()));
        }

        let payload = serde_json::to_string(message)?;
        let event_id: u64 = self
            .auto_event_id
            .key(self.session_key(id))
            .key(self.history_key(id))
            .arg(payload)
            .arg(Utc::now().to_rfc3339())
            .arg(self.history_limit)
            .arg(self.ttl_millis())
            .invoke_async(&mut conn)
            .await?;
        Ok(event_id)
    }

    async fn messages_from(
        &self,
        id: &str,
        from_event_id: u64,
    ) -> StateResult<Vec<SessionMessage>> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(self.session_key(id)).await?;
        if !exists {
            return Err(StateError::SessionNotFound(id.to_string()));
        }

        let reply: StreamRangeReply = conn.xrange_all(self.history_key(id)).await?;
        let mut messages = Self::parse_history(reply);
        messages.retain(|m| m.event_id > from_event_id);
        messages.sort_by_key(|m| m.event_id);
        Ok(messages)
    }

    async fn session_ids(&self) -> StateResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}:session:*", self.prefix);
        let session_prefix = format!("{}:session:", self.prefix);

        let mut ids = Vec::new();
        let mut iter: redis::AsyncIter<'_, String> = conn.scan_match(&pattern).await?;
        while let Some(key) = iter.next_item().await {
            let key = key?;
            if key.ends_with(":history") {
                continue;
            }
            if let Some(id) = key.strip_prefix(&session_prefix) {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }

    async fn session_by_token_hash(&self, hash: &str) -> StateResult<Option<SessionMetadata>> {
        let mut conn = self.conn.clone();
        let session_id: Option<String> = conn.get(self.token_key(hash)).await?;
        match session_id {
            Some(id) => self.get(&id).await,
            None => Ok(None),
        }
    }

    async fn add_token_mapping(&self, hash: &str, session_id: &str) -> StateResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(self.token_key(hash), session_id, self.ttl_secs)
            .await?;
        Ok(())
    }

    async fn remove_token_mapping(&self, hash: &str) -> StateResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.token_key(hash)).await?;
        Ok(())
    }

    async fn update_auth(
        &self,
        id: &str,
        auth: AuthState,
        refresh: Option<TokenRefreshState>,
    ) -> StateResult<()> {
        let mut conn = self.conn.clone();
        let key = self.session_key(id);
        let exists: bool = conn.exists(&key).await?;
        if !exists {
            return Err(StateError::SessionNotFound(id.to_string()));
        }

        let old_auth: Option<String> = conn.hget(&key, "auth").await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        if let Some(raw) = old_auth {
            if let Ok(old) = serde_json::from_str::<AuthState>(&raw) {
                if old.token_hash != auth.token_hash {
                    pipe.del(self.token_key(&old.token_hash));
                }
            }
        }
        pipe.hset(&key, "auth", serde_json::to_string(&auth)?);
        match &refresh {
            Some(refresh) => {
                pipe.hset(&key, "refresh", serde_json::to_string(refresh)?);
            }
            None => {
                pipe.hdel(&key, "refresh");
            }
        }
        pipe.hset(&key, "last_activity", Utc::now().to_rfc3339());
        pipe.cmd("SET")
            .arg(self.token_key(&auth.token_hash))
            .arg(id)
            .arg("EX")
            .arg(self.ttl_secs);
        pipe.pexpire(&key, self.ttl_millis() as i64);
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn cleanup(&self) -> StateResult<usize> {
        // Key TTLs expire sessions server-side; this pass only removes
        // history streams whose session hash is already gone.
        let mut conn = self.conn.clone();
        let pattern = format!("{}:session:*:history", self.prefix);

        let mut orphans = Vec::new();
        {
            let mut iter: redis::AsyncIter<'_, String> = conn.scan_match(&pattern).await?;
            while let Some(key) = iter.next_item().await {
                orphans.push(key?);
            }
        }

        let mut removed = 0;
        for history_key in orphans {
            let session_key = history_key.trim_end_matches(":history").to_string();
            let exists: bool = conn.exists(&session_key).await?;
            if !exists {
                let _: () = conn.del(&history_key).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(count = removed, "removed orphaned history streams");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(session_key("mcp", "abc"), "mcp:session:abc");
        assert_eq!(history_key("mcp", "abc"), "mcp:session:abc:history");
        assert_eq!(token_key("mcp", "deadbeef"), "mcp:token:deadbeef");
    }

    #[test]
    fn metadata_fields_roundtrip() {
        let mut meta = SessionMetadata::new();
        meta.event_counter = 7;
        meta.auth = Some(AuthState {
            user_id: "u".into(),
            client_id: None,
            scopes: vec!["s".into()],
            audience: vec![],
            authorization_server: None,
            token_type: "Bearer".into(),
            token_hash: "h".into(),
            expires_at: Some(1),
            issued_at: None,
            refresh_token: None,
        });

        let fields: HashMap<String, String> = RedisSessionStore::metadata_fields(&meta)
            .unwrap()
            .into_iter()
            .collect();
        let parsed = RedisSessionStore::metadata_from_fields(&meta.id, &fields).unwrap();
        assert_eq!(parsed.event_counter, 7);
        assert_eq!(parsed.auth, meta.auth);
        assert_eq!(parsed.created_at.timestamp(), meta.created_at.timestamp());
    }

    #[test]
    fn auto_event_id_script_is_exact_trim() {
        // The script must not use approximate trimming ('~'), which would
        // break the exact history bound invariant.
        assert!(AUTO_EVENT_ID_SCRIPT.contains("'MAXLEN', tonumber(ARGV[3])"));
        assert!(!AUTO_EVENT_ID_SCRIPT.contains('~'));
    }

    #[tokio::test]
    #[ignore = "requires a running Redis at redis://127.0.0.1:6379"]
    async fn live_roundtrip() {
        let store = RedisSessionStore::connect("redis://127.0.0.1:6379")
            .await
            .unwrap();
        let meta = SessionMetadata::new();
        let id = meta.id.clone();
        store.create(meta).await.unwrap();

        let e1 = store
            .add_message_auto_event_id(&id, &serde_json::json!({"n": 1}))
            .await
            .unwrap();
        let e2 = store
            .add_message_auto_event_id(&id, &serde_json::json!({"n": 2}))
            .await
            .unwrap();
        assert!(e2 > e1);

        let messages = store.messages_from(&id, e1).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event_id, e2);

        store.delete(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());
    }
}
