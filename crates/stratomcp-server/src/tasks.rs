//! Long-running task service.
//!
//! Tasks start in `working` and end in exactly one of `completed`,
//! `failed` or `cancelled`; terminal states are final. Visibility is
//! auth-bound: a task created under an auth context answers "Task not
//! found" to everyone else, so task ids leak no existence information.
//! Every update publishes the task on its `mcp/task/{id}/status` topic.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use stratomcp_auth::AuthContext;
use stratomcp_protocol::methods::NOTIFICATION_TASK_STATUS;
use stratomcp_protocol::types::{Task, TaskStatus};
use stratomcp_protocol::JsonRpcNotification;
use stratomcp_state::{topics, MessageBroker};

use crate::error::{ServerError, ServerResult};

/// Result-poll cadence inside [`TaskService::task_result`]
const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on the advertised client poll interval
const MAX_POLL_INTERVAL_MS: u64 = 5000;

struct StoredTask {
    task: Task,
    result: Option<Value>,
    auth: Option<AuthContext>,
}

/// Thread-safe task registry with TTL cleanup
pub struct TaskService {
    tasks: Arc<RwLock<HashMap<String, StoredTask>>>,
    broker: Arc<dyn MessageBroker>,
}

impl std::fmt::Debug for TaskService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskService")
            .field("tasks", &self.count())
            .finish()
    }
}

impl TaskService {
    /// Service publishing status changes over the broker
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            broker,
        }
    }

    /// Create a task in `working` state with the given TTL (ms)
    pub fn create_task(&self, ttl_ms: u64, auth: Option<AuthContext>) -> ServerResult<Task> {
        let task = Task {
            task_id: Uuid::new_v4().to_string(),
            status: TaskStatus::Working,
            status_message: None,
            created_at: Utc::now().to_rfc3339(),
            ttl: ttl_ms,
            poll_interval: (ttl_ms / 10).min(MAX_POLL_INTERVAL_MS),
        };
        let mut tasks = self.write_tasks()?;
        tasks.insert(
            task.task_id.clone(),
            StoredTask {
                task: task.clone(),
                result: None,
                auth,
            },
        );
        debug!(task_id = %task.task_id, ttl_ms, "created task");
        Ok(task)
    }

    /// Task by id; callers outside the task's auth scope get
    /// [`ServerError::TaskNotFound`], identical to a missing id
    pub fn task(&self, task_id: &str, auth: Option<&AuthContext>) -> ServerResult<Task> {
        let tasks = self.read_tasks()?;
        let stored = tasks.get(task_id).ok_or(ServerError::TaskNotFound)?;
        Self::check_visibility(stored, auth)?;
        Ok(stored.task.clone())
    }

    /// Tasks visible to the caller
    pub fn list_tasks(&self, auth: Option<&AuthContext>) -> ServerResult<Vec<Task>> {
        let tasks = self.read_tasks()?;
        let mut visible: Vec<Task> = tasks
            .values()
            .filter(|stored| Self::check_visibility(stored, auth).is_ok())
            .map(|stored| stored.task.clone())
            .collect();
        visible.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(visible)
    }

    /// Host-side status update; publishes the new state on the task topic
    pub async fn update_task(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<Value>,
        status_message: Option<String>,
    ) -> ServerResult<Task> {
        let task = {
            let mut tasks = self.write_tasks()?;
            let stored = tasks.get_mut(task_id).ok_or(ServerError::TaskNotFound)?;
            if stored.task.status.is_terminal() {
                return Err(ServerError::TaskState(format!(
                    "cannot transition task in terminal state {}",
                    stored.task.status
                )));
            }
            stored.task.status = status;
            stored.task.status_message = status_message;
            if result.is_some() {
                stored.result = result;
            }
            stored.task.clone()
        };
        self.publish_status(&task).await;
        Ok(task)
    }

    /// Cancel a working task ("Cancelled by user"); terminal tasks error
    pub async fn cancel_task(
        &self,
        task_id: &str,
        auth: Option<&AuthContext>,
    ) -> ServerResult<Task> {
        let task = {
            let mut tasks = self.write_tasks()?;
            let stored = tasks.get_mut(task_id).ok_or(ServerError::TaskNotFound)?;
            Self::check_visibility(stored, auth)?;
            if stored.task.status.is_terminal() {
                return Err(ServerError::TaskState(format!(
                    "cannot cancel task in terminal state {}",
                    stored.task.status
                )));
            }
            stored.task.status = TaskStatus::Cancelled;
            stored.task.status_message = Some("Cancelled by user".to_string());
            stored.task.clone()
        };
        self.publish_status(&task).await;
        Ok(task)
    }

    /// Block until the task is terminal, polling internally; errors once
    /// the task's `created_at + ttl` deadline passes. The TTL is a
    /// property of the task's whole lifetime, so a late caller gets only
    /// the remaining window, not a fresh one.
    pub async fn task_result(
        &self,
        task_id: &str,
        auth: Option<&AuthContext>,
    ) -> ServerResult<Option<Value>> {
        let deadline = Self::expiry(&self.task(task_id, auth)?)?;

        loop {
            {
                let tasks = self.read_tasks()?;
                let stored = tasks.get(task_id).ok_or(ServerError::TaskNotFound)?;
                Self::check_visibility(stored, auth)?;
                if stored.task.status.is_terminal() {
                    return Ok(stored.result.clone());
                }
            }
            if Utc::now() >= deadline {
                return Err(ServerError::TaskState(format!(
                    "timed out waiting for task {task_id}"
                )));
            }
            tokio::time::sleep(RESULT_POLL_INTERVAL).await;
        }
    }

    /// The instant a task's retention window ends (`created_at + ttl`)
    fn expiry(task: &Task) -> ServerResult<chrono::DateTime<Utc>> {
        let created_at = DateTime::parse_from_rfc3339(&task.created_at).map_err(|e| {
            ServerError::internal(format!("bad created_at on task {}: {e}", task.task_id))
        })?;
        Ok((created_at + chrono::Duration::milliseconds(task.ttl as i64)).with_timezone(&Utc))
    }

    /// Drop tasks older than `created_at + ttl`; returns how many
    pub fn cleanup(&self) -> ServerResult<usize> {
        let now = Utc::now();
        let mut tasks = self.write_tasks()?;
        let before = tasks.len();
        // Unparseable timestamps are kept; expiry() errors only on those
        tasks.retain(|_, stored| match Self::expiry(&stored.task) {
            Ok(expiry) => now < expiry,
            Err(_) => true,
        });
        let removed = before - tasks.len();
        if removed > 0 {
            debug!(count = removed, "cleaned up expired tasks");
        }
        Ok(removed)
    }

    /// Spawn the periodic cleanup sweep
    pub fn start_cleanup(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            loop {
                timer.tick().await;
                if let Err(e) = service.cleanup() {
                    warn!(error = %e, "task cleanup failed");
                }
            }
        })
    }

    /// Number of live tasks
    pub fn count(&self) -> usize {
        self.tasks.read().map(|t| t.len()).unwrap_or(0)
    }

    fn check_visibility(stored: &StoredTask, auth: Option<&AuthContext>) -> ServerResult<()> {
        let Some(bound) = &stored.auth else {
            return Ok(());
        };
        let Some(caller) = auth else {
            return Err(ServerError::TaskNotFound);
        };
        let user_matches = caller.user_id == bound.user_id;
        let client_matches = caller
            .client_id
            .as_ref()
            .zip(bound.client_id.as_ref())
            .is_some_and(|(a, b)| a == b);
        if user_matches || client_matches {
            Ok(())
        } else {
            Err(ServerError::TaskNotFound)
        }
    }

    async fn publish_status(&self, task: &Task) {
        let notification = JsonRpcNotification::new(
            NOTIFICATION_TASK_STATUS,
            serde_json::to_value(task).ok(),
        );
        let Ok(payload) = serde_json::to_value(&notification) else {
            return;
        };
        if let Err(e) = self
            .broker
            .publish(&topics::task_status(&task.task_id), &payload)
            .await
        {
            warn!(task_id = %task.task_id, error = %e, "failed to publish task status");
        }
    }

    fn read_tasks(
        &self,
    ) -> ServerResult<std::sync::RwLockReadGuard<'_, HashMap<String, StoredTask>>> {
        self.tasks
            .read()
            .map_err(|_| ServerError::internal("task lock poisoned"))
    }

    fn write_tasks(
        &self,
    ) -> ServerResult<std::sync::RwLockWriteGuard<'_, HashMap<String, StoredTask>>> {
        self.tasks
            .write()
            .map_err(|_| ServerError::internal("task lock poisoned"))
    }
}
