//! Task executor: tracks every submitted task for the retention window
//! and enforces the lifecycle state machine.
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use agora_core::{
    AgoraError, EventBus, EventKind, TaskRecord, TaskRequest, TaskStatus,
};

pub struct TaskExecutor {
    tasks: Arc<RwLock<HashMap<String, TaskRecord>>>,
    events: EventBus,
}

impl TaskExecutor {
    pub fn new(events: EventBus) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Store a new task in `pending` and return its id immediately.
    /// Does not block on execution; the capability handler reports progress
    /// through `update_status`.
    pub async fn submit(&self, request: TaskRequest) -> Result<String, AgoraError> {
        if request.id.trim().is_empty() {
            return Err(AgoraError::Validation("task id must not be empty".into()));
        }

        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&request.id) {
            return Err(AgoraError::Validation(format!(
                "task id already in use: {}",
                request.id
            )));
        }

        let record = TaskRecord::from_request(&request);
        let id = record.id.clone();
        tasks.insert(id.clone(), record);
        drop(tasks);

        info!(task_id = %id, capability = %request.capability_id, "Task submitted");
        self.events.publish(
            EventKind::TaskSubmitted,
            serde_json::json!({"taskId": id, "capabilityId": request.capability_id}),
        );
        Ok(id)
    }

    /// Move a pending task to `in_progress` when an agent picks it up.
    pub async fn acknowledge(&self, id: &str) -> Result<(), AgoraError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| AgoraError::not_found("task", id))?;

        if task.status != TaskStatus::Pending {
            return Err(AgoraError::StateConflict(format!(
                "task {} cannot be acknowledged from {:?}",
                id, task.status
            )));
        }

        task.status = TaskStatus::InProgress;
        task.metrics.started_at = Some(Utc::now());
        task.updated_at = Utc::now();
        drop(tasks);

        self.events
            .publish(EventKind::TaskAcknowledged, serde_json::json!({"taskId": id}));
        Ok(())
    }

    /// Record a progress or terminal report from the executing agent.
    ///
    /// Writes to a task already in a terminal state are rejected so that
    /// duplicate or delayed reports cannot corrupt a finished result.
    pub async fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        output: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<(), AgoraError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| AgoraError::not_found("task", id))?;

        if task.status.is_terminal() {
            warn!(task_id = %id, current = ?task.status, attempted = ?status,
                "Rejected status write to terminal task");
            return Err(AgoraError::StateConflict(format!(
                "task {} is already {:?}",
                id, task.status
            )));
        }

        if status == TaskStatus::Pending {
            return Err(AgoraError::StateConflict(
                "tasks cannot move back to pending".into(),
            ));
        }

        let now = Utc::now();
        task.status = status;
        task.updated_at = now;
        if let Some(output) = output {
            task.output = Some(output);
        }
        if let Some(error) = error {
            task.error = Some(error);
        }

        if status == TaskStatus::InProgress && task.metrics.started_at.is_none() {
            task.metrics.started_at = Some(now);
        }
        if status.is_terminal() {
            task.metrics.finished_at = Some(now);
            let start = task.metrics.started_at.unwrap_or(task.submitted_at);
            task.metrics.duration_ms =
                Some(now.signed_duration_since(start).num_milliseconds().max(0) as u64);
        }
        drop(tasks);

        let kind = match status {
            TaskStatus::Completed => Some(EventKind::TaskCompleted),
            TaskStatus::Failed => Some(EventKind::TaskFailed),
            TaskStatus::Cancelled => Some(EventKind::TaskCancelled),
            _ => None,
        };
        if let Some(kind) = kind {
            self.events.publish(kind, serde_json::json!({"taskId": id}));
        }
        Ok(())
    }

    /// Cancel a task. Returns true only when the task was non-terminal.
    /// Idempotent: cancelling a finished (or already cancelled) task
    /// returns false without error.
    pub async fn cancel(&self, id: &str) -> bool {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.get_mut(id) else {
            return false;
        };
        if task.status.is_terminal() {
            return false;
        }

        task.cancel_requested = true;
        task.status = TaskStatus::Cancelled;
        let now = Utc::now();
        task.updated_at = now;
        task.metrics.finished_at = Some(now);
        drop(tasks);

        info!(task_id = %id, "Task cancelled");
        self.events
            .publish(EventKind::TaskCancelled, serde_json::json!({"taskId": id}));
        true
    }

    /// Look up a task. A task whose timeout has elapsed is failed on read,
    /// so callers observe the timeout even between background sweeps.
    pub async fn get(&self, id: &str) -> Option<TaskRecord> {
        {
            let tasks = self.tasks.read().await;
            match tasks.get(id) {
                Some(task) if !task.timed_out(Utc::now()) => return Some(task.clone()),
                None => return None,
                _ => {}
            }
        }
        self.fail_timed_out(id).await;
        self.tasks.read().await.get(id).cloned()
    }

    /// Fail every non-terminal task whose timeout has elapsed.
    /// Returns the number of tasks transitioned.
    pub async fn sweep_timeouts(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.timed_out(now))
            .map(|t| t.id.clone())
            .collect();

        for id in &expired {
            self.fail_timed_out(id).await;
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Timed out tasks failed by sweep");
        }
        expired.len()
    }

    async fn fail_timed_out(&self, id: &str) {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.get_mut(id) else {
            return;
        };
        // Re-check under the write lock; a racing update may have
        // finished the task already.
        if !task.timed_out(Utc::now()) {
            return;
        }
        task.status = TaskStatus::Failed;
        task.error = Some("task timed out".to_string());
        let now = Utc::now();
        task.updated_at = now;
        task.metrics.finished_at = Some(now);
        drop(tasks);
        self.events.publish(
            EventKind::TaskFailed,
            serde_json::json!({"taskId": id, "reason": "timeout"}),
        );
    }

    /// Evict terminal tasks older than `max_age_secs`. Frees retained ids
    /// for reuse.
    pub async fn gc(&self, max_age_secs: i64) -> usize {
        let now = Utc::now();
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, t| {
            !t.status.is_terminal()
                || now.signed_duration_since(t.updated_at).num_seconds() < max_age_secs
        });
        let removed = before - tasks.len();
        if removed > 0 {
            info!(removed, "GC evicted terminal tasks");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::TaskPriority;

    fn request(id: &str) -> TaskRequest {
        TaskRequest {
            id: id.to_string(),
            capability_id: "cap-1".to_string(),
            input: serde_json::json!({"text": "hello"}),
            session_id: None,
            user_id: None,
            priority: TaskPriority::Normal,
            timeout_ms: None,
        }
    }

    fn executor() -> TaskExecutor {
        TaskExecutor::new(EventBus::new())
    }

    #[tokio::test]
    async fn test_submit_stores_pending() {
        let exec = executor();
        let id = exec.submit(request("t1")).await.unwrap();
        let task = exec.get(&id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let exec = executor();
        exec.submit(request("t1")).await.unwrap();
        let err = exec.submit(request("t1")).await;
        assert!(matches!(err, Err(AgoraError::Validation(_))));
    }

    #[tokio::test]
    async fn test_terminal_status_is_immutable() {
        let exec = executor();
        exec.submit(request("t1")).await.unwrap();
        exec.update_status("t1", TaskStatus::Completed, Some(serde_json::json!({"result": "x"})), None)
            .await
            .unwrap();

        let err = exec
            .update_status("t1", TaskStatus::Failed, None, Some("late report".into()))
            .await;
        assert!(matches!(err, Err(AgoraError::StateConflict(_))));

        let task = exec.get("t1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.output, Some(serde_json::json!({"result": "x"})));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let exec = executor();
        exec.submit(request("t1")).await.unwrap();

        assert!(exec.cancel("t1").await);
        assert!(!exec.cancel("t1").await);
        assert_eq!(exec.get("t1").await.unwrap().status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_unknown_task_is_false() {
        let exec = executor();
        assert!(!exec.cancel("missing").await);
    }

    #[tokio::test]
    async fn test_cancelled_task_refuses_updates() {
        let exec = executor();
        exec.submit(request("t1")).await.unwrap();
        exec.cancel("t1").await;

        let err = exec
            .update_status("t1", TaskStatus::Completed, None, None)
            .await;
        assert!(matches!(err, Err(AgoraError::StateConflict(_))));
    }

    #[tokio::test]
    async fn test_acknowledge_moves_to_in_progress() {
        let exec = executor();
        exec.submit(request("t1")).await.unwrap();
        exec.acknowledge("t1").await.unwrap();

        let task = exec.get("t1").await.unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert!(task.metrics.started_at.is_some());

        // Acknowledging twice is a state conflict.
        assert!(exec.acknowledge("t1").await.is_err());
    }

    #[tokio::test]
    async fn test_timeout_observed_on_read() {
        let exec = executor();
        let mut req = request("t1");
        req.timeout_ms = Some(1);
        exec.submit(req).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let task = exec.get("t1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("task timed out"));
    }

    #[tokio::test]
    async fn test_timeout_sweep() {
        let exec = executor();
        let mut req = request("t1");
        req.timeout_ms = Some(1);
        exec.submit(req).await.unwrap();
        exec.submit(request("t2")).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(exec.sweep_timeouts().await, 1);
        assert_eq!(exec.get("t1").await.unwrap().status, TaskStatus::Failed);
        assert_eq!(exec.get("t2").await.unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_gc_evicts_only_old_terminal_tasks() {
        let exec = executor();
        exec.submit(request("t1")).await.unwrap();
        exec.update_status("t1", TaskStatus::Completed, None, None)
            .await
            .unwrap();
        exec.submit(request("t2")).await.unwrap();

        // Zero max age evicts every terminal task immediately.
        assert_eq!(exec.gc(0).await, 1);
        assert!(exec.get("t1").await.is_none());
        assert!(exec.get("t2").await.is_some());
    }

    #[tokio::test]
    async fn test_metrics_recorded_on_completion() {
        let exec = executor();
        exec.submit(request("t1")).await.unwrap();
        exec.acknowledge("t1").await.unwrap();
        exec.update_status("t1", TaskStatus::Completed, None, None)
            .await
            .unwrap();

        let metrics = exec.get("t1").await.unwrap().metrics;
        assert!(metrics.started_at.is_some());
        assert!(metrics.finished_at.is_some());
        assert!(metrics.duration_ms.is_some());
    }
}
