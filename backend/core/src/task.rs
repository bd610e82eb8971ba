use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A capability invocation submitted by a caller.
///
/// The task id is caller-supplied and must be unique within the executor's
/// retention window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub id: String,
    pub capability_id: String,
    pub input: serde_json::Value,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal statuses are permanent; no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Timing and resource metrics for one task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetrics {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

/// The executor's tracked state for one task, kept for the retention
/// window after it reaches a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub capability_id: String,
    pub status: TaskStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub metrics: TaskMetrics,
    /// Cooperative cancellation flag; unwinding in-flight work is the
    /// capability handler's job, the executor only refuses further updates.
    #[serde(default)]
    pub cancel_requested: bool,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub timeout_ms: Option<u64>,
}

impl TaskRecord {
    pub fn from_request(req: &TaskRequest) -> Self {
        let now = Utc::now();
        Self {
            id: req.id.clone(),
            capability_id: req.capability_id.clone(),
            status: TaskStatus::Pending,
            output: None,
            error: None,
            metrics: TaskMetrics::default(),
            cancel_requested: false,
            submitted_at: now,
            updated_at: now,
            timeout_ms: req.timeout_ms,
        }
    }

    /// Whether the task's timeout has elapsed without reaching a terminal state.
    pub fn timed_out(&self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match self.timeout_ms {
            Some(ms) => {
                let elapsed = now.signed_duration_since(self.submitted_at);
                elapsed.num_milliseconds() >= ms as i64
            }
            None => false,
        }
    }
}
