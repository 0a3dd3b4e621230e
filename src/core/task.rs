use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::algorithm::TaskInput;

/// Lifecycle of a task across all of its runs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, no run started yet
    Pending,
    /// At least one run is executing
    Running,
    /// Every run returned a result
    Completed,
    /// At least one run failed
    Failed,
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Request to create a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Method and keyword arguments
    pub input: TaskInput,
    /// Organizations that execute the task
    pub organizations: Vec<u64>,
}

impl TaskRequest {
    pub fn new(input: TaskInput, organizations: Vec<u64>) -> Self {
        Self {
            name: input.method.clone(),
            description: String::new(),
            input,
            organizations,
        }
    }
}

/// Execution of a task on a single organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run identifier
    pub id: Uuid,
    /// Owning task
    pub task_id: u64,
    /// Organization that executed the run
    pub organization_id: u64,
    /// Outcome
    pub status: RunStatus,
    /// Method output when the run completed
    pub result: Option<serde_json::Value>,
    /// Error message when the run failed
    pub log: Option<String>,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: f64,
}

impl RunRecord {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// A task and the runs it produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Sequential task identifier
    pub id: u64,
    /// Task that created this one as a subtask
    pub parent_id: Option<u64>,
    pub name: String,
    pub description: String,
    pub input: TaskInput,
    pub organizations: Vec<u64>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub runs: Vec<RunRecord>,
}

impl TaskRecord {
    /// Task status implied by a finished set of runs
    pub fn status_from_runs(runs: &[RunRecord]) -> TaskStatus {
        if runs.iter().all(RunRecord::is_success) {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        }
    }
}
