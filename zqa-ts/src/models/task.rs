//! Task record and status state machine
//!
//! A task progresses through a forward-only state machine:
//! PENDING → IN_PROGRESS → SUCCESS | FAILED
//!
//! PENDING → FAILED is also permitted, for tasks that are abandoned before
//! a background unit ever claimed them. SUCCESS and FAILED are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::AnalysisReport;

/// Opaque task identifier
///
/// Freshly generated ids are hyphenated UUIDv4 strings. Lookups accept any
/// string so that unknown ids surface as "not found" rather than a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh, never-reused id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blob store key for this task's archive
    pub fn blob_key(&self) -> String {
        format!("{}.zip", self.0)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Archive stored, waiting for a background unit
    Pending,
    /// Claimed by a background unit
    InProgress,
    /// Analysis finished; results present
    Success,
    /// Processing failed; no results
    Failed,
}

impl TaskStatus {
    /// Column value in the tasks table
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }

    /// Whether `self → next` is a legal forward transition
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::InProgress, TaskStatus::Success)
                | (TaskStatus::InProgress, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "IN_PROGRESS" => Ok(TaskStatus::InProgress),
            "SUCCESS" => Ok(TaskStatus::Success),
            "FAILED" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

/// Rejected state change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal task transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// Applied state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub task_id: TaskId,
    pub old_status: TaskStatus,
    pub new_status: TaskStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// The persistent task record
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    /// Blob key of the uploaded archive
    pub archive_path: String,
    /// Present if and only if status is SUCCESS
    pub results: Option<AnalysisReport>,
    /// Failure diagnostic, set only on FAILED
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// New PENDING task pointing at its stored archive
    pub fn new(id: TaskId) -> Self {
        let now = Utc::now();
        Self {
            archive_path: id.blob_key(),
            id,
            status: TaskStatus::Pending,
            results: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition_to(&mut self, next: TaskStatus) -> Result<StateTransition, InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let transition = StateTransition {
            task_id: self.id.clone(),
            old_status: self.status,
            new_status: next,
            transitioned_at: Utc::now(),
        };
        self.status = next;
        self.updated_at = transition.transitioned_at;
        Ok(transition)
    }

    /// PENDING → IN_PROGRESS
    pub fn start(&mut self) -> Result<StateTransition, InvalidTransition> {
        self.transition_to(TaskStatus::InProgress)
    }

    /// IN_PROGRESS → SUCCESS, attaching the report
    pub fn complete(&mut self, report: AnalysisReport) -> Result<StateTransition, InvalidTransition> {
        let transition = self.transition_to(TaskStatus::Success)?;
        self.results = Some(report);
        self.error = None;
        Ok(transition)
    }

    /// → FAILED with a diagnostic; never carries results
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<StateTransition, InvalidTransition> {
        let transition = self.transition_to(TaskStatus::Failed)?;
        self.results = None;
        self.error = Some(reason.into());
        Ok(transition)
    }
}
