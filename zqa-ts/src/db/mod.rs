//! Task record store
//!
//! Every read and write happens inside a caller-supplied session, so that
//! the caller decides the transaction boundary. A session that is dropped
//! without [`TaskSession::commit`] rolls back.

pub mod tasks;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Task, TaskId, TaskStatus};

pub use tasks::SqliteTaskStore;

/// Record store failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with this id already exists
    #[error("task already exists: {0}")]
    Conflict(String),

    /// The record vanished between read and update
    #[error("task not found: {0}")]
    NotFound(String),

    /// Row contents could not be decoded
    #[error("corrupt task row {task_id}: {reason}")]
    Corrupt { task_id: String, reason: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Factory for transactional sessions
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Open a new, independent session
    async fn begin(&self) -> Result<Box<dyn TaskSession>, StoreError>;
}

/// One transaction against the record store
#[async_trait]
pub trait TaskSession: Send {
    /// Insert a new record; `Conflict` if the id exists
    async fn create(&mut self, task: &Task) -> Result<(), StoreError>;

    async fn get(&mut self, id: &TaskId) -> Result<Option<Task>, StoreError>;

    /// Unconditional overwrite (last write wins); `NotFound` if the row vanished
    async fn update(&mut self, task: &Task) -> Result<(), StoreError>;

    /// Overwrite only while the stored status is still `expected`.
    ///
    /// Returns false when another writer moved the task first.
    async fn transition(&mut self, task: &Task, expected: TaskStatus) -> Result<bool, StoreError>;

    /// Ids of every task currently in `status`, oldest first
    async fn list_by_status(&mut self, status: TaskStatus) -> Result<Vec<TaskId>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
