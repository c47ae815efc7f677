//! SQLite-backed task record store
//!
//! Schema (see `zqa_common::db::migrations`):
//! `tasks(task_id PK, status, file_path, results, error, created_at, updated_at)`.
//! `results` holds the JSON-serialized report. Rows written before the
//! timestamp columns existed may have NULLs there, and NULL status reads
//! as PENDING.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use super::{StoreError, TaskSession, TaskStore};
use crate::models::{AnalysisReport, Task, TaskId, TaskStatus};

/// Record store over a SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn begin(&self) -> Result<Box<dyn TaskSession>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTaskSession { tx }))
    }
}

/// One SQLite transaction
pub struct SqliteTaskSession {
    tx: Transaction<'static, Sqlite>,
}

/// Column values prepared before touching the connection
struct EncodedTask {
    task_id: String,
    status: &'static str,
    file_path: String,
    results: Option<String>,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

fn encode(task: &Task) -> Result<EncodedTask, StoreError> {
    let results = task
        .results
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::Corrupt {
            task_id: task.id.to_string(),
            reason: format!("Failed to serialize results: {}", e),
        })?;

    Ok(EncodedTask {
        task_id: task.id.to_string(),
        status: task.status.as_str(),
        file_path: task.archive_path.clone(),
        results,
        error: task.error.clone(),
        created_at: task.created_at.to_rfc3339(),
        updated_at: task.updated_at.to_rfc3339(),
    })
}

fn parse_timestamp(task_id: &str, value: Option<String>) -> Result<DateTime<Utc>, StoreError> {
    match value {
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::Corrupt {
                task_id: task_id.to_string(),
                reason: format!("Failed to parse timestamp '{}': {}", s, e),
            }),
        None => Ok(DateTime::<Utc>::default()),
    }
}

fn decode(row: &SqliteRow) -> Result<Task, StoreError> {
    let task_id: String = row.try_get("task_id")?;
    let corrupt = |reason: String| StoreError::Corrupt {
        task_id: task_id.clone(),
        reason,
    };

    let status = match row.try_get::<Option<String>, _>("status")? {
        Some(s) => s.parse::<TaskStatus>().map_err(corrupt)?,
        None => TaskStatus::Pending,
    };

    let results = row
        .try_get::<Option<String>, _>("results")?
        .filter(|s| !s.is_empty())
        .map(|s| serde_json::from_str::<AnalysisReport>(&s))
        .transpose()
        .map_err(|e| corrupt(format!("Failed to deserialize results: {}", e)))?;

    let id = TaskId::from(task_id.clone());
    let archive_path = row
        .try_get::<Option<String>, _>("file_path")?
        .unwrap_or_else(|| id.blob_key());

    Ok(Task {
        status,
        archive_path,
        results,
        error: row.try_get("error")?,
        created_at: parse_timestamp(&task_id, row.try_get("created_at")?)?,
        updated_at: parse_timestamp(&task_id, row.try_get("updated_at")?)?,
        id,
    })
}

#[async_trait]
impl TaskSession for SqliteTaskSession {
    async fn create(&mut self, task: &Task) -> Result<(), StoreError> {
        let row = encode(task)?;

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (task_id, status, file_path, results, error, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.task_id)
        .bind(row.status)
        .bind(&row.file_path)
        .bind(&row.results)
        .bind(&row.error)
        .bind(&row.created_at)
        .bind(&row.updated_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::Conflict(row.task_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&mut self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT task_id, status, file_path, results, error, created_at, updated_at
            FROM tasks
            WHERE task_id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(decode).transpose()
    }

    async fn update(&mut self, task: &Task) -> Result<(), StoreError> {
        let row = encode(task)?;

        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = ?, file_path = ?, results = ?, error = ?, updated_at = ?
            WHERE task_id = ?
            "#,
        )
        .bind(row.status)
        .bind(&row.file_path)
        .bind(&row.results)
        .bind(&row.error)
        .bind(&row.updated_at)
        .bind(&row.task_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(row.task_id));
        }
        Ok(())
    }

    async fn transition(&mut self, task: &Task, expected: TaskStatus) -> Result<bool, StoreError> {
        let row = encode(task)?;

        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = ?, results = ?, error = ?, updated_at = ?
            WHERE task_id = ? AND COALESCE(status, 'PENDING') = ?
            "#,
        )
        .bind(row.status)
        .bind(&row.results)
        .bind(&row.error)
        .bind(&row.updated_at)
        .bind(&row.task_id)
        .bind(expected.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_by_status(&mut self, status: TaskStatus) -> Result<Vec<TaskId>, StoreError> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT task_id FROM tasks
            WHERE COALESCE(status, 'PENDING') = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(ids.into_iter().map(TaskId::from).collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
