//! Task lifecycle manager
//!
//! Owns every task invariant:
//! - validation happens before any write, so a rejected upload leaves nothing behind
//! - the blob is stored before the record that points at it
//! - status only moves forward (see [`crate::models::TaskStatus`])
//! - exactly one background unit processes a task, enforced by a conditional
//!   PENDING → IN_PROGRESS claim
//! - background failures end in FAILED, never in a stuck IN_PROGRESS
//!
//! The request path runs in one request-scoped session. Background units
//! open their own sessions and never share the request's.

use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::{StoreError, TaskSession, TaskStore};
use crate::error::TaskError;
use crate::models::{AnalysisReport, StateTransition, Task, TaskId, TaskStatus};
use crate::services::analyzer::Analyzer;
use crate::services::archive_validator::validate_archive;
use crate::services::blob_store::BlobStore;
use crate::services::result_cache::ResultCache;
use crate::services::scheduler::BackgroundScheduler;

/// Diagnostic stored on tasks failed by startup recovery
pub const INTERRUPTED_REASON: &str = "Processing interrupted by service restart";

/// Room for multipart boundaries and part headers on top of the archive cap
pub const MULTIPART_FRAMING_ALLOWANCE: u64 = 64 * 1024;

/// Upload acceptance rules
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    /// Cap on the archive itself
    pub max_upload_bytes: u64,
    /// Lowercase, no leading dot
    pub accepted_extension: String,
    /// Ceiling on the total inflated size seen during validation
    pub max_uncompressed_bytes: u64,
}

impl UploadPolicy {
    pub fn from_config(config: &zqa_common::config::ServiceConfig) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            accepted_extension: config.accepted_extension.clone(),
            max_uncompressed_bytes: config.max_uncompressed_bytes,
        }
    }

    /// Largest acceptable request size hint.
    ///
    /// The hint is the whole request body, so it may exceed the archive cap
    /// by the multipart framing. The archive bytes themselves are held to
    /// `max_upload_bytes` exactly.
    pub fn max_request_bytes(&self) -> u64 {
        self.max_upload_bytes
            .saturating_add(MULTIPART_FRAMING_ALLOWANCE)
    }

    fn accepts_filename(&self, filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.accepted_extension))
    }
}

/// Lazily read upload body
#[async_trait]
pub trait ByteSource: Send {
    /// Read the full body. Streaming sources stop with `FileTooLarge` as
    /// soon as more than `limit` bytes have arrived.
    async fn read_all(&mut self, limit: u64) -> Result<Vec<u8>, TaskError>;
}

#[async_trait]
impl ByteSource for Vec<u8> {
    async fn read_all(&mut self, _limit: u64) -> Result<Vec<u8>, TaskError> {
        // Already in memory; the size cap is enforced by create_task
        Ok(std::mem::take(self))
    }
}

/// Status view returned to pollers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<AnalysisReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Task> for TaskResult {
    fn from(task: &Task) -> Self {
        Self {
            status: task.status,
            results: task.results.clone(),
            error: task.error.clone(),
        }
    }
}

/// Outcome of startup recovery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// IN_PROGRESS tasks from a previous run, now FAILED
    pub failed: usize,
    /// PENDING tasks handed to the scheduler again
    pub rescheduled: usize,
}

fn storage_failure(context: &str, e: impl std::fmt::Display) -> TaskError {
    TaskError::Processing(format!("{}: {}", context, e))
}

/// The lifecycle manager. Cheap to clone; clones share all collaborators.
#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    blobs: Arc<dyn BlobStore>,
    analyzer: Arc<dyn Analyzer>,
    cache: ResultCache,
    scheduler: BackgroundScheduler,
    policy: UploadPolicy,
}

impl TaskService {
    pub fn new(
        store: Arc<dyn TaskStore>,
        blobs: Arc<dyn BlobStore>,
        analyzer: Arc<dyn Analyzer>,
        policy: UploadPolicy,
    ) -> Self {
        Self {
            store,
            blobs,
            analyzer,
            cache: ResultCache::new(),
            scheduler: BackgroundScheduler::new(),
            policy,
        }
    }

    pub fn scheduler(&self) -> &BackgroundScheduler {
        &self.scheduler
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Accept an upload and schedule its analysis.
    ///
    /// Returns as soon as the task record is committed; analysis runs in
    /// the background.
    pub async fn submit<S: ByteSource>(
        &self,
        filename: Option<&str>,
        size_hint: Option<u64>,
        mut source: S,
    ) -> Result<TaskId, TaskError> {
        let filename = filename
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| TaskError::InvalidFile("missing filename".to_string()))?;
        if !self.policy.accepts_filename(filename) {
            return Err(TaskError::InvalidFile(format!(
                "'{}' does not have a .{} extension",
                filename, self.policy.accepted_extension
            )));
        }

        let limit = self.policy.max_upload_bytes;
        match size_hint {
            Some(size) if size <= self.policy.max_request_bytes() => {}
            size => return Err(TaskError::FileTooLarge { size, limit }),
        }

        let bytes = source.read_all(limit).await?;

        let task_id = TaskId::generate();
        let mut session = self
            .store
            .begin()
            .await
            .map_err(|e| storage_failure("open session", e))?;
        self.create_task(session.as_mut(), &task_id, bytes).await?;
        session
            .commit()
            .await
            .map_err(|e| storage_failure("commit task record", e))?;

        info!(task_id = %task_id, filename = %filename, "Task created");

        self.schedule(task_id.clone());
        Ok(task_id)
    }

    /// Validate, store and record an archive inside the caller's session.
    ///
    /// Nothing is written unless validation passes, and the record is only
    /// created once the blob is stored.
    pub async fn create_task(
        &self,
        session: &mut dyn TaskSession,
        task_id: &TaskId,
        bytes: Vec<u8>,
    ) -> Result<(), TaskError> {
        let limit = self.policy.max_upload_bytes;
        let size = bytes.len() as u64;
        if size > limit {
            return Err(TaskError::FileTooLarge {
                size: Some(size),
                limit,
            });
        }

        // CRC checks touch every byte; keep them off the async workers
        let budget = self.policy.max_uncompressed_bytes;
        let (bytes, summary) = tokio::task::spawn_blocking(move || {
            let summary = validate_archive(&bytes, budget);
            summary.map(|summary| (bytes, summary))
        })
        .await
        .map_err(|e| storage_failure("archive validation aborted", e))?
        .map_err(|e| TaskError::ZipValidation(e.to_string()))?;

        debug!(
            task_id = %task_id,
            entries = summary.entries,
            uncompressed_bytes = summary.uncompressed_bytes,
            "Archive validated"
        );

        let task = Task::new(task_id.clone());
        self.blobs
            .put(&task.archive_path, &bytes)
            .await
            .map_err(|e| storage_failure("store archive", e))?;

        session
            .create(&task)
            .await
            .map_err(|e| storage_failure("create task record", e))?;

        Ok(())
    }

    /// Hand `process(task_id)` to the background scheduler
    fn schedule(&self, task_id: TaskId) {
        let service = self.clone();
        self.scheduler
            .spawn(task_id.clone(), service.run_background(task_id));
    }

    /// Background entry point: process, and on any failure make sure the
    /// task does not stay unfinished.
    ///
    /// The fallback only touches a task this unit owns: one it claimed, or
    /// one still PENDING because the unit failed before claiming.
    async fn run_background(self, task_id: TaskId) -> Result<(), TaskError> {
        let claimed = Arc::new(AtomicBool::new(false));
        let worker = self.clone();
        let worker_id = task_id.clone();
        let worker_claimed = Arc::clone(&claimed);
        // Inner spawn turns a panic into an error instead of a silent stuck task
        let outcome = match tokio::spawn(async move {
            worker.process_unit(&worker_id, &worker_claimed).await
        })
        .await
        {
            Ok(result) => result,
            Err(join_error) => Err(TaskError::Processing(format!(
                "background unit aborted: {}",
                join_error
            ))),
        };

        if outcome.is_err() {
            let owned_status = if claimed.load(Ordering::SeqCst) {
                TaskStatus::InProgress
            } else {
                TaskStatus::Pending
            };
            self.fail_if_unfinished(&task_id, owned_status).await;
        }
        outcome
    }

    /// Run analysis for one task. Used by background units only.
    ///
    /// Unknown ids are a logged no-op. A task that is not PENDING was
    /// claimed by someone else (or already finished) and is left alone.
    pub async fn process(&self, task_id: &TaskId) -> Result<(), TaskError> {
        self.process_unit(task_id, &AtomicBool::new(false)).await
    }

    /// `process`, recording in `claimed` once this unit owns the task
    async fn process_unit(&self, task_id: &TaskId, claimed: &AtomicBool) -> Result<(), TaskError> {
        let task = {
            let mut session = self
                .store
                .begin()
                .await
                .map_err(|e| storage_failure("open session", e))?;
            session
                .get(task_id)
                .await
                .map_err(|e| storage_failure("load task", e))?
        };

        let Some(mut task) = task else {
            warn!(task_id = %task_id, "Task not found - nothing to process");
            return Ok(());
        };

        if task.status != TaskStatus::Pending {
            info!(task_id = %task_id, status = %task.status, "Task already claimed - skipping");
            return Ok(());
        }

        let claim = task
            .start()
            .map_err(|e| TaskError::Processing(e.to_string()))?;
        if !self.persist_transition(&task, &claim).await? {
            info!(task_id = %task_id, "Task claimed by another unit - skipping");
            return Ok(());
        }
        claimed.store(true, Ordering::SeqCst);
        info!(task_id = %task_id, "Task processing started");

        let report = match self.analyze_archive(&task).await {
            Ok(report) => report,
            Err(reason) => {
                let failure = task
                    .fail(reason.clone())
                    .map_err(|e| TaskError::Processing(e.to_string()))?;
                self.persist_transition(&task, &failure).await?;
                return Err(TaskError::Processing(reason));
            }
        };

        let completion = task
            .complete(report)
            .map_err(|e| TaskError::Processing(e.to_string()))?;
        if !self.persist_transition(&task, &completion).await? {
            // Only a concurrent writer outside the claim protocol can get here
            warn!(task_id = %task_id, "Task left IN_PROGRESS before results were saved");
            return Ok(());
        }

        info!(
            task_id = %task_id,
            engine = self.analyzer.engine_id(),
            "Task processing completed"
        );
        Ok(())
    }

    /// Fetch the archive and run the analyzer; errors are client-safe reasons
    async fn analyze_archive(&self, task: &Task) -> Result<AnalysisReport, String> {
        let bytes = self.blobs.get(&task.archive_path).await.map_err(|e| {
            warn!(task_id = %task.id, error = %e, "Failed to load archive");
            "Archive could not be loaded".to_string()
        })?;

        self.analyzer.analyze(&bytes).await.map_err(|e| {
            warn!(task_id = %task.id, engine = self.analyzer.engine_id(), error = %e, "Analysis failed");
            "Analysis failed".to_string()
        })
    }

    /// Write `task` in its own session, provided the stored status still
    /// matches the transition's starting point, and drop any cached view
    async fn persist_transition(
        &self,
        task: &Task,
        transition: &StateTransition,
    ) -> Result<bool, TaskError> {
        let mut session = self
            .store
            .begin()
            .await
            .map_err(|e| storage_failure("open session", e))?;
        let applied = session
            .transition(task, transition.old_status)
            .await
            .map_err(|e| storage_failure("update task", e))?;
        session
            .commit()
            .await
            .map_err(|e| storage_failure("commit task update", e))?;

        self.cache.invalidate(&task.id).await;
        debug!(
            task_id = %transition.task_id,
            from = %transition.old_status,
            to = %transition.new_status,
            at = %transition.transitioned_at,
            applied,
            "Task transition persisted"
        );
        Ok(applied)
    }

    /// Best-effort FAILED write after a background error.
    ///
    /// Only applies while the task is still in `owned_status`; a task that
    /// another unit has since claimed or finished is left alone.
    async fn fail_if_unfinished(&self, task_id: &TaskId, owned_status: TaskStatus) {
        let result: Result<(), StoreError> = async {
            let mut session = self.store.begin().await?;
            let Some(mut task) = session.get(task_id).await? else {
                return Ok(());
            };
            if task.status != owned_status {
                debug!(
                    task_id = %task_id,
                    status = %task.status,
                    "Task no longer owned by failed unit - leaving it"
                );
                return Ok(());
            }
            if let Ok(failure) = task.fail("Task processing error") {
                session.transition(&task, failure.old_status).await?;
                session.commit().await?;
            }
            Ok(())
        }
        .await;

        self.cache.invalidate(task_id).await;
        if let Err(e) = result {
            tracing::error!(
                task_id = %task_id,
                error = %e,
                "Failed to mark task as FAILED - it stays unfinished until restart recovery"
            );
        }
    }

    /// Current status and, once finished, results or failure diagnostic
    pub async fn get_task_result(&self, task_id: &TaskId) -> Result<TaskResult, TaskError> {
        if let Some(view) = self.cache.get(task_id).await {
            return Ok(view);
        }

        let task = {
            let mut session = self
                .store
                .begin()
                .await
                .map_err(|e| storage_failure("open session", e))?;
            session
                .get(task_id)
                .await
                .map_err(|e| storage_failure("load task", e))?
        }
        .ok_or_else(|| TaskError::TaskNotFound(task_id.to_string()))?;

        let view = TaskResult::from(&task);
        self.cache.admit(task_id, &view).await;
        Ok(view)
    }

    /// Startup recovery for work orphaned by a previous process.
    ///
    /// IN_PROGRESS tasks can never finish (their unit died with the process)
    /// and become FAILED. PENDING tasks were never claimed and are scheduled.
    pub async fn recover(&self) -> Result<RecoveryReport, TaskError> {
        let mut session = self
            .store
            .begin()
            .await
            .map_err(|e| storage_failure("open session", e))?;

        let interrupted = session
            .list_by_status(TaskStatus::InProgress)
            .await
            .map_err(|e| storage_failure("list interrupted tasks", e))?;

        let mut failed = 0;
        for task_id in &interrupted {
            let Some(mut task) = session
                .get(task_id)
                .await
                .map_err(|e| storage_failure("load task", e))?
            else {
                continue;
            };
            if task.fail(INTERRUPTED_REASON).is_ok()
                && session
                    .transition(&task, TaskStatus::InProgress)
                    .await
                    .map_err(|e| storage_failure("fail interrupted task", e))?
            {
                failed += 1;
            }
        }

        let pending = session
            .list_by_status(TaskStatus::Pending)
            .await
            .map_err(|e| storage_failure("list pending tasks", e))?;

        session
            .commit()
            .await
            .map_err(|e| storage_failure("commit recovery", e))?;

        let rescheduled = pending.len();
        for task_id in pending {
            self.schedule(task_id);
        }

        if failed > 0 || rescheduled > 0 {
            info!(failed, rescheduled, "Recovered tasks from previous run");
        }
        Ok(RecoveryReport { failed, rescheduled })
    }

    /// Wait for all scheduled background units to finish
    pub async fn wait_idle(&self) {
        self.scheduler.wait_idle().await;
    }
}
