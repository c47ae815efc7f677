//! Background execution of task processing
//!
//! Units run on spawned tokio tasks tracked by a [`TaskTracker`], so that
//! shutdown can wait for in-flight work. A unit's error has no caller to
//! return to: it is logged and recorded in the [`ErrorSink`], whose latest
//! entry `/health` reports.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::task::TaskTracker;

use crate::error::TaskError;
use crate::models::TaskId;

/// Destination for background failures
#[derive(Debug, Clone, Default)]
pub struct ErrorSink {
    last_error: Arc<RwLock<Option<String>>>,
    failures: Arc<AtomicU64>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, task_id: &TaskId, error: &TaskError) {
        tracing::error!(task_id = %task_id, error = %error, "Background task processing failed");
        self.failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.write().await = Some(format!("task {}: {}", task_id, error));
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Spawns and tracks background units
#[derive(Debug, Clone, Default)]
pub struct BackgroundScheduler {
    tracker: TaskTracker,
    errors: ErrorSink,
}

impl BackgroundScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> &ErrorSink {
        &self.errors
    }

    /// Run `unit` detached from the caller
    pub fn spawn<F>(&self, task_id: TaskId, unit: F)
    where
        F: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let errors = self.errors.clone();
        self.tracker.spawn(async move {
            tracing::debug!(task_id = %task_id, "Background unit started");
            match unit.await {
                Ok(()) => tracing::debug!(task_id = %task_id, "Background unit finished"),
                Err(e) => errors.record(&task_id, &e).await,
            }
        });
    }

    /// Units spawned and not yet finished
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every spawned unit to finish
    pub async fn wait_idle(&self) {
        // A closed tracker's wait() resolves once it is empty; reopen so
        // later spawns are still tracked.
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stop accepting new units and wait for in-flight ones
    pub async fn shutdown(&self) {
        self.tracker.close();
        tracing::info!(in_flight = self.tracker.len(), "Waiting for background units");
        self.tracker.wait().await;
    }
}
