//! Read-through cache of finished task views
//!
//! Only terminal views (SUCCESS / FAILED) are admitted. They can never
//! change again, so a cached entry is never stale; non-terminal polls
//! always go to the record store.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::TaskId;
use crate::services::task_service::TaskResult;

#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    entries: Arc<RwLock<HashMap<TaskId, TaskResult>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &TaskId) -> Option<TaskResult> {
        self.entries.read().await.get(id).cloned()
    }

    /// Cache `view` if it is terminal; returns whether it was admitted
    pub async fn admit(&self, id: &TaskId, view: &TaskResult) -> bool {
        if !view.status.is_terminal() {
            return false;
        }
        self.entries.write().await.insert(id.clone(), view.clone());
        true
    }

    pub async fn invalidate(&self, id: &TaskId) {
        self.entries.write().await.remove(id);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;

    fn view(status: TaskStatus) -> TaskResult {
        TaskResult {
            status,
            results: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_only_terminal_views_admitted() {
        let cache = ResultCache::new();
        let id = TaskId::from("a");

        assert!(!cache.admit(&id, &view(TaskStatus::Pending)).await);
        assert!(!cache.admit(&id, &view(TaskStatus::InProgress)).await);
        assert!(cache.get(&id).await.is_none());

        assert!(cache.admit(&id, &view(TaskStatus::Failed)).await);
        assert_eq!(cache.get(&id).await, Some(view(TaskStatus::Failed)));
    }

    #[tokio::test]
    async fn test_invalidate_removes_entry() {
        let cache = ResultCache::new();
        let id = TaskId::from("a");
        cache.admit(&id, &view(TaskStatus::Failed)).await;

        cache.invalidate(&id).await;

        assert!(cache.get(&id).await.is_none());
        assert_eq!(cache.len().await, 0);
    }
}
