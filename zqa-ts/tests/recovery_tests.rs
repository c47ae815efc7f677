//! Restart recovery against a file-backed database

mod helpers;

use helpers::{open_service, valid_zip};
use zqa_ts::db::{SqliteTaskStore, TaskSession, TaskStore};
use zqa_ts::models::{Task, TaskId, TaskStatus};
use zqa_ts::services::task_service::INTERRUPTED_REASON;

const LIMIT: u64 = 100 * 1024 * 1024;

#[tokio::test]
async fn test_restart_fails_interrupted_and_finishes_pending() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("zqa.db");
    let blob_root = temp_dir.path().join("blobs");

    // First run: two tasks stored, one of them claimed when the process died
    let (interrupted, pending) = {
        let service = open_service(&db_path, &blob_root, LIMIT).await;
        let store = SqliteTaskStore::new(zqa_common::db::init_database(&db_path).await.unwrap());

        let mut ids = Vec::new();
        for _ in 0..2 {
            let id = TaskId::generate();
            let mut session = store.begin().await.unwrap();
            service
                .create_task(session.as_mut(), &id, valid_zip())
                .await
                .unwrap();
            session.commit().await.unwrap();
            ids.push(id);
        }

        let mut session = store.begin().await.unwrap();
        let mut claimed: Task = session.get(&ids[0]).await.unwrap().unwrap();
        claimed.start().unwrap();
        session.update(&claimed).await.unwrap();
        session.commit().await.unwrap();

        (ids[0].clone(), ids[1].clone())
    };

    // Second run
    let service = open_service(&db_path, &blob_root, LIMIT).await;
    let report = service.recover().await.unwrap();
    service.wait_idle().await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.rescheduled, 1);

    let failed = service.get_task_result(&interrupted).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some(INTERRUPTED_REASON));
    assert!(failed.results.is_none());

    let finished = service.get_task_result(&pending).await.unwrap();
    assert_eq!(finished.status, TaskStatus::Success);
    assert!(finished.results.is_some());
}

#[tokio::test]
async fn test_recover_on_empty_database_is_noop() {
    let temp_dir = tempfile::tempdir().unwrap();
    let service = open_service(
        &temp_dir.path().join("zqa.db"),
        &temp_dir.path().join("blobs"),
        LIMIT,
    )
    .await;

    let report = service.recover().await.unwrap();

    assert_eq!(report.failed, 0);
    assert_eq!(report.rescheduled, 0);
}
