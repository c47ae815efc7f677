//! Shared fixtures for zqa-ts integration tests

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request},
};
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};
use zqa_ts::api::StaticTokenAuthenticator;
use zqa_ts::db::SqliteTaskStore;
use tokio::sync::Semaphore;
use zqa_ts::models::AnalysisReport;
use zqa_ts::services::{
    AnalysisError, Analyzer, FsBlobStore, StubAnalyzer, TaskService, UploadPolicy,
};
use zqa_ts::{build_router, AppState};

pub const BOUNDARY: &str = "zqa-test-boundary";

/// Router plus handles for inspecting side effects
pub struct TestApp {
    pub router: axum::Router,
    pub service: TaskService,
    pub blob_root: PathBuf,
    pub db_path: PathBuf,
    // Keeps the database and blob directory alive
    pub temp_dir: TempDir,
}

pub struct TestAppBuilder {
    max_upload_bytes: u64,
    auth_tokens: Vec<String>,
    analyzer: Arc<dyn Analyzer>,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self {
            max_upload_bytes: 100 * 1024 * 1024,
            auth_tokens: Vec::new(),
            analyzer: Arc::new(StubAnalyzer),
        }
    }
}

impl TestAppBuilder {
    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn auth_tokens(mut self, tokens: &[&str]) -> Self {
        self.auth_tokens = tokens.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub async fn build(self) -> TestApp {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("zqa.db");
        let blob_root = temp_dir.path().join("blobs");

        let service =
            open_service_with(&db_path, &blob_root, self.max_upload_bytes, self.analyzer).await;
        let state = AppState::new(
            service.clone(),
            Arc::new(StaticTokenAuthenticator::new(self.auth_tokens)),
        );

        TestApp {
            router: build_router(state),
            service,
            blob_root,
            db_path,
            temp_dir,
        }
    }
}

/// Service over a file-backed database and blob directory
pub async fn open_service(db_path: &std::path::Path, blob_root: &std::path::Path, max_upload_bytes: u64) -> TaskService {
    open_service_with(db_path, blob_root, max_upload_bytes, Arc::new(StubAnalyzer)).await
}

pub async fn open_service_with(
    db_path: &std::path::Path,
    blob_root: &std::path::Path,
    max_upload_bytes: u64,
    analyzer: Arc<dyn Analyzer>,
) -> TaskService {
    let pool = zqa_common::db::init_database(db_path)
        .await
        .expect("Failed to initialize database");
    let blobs = FsBlobStore::open(blob_root)
        .await
        .expect("Failed to open blob store");

    TaskService::new(
        Arc::new(SqliteTaskStore::new(pool)),
        Arc::new(blobs),
        analyzer,
        UploadPolicy {
            max_upload_bytes,
            accepted_extension: "zip".to_string(),
            max_uncompressed_bytes: zqa_common::config::DEFAULT_MAX_UNCOMPRESSED_BYTES,
        },
    )
}

/// Small valid archive with one text entry
pub fn valid_zip() -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("dummy.txt", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"This is dummy text.").unwrap();
    writer.finish().unwrap().into_inner()
}

/// Valid stored (uncompressed) archive of exactly `len` bytes
pub fn stored_zip_of_len(len: usize) -> Vec<u8> {
    fn build(content: &[u8]) -> Vec<u8> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("padding.txt", options).unwrap();
        writer.write_all(content).unwrap();
        writer.finish().unwrap().into_inner()
    }

    let overhead = build(b"").len();
    assert!(len >= overhead, "archive framing alone is {} bytes", overhead);
    let archive = build(&vec![b'x'; len - overhead]);
    assert_eq!(archive.len(), len);
    archive
}

/// Analyzer that blocks every run until `release` is called
pub struct GatedAnalyzer {
    gate: Semaphore,
}

impl GatedAnalyzer {
    pub fn closed() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
        })
    }

    pub fn release(&self) {
        // Permits return on drop, so one opens the gate for every run
        self.gate.add_permits(1);
    }
}

#[async_trait::async_trait]
impl Analyzer for GatedAnalyzer {
    fn engine_id(&self) -> &'static str {
        "gated"
    }

    async fn analyze(&self, _archive: &[u8]) -> Result<AnalysisReport, AnalysisError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| AnalysisError::Failed(e.to_string()))?;
        Ok(StubAnalyzer::fixed_report())
    }
}

/// multipart/form-data body with a single file field
pub fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// POST /upload with an accurate Content-Length
pub fn upload_request(filename: &str, content: &[u8]) -> Request<Body> {
    let body = multipart_body("file", filename, content);
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Number of files in the blob directory
pub fn blob_count(app: &TestApp) -> usize {
    std::fs::read_dir(&app.blob_root)
        .map(|entries| entries.count())
        .unwrap_or(0)
}
