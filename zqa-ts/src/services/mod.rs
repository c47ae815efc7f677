//! Service layer: lifecycle manager and the adapters it drives

pub mod analyzer;
pub mod archive_validator;
pub mod blob_store;
pub mod result_cache;
pub mod scheduler;
pub mod task_service;

pub use analyzer::{AnalysisError, Analyzer, StubAnalyzer};
pub use archive_validator::{validate_archive, ArchiveError, ArchiveSummary};
pub use blob_store::{BlobError, BlobStore, FsBlobStore, MemoryBlobStore};
pub use result_cache::ResultCache;
pub use scheduler::{BackgroundScheduler, ErrorSink};
pub use task_service::{ByteSource, RecoveryReport, TaskResult, TaskService, UploadPolicy};
