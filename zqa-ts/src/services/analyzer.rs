//! Code-quality analysis adapter
//!
//! The lifecycle manager only sees the [`Analyzer`] trait; the stub below
//! stands in until a real scanner is wired up.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AnalysisReport, IssueCounts};

/// Analysis engine failure
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis failed: {0}")]
    Failed(String),
}

/// Analysis engine - a pure function of the archive bytes
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Engine identifier for logging
    fn engine_id(&self) -> &'static str;

    /// Produce a report for the archive
    async fn analyze(&self, archive: &[u8]) -> Result<AnalysisReport, AnalysisError>;
}

/// Fixed-output analyzer
#[derive(Debug, Clone, Copy, Default)]
pub struct StubAnalyzer;

impl StubAnalyzer {
    pub fn fixed_report() -> AnalysisReport {
        AnalysisReport {
            overall_coverage: 85.5,
            bugs: IssueCounts::new(2, 5, 5),
            code_smells: IssueCounts::new(3, 10, 7),
            vulnerabilities: IssueCounts::new(1, 2, 1),
        }
    }
}

#[async_trait]
impl Analyzer for StubAnalyzer {
    fn engine_id(&self) -> &'static str {
        "stub"
    }

    async fn analyze(&self, archive: &[u8]) -> Result<AnalysisReport, AnalysisError> {
        tracing::debug!(archive_bytes = archive.len(), "Running stub analysis");
        Ok(Self::fixed_report())
    }
}
