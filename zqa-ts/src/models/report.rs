//! Code-quality report produced by the analysis adapter
//!
//! Field names are part of the public `/results` payload and must stay stable.

use serde::{Deserialize, Serialize};

/// Issue counts for one report section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IssueCounts {
    pub total: u32,
    pub critical: u32,
    pub major: u32,
    pub minor: u32,
}

impl IssueCounts {
    pub fn new(critical: u32, major: u32, minor: u32) -> Self {
        Self {
            total: critical + major + minor,
            critical,
            major,
            minor,
        }
    }
}

/// Analysis result for one uploaded archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Line coverage percentage (0.0 - 100.0)
    pub overall_coverage: f64,
    pub bugs: IssueCounts,
    pub code_smells: IssueCounts,
    pub vulnerabilities: IssueCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_counts_total_is_sum_of_severities() {
        let counts = IssueCounts::new(3, 10, 7);
        assert_eq!(counts.total, 20);
    }

    #[test]
    fn test_report_json_field_names() {
        let report = AnalysisReport {
            overall_coverage: 85.5,
            bugs: IssueCounts::new(2, 5, 5),
            code_smells: IssueCounts::new(3, 10, 7),
            vulnerabilities: IssueCounts::new(1, 2, 1),
        };

        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["overall_coverage"], 85.5);
        assert_eq!(json["bugs"]["total"], 12);
        assert_eq!(json["code_smells"]["major"], 10);
        assert_eq!(json["vulnerabilities"]["minor"], 1);
    }
}
