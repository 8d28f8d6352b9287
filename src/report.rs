use crate::config::BackendKind;
use crate::error::{JarSourcesError, UserFriendlyError};
use crate::pipeline::{ArchiveOutcome, ArchiveReport};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED_UNITS: i32 = 2;
pub const EXIT_FAILED_ARCHIVES: i32 = 3;
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveStatus {
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveEntry {
    pub source: PathBuf,
    pub status: ArchiveStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ArchiveReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub archives_total: usize,
    pub archives_succeeded: usize,
    pub archives_failed: usize,
    pub archives_cancelled: usize,
    pub units_total: usize,
    pub units_failed: usize,
    pub duration_ms: u64,
}

/// Everything a run produced, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub generated_at: DateTime<Utc>,
    pub destination: PathBuf,
    pub backend: BackendKind,
    pub archives: Vec<ArchiveEntry>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn from_outcomes(
        outcomes: Vec<ArchiveOutcome>,
        destination: &Path,
        backend: BackendKind,
        duration: Duration,
    ) -> Self {
        let mut summary = BatchSummary {
            archives_total: outcomes.len(),
            duration_ms: duration.as_millis() as u64,
            ..BatchSummary::default()
        };

        let archives = outcomes
            .into_iter()
            .map(|outcome| match outcome.result {
                Ok(report) => {
                    summary.archives_succeeded += 1;
                    summary.units_total += report.units_total;
                    summary.units_failed += report.failed_unit_names.len();
                    ArchiveEntry {
                        source: outcome.source,
                        status: ArchiveStatus::Succeeded,
                        report: Some(report),
                        error: None,
                    }
                }
                Err(JarSourcesError::Cancelled) => {
                    summary.archives_cancelled += 1;
                    ArchiveEntry {
                        source: outcome.source,
                        status: ArchiveStatus::Cancelled,
                        report: None,
                        error: None,
                    }
                }
                Err(e) => {
                    summary.archives_failed += 1;
                    ArchiveEntry {
                        source: outcome.source,
                        status: ArchiveStatus::Failed,
                        report: None,
                        error: Some(e.user_message()),
                    }
                }
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            destination: destination.to_path_buf(),
            backend,
            archives,
            summary,
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.summary.archives_cancelled > 0 {
            EXIT_CANCELLED
        } else if self.summary.archives_failed > 0 {
            EXIT_FAILED_ARCHIVES
        } else if self.summary.units_failed > 0 {
            EXIT_FAILED_UNITS
        } else {
            EXIT_SUCCESS
        }
    }
}
