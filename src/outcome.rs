//! The single terminal result of one job.
//!
//! Exactly one [`PipelineOutcome`] is produced per job; partial results are
//! never exposed. Its JSON form is what a hosting process prints or returns:
//!
//! ```text
//! {"success":true,"outputUrl":"job-42/output.pdf","totalPages":120,
//!  "processingMethod":"chunked","chunksProcessed":3}
//! {"success":false,"error":"rendering worker failed: …","failedStage":"rendering",
//!  "errorKind":"stage-invocation"}
//! ```

use crate::error::{PartialCleanupError, PipelineError, Stage};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Which strategy processed the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMethod {
    Direct,
    Chunked,
}

/// What the cleanup step managed to delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    /// Number of deletions attempted.
    pub attempted: usize,
    /// Number of artifacts actually deleted.
    pub deleted: usize,
    /// Targets that were not in the store. Usually means the workers wrote
    /// to a different store than the one cleanup ran against.
    pub already_gone: usize,
    /// Deletions that failed; logged, never escalated.
    pub failures: Vec<PartialCleanupError>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A job that produced its output.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSuccess {
    pub output_url: String,
    pub total_pages: usize,
    pub processing_method: ProcessingMethod,
    /// Number of chunks rendered; chunked path only.
    pub chunks_processed: Option<usize>,
    /// Cleanup result; chunked path only.
    pub cleanup: Option<CleanupReport>,
}

/// Category of a fatal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    StageInvocation,
    ContractViolation,
    InvalidRequest,
    Storage,
    Internal,
}

/// A job that failed before producing output.
#[derive(Debug, Clone, PartialEq)]
pub struct JobFailure {
    pub error: String,
    pub failed_stage: Stage,
    pub kind: FailureKind,
}

impl JobFailure {
    pub fn from_error(err: &PipelineError, fallback_stage: Stage) -> Self {
        let kind = match err {
            PipelineError::StageInvocation { .. } => FailureKind::StageInvocation,
            PipelineError::ContractViolation { .. } => FailureKind::ContractViolation,
            PipelineError::InvalidRequest(_) | PipelineError::InvalidConfig(_) => {
                FailureKind::InvalidRequest
            }
            PipelineError::Store { .. } => FailureKind::Storage,
            PipelineError::Internal(_) => FailureKind::Internal,
        };
        Self {
            error: err.to_string(),
            failed_stage: err.stage_or(fallback_stage),
            kind,
        }
    }
}

/// Terminal result of one job.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Succeeded(JobSuccess),
    Failed(JobFailure),
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Succeeded(_))
    }

    /// Process exit status for a hosting binary: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            PipelineOutcome::Failed(f) => Some(f.failed_stage),
            PipelineOutcome::Succeeded(_) => None,
        }
    }

    pub fn success(&self) -> Option<&JobSuccess> {
        match self {
            PipelineOutcome::Succeeded(s) => Some(s),
            PipelineOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        match self {
            PipelineOutcome::Failed(f) => Some(f),
            PipelineOutcome::Succeeded(_) => None,
        }
    }
}

impl Serialize for PipelineOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match self {
            PipelineOutcome::Succeeded(s) => {
                map.serialize_entry("success", &true)?;
                map.serialize_entry("outputUrl", &s.output_url)?;
                map.serialize_entry("totalPages", &s.total_pages)?;
                map.serialize_entry("processingMethod", &s.processing_method)?;
                if let Some(n) = s.chunks_processed {
                    map.serialize_entry("chunksProcessed", &n)?;
                }
                if let Some(report) = s
                    .cleanup
                    .as_ref()
                    .filter(|r| !r.is_clean() || r.already_gone > 0)
                {
                    map.serialize_entry("cleanup", report)?;
                }
            }
            PipelineOutcome::Failed(f) => {
                map.serialize_entry("success", &false)?;
                map.serialize_entry("error", &f.error)?;
                map.serialize_entry("failedStage", &f.failed_stage)?;
                map.serialize_entry("errorKind", &f.kind)?;
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;

    #[test]
    fn chunked_success_json() {
        let outcome = PipelineOutcome::Succeeded(JobSuccess {
            output_url: "job-42/output.pdf".into(),
            total_pages: 120,
            processing_method: ProcessingMethod::Chunked,
            chunks_processed: Some(3),
            cleanup: Some(CleanupReport::default()),
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["processingMethod"], "chunked");
        assert_eq!(json["chunksProcessed"], 3);
        assert_eq!(json["totalPages"], 120);
        assert!(json.get("cleanup").is_none(), "clean report is omitted");
        assert_eq!(outcome.exit_code(), 0);
    }

    #[test]
    fn direct_success_omits_chunk_count() {
        let outcome = PipelineOutcome::Succeeded(JobSuccess {
            output_url: "https://cdn.example/out.pdf".into(),
            total_pages: 30,
            processing_method: ProcessingMethod::Direct,
            chunks_processed: None,
            cleanup: None,
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["processingMethod"], "direct");
        assert!(json.get("chunksProcessed").is_none());
    }

    #[test]
    fn dirty_cleanup_is_reported_on_success() {
        let outcome = PipelineOutcome::Succeeded(JobSuccess {
            output_url: "o.pdf".into(),
            total_pages: 60,
            processing_method: ProcessingMethod::Chunked,
            chunks_processed: Some(2),
            cleanup: Some(CleanupReport {
                attempted: 2,
                deleted: 1,
                already_gone: 0,
                failures: vec![PartialCleanupError {
                    path: "s/slices/primary/0001.png".into(),
                    detail: "denied".into(),
                }],
            }),
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["cleanup"]["deleted"], 1);
    }

    #[test]
    fn missing_targets_are_reported_on_success() {
        let outcome = PipelineOutcome::Succeeded(JobSuccess {
            output_url: "o.pdf".into(),
            total_pages: 60,
            processing_method: ProcessingMethod::Chunked,
            chunks_processed: Some(2),
            cleanup: Some(CleanupReport {
                attempted: 2,
                deleted: 0,
                already_gone: 2,
                failures: Vec::new(),
            }),
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["cleanup"]["alreadyGone"], 2);
        assert_eq!(json["cleanup"]["deleted"], 0);
    }

    #[test]
    fn failure_json_names_stage() {
        let err = PipelineError::invocation(Stage::Rendering, WorkerError::Transport("reset".into()));
        let outcome = PipelineOutcome::Failed(JobFailure::from_error(&err, Stage::Rendering));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["failedStage"], "rendering");
        assert_eq!(json["errorKind"], "stage-invocation");
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(outcome.failed_stage(), Some(Stage::Rendering));
    }
}
