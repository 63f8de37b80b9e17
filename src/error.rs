//! Error types for the edgequake-edgeprint library.
//!
//! Three distinct error types reflect three distinct failure modes:
//!
//! * [`PipelineError`]: **fatal**, the job cannot produce its output
//!   (a stage worker failed, a worker broke its contract, the request or
//!   configuration is invalid). Surfaced to the caller as a failed
//!   [`crate::outcome::PipelineOutcome`] naming the stage.
//!
//! * [`WorkerError`]: what a stage worker returns when it cannot do its
//!   job. The orchestrator wraps it into
//!   [`PipelineError::StageInvocation`] for the stage that called it.
//!
//! * [`PartialCleanupError`]: **non-fatal**, one intermediate artifact
//!   could not be deleted. Stored in [`crate::outcome::CleanupReport`] and
//!   logged; it never changes the job's reported outcome.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One phase of the pipeline, as named in failed outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Request validation before any worker is called.
    Validation,
    /// Stage 1: cut treatment images into per-chunk fragments.
    Slicing,
    /// Stage 2: split the source document into page-range chunks.
    Splitting,
    /// Stage 3: composite every chunk with its fragments, in parallel.
    Rendering,
    /// Stage 4: concatenate the processed chunks in ordinal order.
    Merging,
    /// Single-invocation processing for small documents.
    Direct,
}

impl Stage {
    /// Position in the chunked pipeline (1–4), if the stage is part of it.
    pub fn number(self) -> Option<u8> {
        match self {
            Stage::Slicing => Some(1),
            Stage::Splitting => Some(2),
            Stage::Rendering => Some(3),
            Stage::Merging => Some(4),
            Stage::Validation | Stage::Direct => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Validation => "validation",
            Stage::Slicing => "slicing",
            Stage::Splitting => "splitting",
            Stage::Rendering => "rendering",
            Stage::Merging => "merging",
            Stage::Direct => "direct",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All fatal errors returned by the edgequake-edgeprint library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Stage errors ──────────────────────────────────────────────────────
    /// The called worker itself returned failure.
    #[error("{stage} worker failed: {message}")]
    StageInvocation { stage: Stage, message: String },

    /// A worker reported success but its output violates an invariant.
    #[error("{stage} contract violation: {detail}")]
    ContractViolation { stage: Stage, detail: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// The job request is malformed.
    #[error("Invalid job request: {0}")]
    InvalidRequest(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Storage errors ────────────────────────────────────────────────────
    /// An object store read/write/delete failed.
    #[error("Object store error at '{path}': {source}")]
    Store {
        path: String,
        #[source]
        source: object_store::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Wrap a worker failure into a stage invocation error.
    pub fn invocation(stage: Stage, err: WorkerError) -> Self {
        PipelineError::StageInvocation {
            stage,
            message: err.to_string(),
        }
    }

    pub fn violation(stage: Stage, detail: impl Into<String>) -> Self {
        PipelineError::ContractViolation {
            stage,
            detail: detail.into(),
        }
    }

    /// The stage this error is attributed to in a failed outcome.
    ///
    /// Errors raised outside a worker call (bad request, bad config) are
    /// attributed to [`Stage::Validation`]; storage and internal errors carry
    /// no stage of their own and take `fallback`.
    pub fn stage_or(&self, fallback: Stage) -> Stage {
        match self {
            PipelineError::StageInvocation { stage, .. }
            | PipelineError::ContractViolation { stage, .. } => *stage,
            PipelineError::InvalidRequest(_) | PipelineError::InvalidConfig(_) => {
                Stage::Validation
            }
            PipelineError::Store { .. } | PipelineError::Internal(_) => fallback,
        }
    }
}

/// Failure reported by a stage worker, whatever its transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkerError {
    /// The worker answered, but with `success: false`.
    #[error("worker reported failure: {0}")]
    Rejected(String),

    /// The worker could not be reached or timed out.
    #[error("transport error: {0}")]
    Transport(String),

    /// The worker's answer could not be understood.
    #[error("malformed worker response: {0}")]
    Decode(String),
}

/// A non-fatal failure to delete one intermediate artifact.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("could not delete '{path}': {detail}")]
pub struct PartialCleanupError {
    pub path: String,
    pub detail: String,
}
