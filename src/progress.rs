//! Progress-callback trait for per-job, per-state and per-chunk events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the orchestrator moves through its stages.
//!
//! # Example
//!
//! ```rust
//! use edgequake_edgeprint::{PipelineConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     rendered: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_chunk_complete(&self, index: usize, total_chunks: usize) {
//!         let done = self.rendered.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("chunk {index} done ({done}/{total_chunks})");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { rendered: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::outcome::{CleanupReport, PipelineOutcome, ProcessingMethod};
use crate::pipeline::JobState;
use std::sync::Arc;

/// Called by the orchestrator as it processes a job.
///
/// Implementations must be `Send + Sync`: chunk events fire from concurrent
/// rendering invocations, in completion order. All methods have default
/// no-op implementations so callers only override what they care about.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once, after strategy selection. `job` is the session id on the
    /// chunked path and the destination path on the direct path.
    fn on_job_start(&self, job: &str, total_pages: usize, method: ProcessingMethod) {
        let _ = (job, total_pages, method);
    }

    /// Called on every state-machine transition of a chunked job.
    fn on_state_change(&self, from: JobState, to: JobState) {
        let _ = (from, to);
    }

    /// Called just before the rendering worker is invoked for a chunk.
    fn on_chunk_start(&self, index: usize, total_chunks: usize) {
        let _ = (index, total_chunks);
    }

    /// Called when a chunk has been rendered.
    fn on_chunk_complete(&self, index: usize, total_chunks: usize) {
        let _ = (index, total_chunks);
    }

    /// Called when rendering a chunk failed.
    fn on_chunk_error(&self, index: usize, total_chunks: usize, error: &str) {
        let _ = (index, total_chunks, error);
    }

    /// Called exactly once per chunked job, success or failure.
    fn on_cleanup_complete(&self, report: &CleanupReport) {
        let _ = report;
    }

    /// Called once with the job's terminal outcome.
    fn on_job_complete(&self, outcome: &PipelineOutcome) {
        let _ = outcome;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
