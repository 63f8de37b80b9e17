//! Direct path: hand the whole job to one delegate and relay its answer.
//!
//! No session, no intermediate artifacts, no cleanup.

use crate::error::{PipelineError, Stage};
use crate::job::JobRequest;
use crate::outcome::{JobFailure, JobSuccess, PipelineOutcome, ProcessingMethod};
use crate::workers::DirectProcessor;
use tracing::{info, warn};

/// Invoke `processor` once and translate its result.
pub async fn run_direct(processor: &dyn DirectProcessor, request: &JobRequest) -> PipelineOutcome {
    info!(
        "Processing {} pages directly ({})",
        request.total_pages, request.source_path
    );
    match processor.process(request).await {
        Ok(resp) => PipelineOutcome::Succeeded(JobSuccess {
            output_url: resp.output_url,
            total_pages: resp.total_pages,
            processing_method: ProcessingMethod::Direct,
            chunks_processed: None,
            cleanup: None,
        }),
        Err(e) => {
            warn!("Direct processing failed: {}", e);
            let err = PipelineError::invocation(Stage::Direct, e);
            PipelineOutcome::Failed(JobFailure::from_error(&err, Stage::Direct))
        }
    }
}
