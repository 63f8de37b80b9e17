//! Job orchestration: strategy selection, stage sequencing, result joining
//! and cleanup.
//!
//! The orchestrator holds no per-job state between calls; everything a job
//! needs lives on the stack of [`Orchestrator::run`], so one orchestrator
//! can run many jobs concurrently.

use super::cleanup::{delete_artifacts, JobArtifacts};
use super::direct::run_direct;
use super::fanout::render_chunks;
use super::state::{JobState, JobStateMachine};
use super::strategy::select_strategy;
use crate::chunk::validate_chunks;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Stage};
use crate::job::{JobRequest, Session};
use crate::outcome::{CleanupReport, JobFailure, JobSuccess, PipelineOutcome, ProcessingMethod};
use crate::store::SharedStore;
use crate::workers::{MergeRequest, SliceRequest, SplitRequest, Workers};
use std::time::Instant;
use tracing::{error, info, warn};

/// Runs jobs against a fixed set of workers and an object store.
pub struct Orchestrator {
    workers: Workers,
    store: SharedStore,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(workers: Workers, store: SharedStore, config: PipelineConfig) -> Self {
        Self {
            workers,
            store,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Which strategy a job of `total_pages` pages would take.
    pub fn strategy_for(&self, total_pages: usize) -> ProcessingMethod {
        select_strategy(total_pages, self.config.chunk_threshold)
    }

    /// Run one job to completion.
    ///
    /// Never returns an error: every failure, including an invalid request,
    /// becomes a failed [`PipelineOutcome`] naming the stage.
    pub async fn run(&self, request: &JobRequest) -> PipelineOutcome {
        let start = Instant::now();
        let outcome = self.run_inner(request).await;

        match &outcome {
            PipelineOutcome::Succeeded(s) => info!(
                "Job finished: {} pages → {} ({:?}, {:.2}s)",
                s.total_pages,
                s.output_url,
                s.processing_method,
                start.elapsed().as_secs_f64()
            ),
            PipelineOutcome::Failed(f) => error!(
                "Job failed at {} stage after {:.2}s: {}",
                f.failed_stage,
                start.elapsed().as_secs_f64(),
                f.error
            ),
        }
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_job_complete(&outcome);
        }
        outcome
    }

    async fn run_inner(&self, request: &JobRequest) -> PipelineOutcome {
        if let Err(e) = request.validate() {
            return failed(&e, Stage::Validation);
        }

        let method = self.strategy_for(request.total_pages);
        info!(
            "{} pages, threshold {} → {:?} processing",
            request.total_pages, self.config.chunk_threshold, method
        );

        match method {
            ProcessingMethod::Direct => {
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_job_start(&request.output_path, request.total_pages, method);
                }
                run_direct(self.workers.direct.as_ref(), request).await
            }
            ProcessingMethod::Chunked => {
                let session = match Session::from_destination(&request.output_path) {
                    Ok(s) => s,
                    Err(e) => return failed(&e, Stage::Validation),
                };
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_job_start(session.id(), request.total_pages, method);
                }
                self.run_chunked(request, &session).await
            }
        }
    }

    async fn run_chunked(&self, request: &JobRequest, session: &Session) -> PipelineOutcome {
        let mut machine =
            JobStateMachine::new(session.id(), self.config.progress_callback.clone());
        let mut artifacts = JobArtifacts::default();

        let result = match self
            .execute_stages(request, session, &mut machine, &mut artifacts)
            .await
        {
            Ok(chunks) => machine.advance(JobState::CleaningUp).map(|()| chunks),
            Err(e) => Err(e),
        };

        match result {
            Ok(chunks_processed) => {
                let cleanup = self.cleanup(request, &artifacts).await;
                machine.finish(true);
                PipelineOutcome::Succeeded(JobSuccess {
                    output_url: request.output_path.clone(),
                    total_pages: request.total_pages,
                    processing_method: ProcessingMethod::Chunked,
                    chunks_processed: Some(chunks_processed),
                    cleanup: Some(cleanup),
                })
            }
            Err(e) => {
                let stage = machine.state().stage().unwrap_or(Stage::Slicing);
                machine.finish(false);
                self.cleanup(request, &artifacts).await;
                failed(&e, stage)
            }
        }
    }

    /// Stages 1–4. Returns the number of chunks merged.
    async fn execute_stages(
        &self,
        request: &JobRequest,
        session: &Session,
        machine: &mut JobStateMachine,
        artifacts: &mut JobArtifacts,
    ) -> Result<usize, PipelineError> {
        // ── Stage 1: slicing ─────────────────────────────────────────────
        machine.advance(JobState::Slicing)?;
        let treatments = request.applicable_treatments();
        if treatments.len() < request.treatments.len() {
            warn!(
                "Session {}: {} treatment(s) not used by {:?} layout, not sent to the slicer",
                session,
                request.treatments.len() - treatments.len(),
                request.layout_mode
            );
        }
        let sliced = self
            .workers
            .slicer
            .slice(&SliceRequest {
                session_id: session.id().to_string(),
                treatment_image_paths: treatments.clone(),
                total_pages: request.total_pages,
                page_layout_mode: request.layout_mode,
            })
            .await
            .map_err(|e| PipelineError::invocation(Stage::Slicing, e))?;
        artifacts.slices = sliced.sliced_paths;
        artifacts
            .slices
            .check_entries(treatments.keys().copied())
            .map_err(|d| PipelineError::violation(Stage::Slicing, d))?;

        // ── Stage 2: splitting ───────────────────────────────────────────
        machine.advance(JobState::Splitting)?;
        let split = self
            .workers
            .splitter
            .split(&SplitRequest {
                session_id: session.id().to_string(),
                source_document_path: request.source_path.clone(),
                total_pages: request.total_pages,
            })
            .await
            .map_err(|e| PipelineError::invocation(Stage::Splitting, e))?;
        let mut chunks = split.chunks;
        chunks.sort_by_key(|c| c.index);
        artifacts.chunks = chunks.clone();

        if split.total_chunks != chunks.len() {
            return Err(PipelineError::violation(
                Stage::Splitting,
                format!(
                    "reported {} chunks but returned {}",
                    split.total_chunks,
                    chunks.len()
                ),
            ));
        }
        validate_chunks(&chunks, request.total_pages)
            .map_err(|d| PipelineError::violation(Stage::Splitting, d))?;
        artifacts
            .slices
            .check_lengths(chunks.len())
            .map_err(|d| PipelineError::violation(Stage::Splitting, d))?;
        info!(
            "Session {}: {} chunks, {} treatment(s) sliced",
            session,
            chunks.len(),
            artifacts.slices.treatments().count()
        );

        // ── Stage 3: rendering ───────────────────────────────────────────
        machine.advance(JobState::Rendering)?;
        let fan_out = render_chunks(
            &self.workers.renderer,
            session,
            request,
            &chunks,
            &artifacts.slices,
            self.config.render_width(chunks.len()),
            self.config.progress_callback.as_ref(),
        )
        .await;
        artifacts.processed = fan_out.rendered.clone();
        for chunk in &mut artifacts.chunks {
            chunk.processed_path = artifacts.processed.get(&chunk.index).cloned();
        }
        if let Some(e) = fan_out.first_failure {
            return Err(e);
        }
        let processed_paths = fan_out.ordered_paths(chunks.len())?;

        // ── Stage 4: merging ─────────────────────────────────────────────
        machine.advance(JobState::Merging)?;
        let merged = self
            .workers
            .merger
            .merge(&MergeRequest {
                session_id: session.id().to_string(),
                processed_chunk_paths: processed_paths,
                total_chunks: chunks.len(),
                total_pages: request.total_pages,
                output_path: request.output_path.clone(),
            })
            .await
            .map_err(|e| PipelineError::invocation(Stage::Merging, e))?;
        if merged.total_pages != request.total_pages {
            return Err(PipelineError::violation(
                Stage::Merging,
                format!(
                    "merged document has {} pages, expected {}",
                    merged.total_pages, request.total_pages
                ),
            ));
        }

        Ok(chunks.len())
    }

    async fn cleanup(&self, request: &JobRequest, artifacts: &JobArtifacts) -> CleanupReport {
        let targets = artifacts.targets(request, self.config.purge_chunk_artifacts);
        let report = delete_artifacts(self.store.as_ref(), targets).await;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_cleanup_complete(&report);
        }
        report
    }
}

fn failed(err: &PipelineError, stage: Stage) -> PipelineOutcome {
    PipelineOutcome::Failed(JobFailure::from_error(err, stage))
}
