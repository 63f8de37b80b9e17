//! Stage 3 fan-out: one rendering invocation per chunk.
//!
//! Invocations run concurrently up to the configured width and complete in
//! any order. Results are keyed by chunk ordinal, never by arrival, so the
//! merge order is fixed by the split regardless of which chunk finishes
//! first.
//!
//! On the first failure no further invocations are dispatched. Those already
//! in flight are allowed to finish; their results are kept only so cleanup
//! can find them.

use crate::chunk::{Chunk, SliceSet};
use crate::error::{PipelineError, Stage};
use crate::job::{JobRequest, Session};
use crate::progress::ProgressCallback;
use crate::workers::{RenderRequest, RenderingWorker};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Joined result of a fan-out.
#[derive(Debug, Default)]
pub struct FanOut {
    /// Processed chunk path by chunk index, for every chunk that succeeded.
    pub rendered: BTreeMap<usize, String>,
    /// The first failure observed, by completion order.
    pub first_failure: Option<PipelineError>,
    /// Chunks never dispatched because an earlier one had already failed.
    pub skipped: usize,
}

impl FanOut {
    /// Processed paths in ascending chunk order.
    ///
    /// Fails unless every index in `0..chunk_count` produced a path and no
    /// two chunks produced the same one.
    pub fn ordered_paths(&self, chunk_count: usize) -> Result<Vec<String>, PipelineError> {
        if let Some(missing) = (0..chunk_count).find(|i| !self.rendered.contains_key(i)) {
            return Err(PipelineError::violation(
                Stage::Rendering,
                format!("no processed output for chunk {missing}"),
            ));
        }
        if let Some(extra) = self.rendered.keys().find(|&&i| i >= chunk_count) {
            return Err(PipelineError::violation(
                Stage::Rendering,
                format!("processed output for unknown chunk {extra}"),
            ));
        }

        let mut owners: HashMap<&str, usize> = HashMap::with_capacity(chunk_count);
        for (&index, path) in &self.rendered {
            if path.trim().is_empty() {
                return Err(PipelineError::violation(
                    Stage::Rendering,
                    format!("chunk {index} returned an empty processed path"),
                ));
            }
            if let Some(first) = owners.insert(path.as_str(), index) {
                return Err(PipelineError::violation(
                    Stage::Rendering,
                    format!("chunks {first} and {index} both wrote '{path}'"),
                ));
            }
        }

        Ok(self.rendered.values().cloned().collect())
    }
}

enum Attempt {
    Done(Result<String, String>),
    Skipped,
}

/// Render every chunk and join the results.
pub async fn render_chunks(
    renderer: &Arc<dyn RenderingWorker>,
    session: &Session,
    request: &JobRequest,
    chunks: &[Chunk],
    slices: &SliceSet,
    width: usize,
    progress: Option<&ProgressCallback>,
) -> FanOut {
    let total_chunks = chunks.len();
    let aborted = Arc::new(AtomicBool::new(false));
    debug!(
        "Rendering {} chunks with fan-out width {} for session {}",
        total_chunks, width, session
    );

    let mut in_flight = stream::iter(chunks.iter().map(|chunk| {
        let renderer = Arc::clone(renderer);
        let aborted = Arc::clone(&aborted);
        let progress = progress.cloned();
        let req = RenderRequest {
            session_id: session.id().to_string(),
            chunk_path: chunk.source_path.clone(),
            chunk_index: chunk.index,
            total_chunks,
            start_page: chunk.start_page,
            end_page: chunk.end_page,
            sliced_paths: slices.clone(),
            bleed_mode: request.bleed_mode,
            layout_mode: request.layout_mode,
            trim_size: request.trim_size,
        };
        async move {
            if aborted.load(Ordering::SeqCst) {
                return (req.chunk_index, Attempt::Skipped);
            }
            if let Some(ref cb) = progress {
                cb.on_chunk_start(req.chunk_index, total_chunks);
            }
            let result = renderer
                .render(&req)
                .await
                .map(|resp| resp.processed_chunk_path)
                .map_err(|e| e.to_string());
            if result.is_err() {
                aborted.store(true, Ordering::SeqCst);
            }
            if let Some(ref cb) = progress {
                match &result {
                    Ok(_) => cb.on_chunk_complete(req.chunk_index, total_chunks),
                    Err(e) => cb.on_chunk_error(req.chunk_index, total_chunks, e),
                }
            }
            (req.chunk_index, Attempt::Done(result))
        }
    }))
    .buffer_unordered(width.max(1));

    let mut out = FanOut::default();
    while let Some((index, attempt)) = in_flight.next().await {
        match attempt {
            Attempt::Skipped => out.skipped += 1,
            Attempt::Done(Ok(path)) => {
                debug!("Chunk {} rendered to {}", index, path);
                out.rendered.insert(index, path);
            }
            Attempt::Done(Err(message)) => {
                warn!("Chunk {}/{} failed to render: {}", index, total_chunks, message);
                if out.first_failure.is_none() {
                    out.first_failure = Some(PipelineError::StageInvocation {
                        stage: Stage::Rendering,
                        message: format!("chunk {index}: {message}"),
                    });
                }
            }
        }
    }

    if out.skipped > 0 {
        warn!(
            "{} chunk(s) were not dispatched after an earlier failure",
            out.skipped
        );
    }
    out
}
