//! Configuration types for the chunked processing pipeline.
//!
//! All orchestration behaviour is controlled through [`PipelineConfig`],
//! built via its [`PipelineConfigBuilder`]. Transport settings (base URL,
//! per-request timeout) belong to the worker implementation and live in
//! [`crate::workers::http::HttpWorkerConfig`] instead.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use std::fmt;

/// Page count at or below which a job takes the direct path.
pub const DEFAULT_CHUNK_THRESHOLD: usize = 50;

/// Pages per chunk assumed by the in-process slicer.
pub const DEFAULT_PAGES_PER_CHUNK: usize = 40;

/// Configuration for one [`crate::pipeline::Orchestrator`].
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_edgeprint::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .chunk_threshold(80)
///     .max_concurrent_renders(8)
///     .build()
///     .unwrap();
/// assert_eq!(config.chunk_threshold, 80);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Largest page count processed in a single direct invocation. Default: 50.
    ///
    /// A page count equal to the threshold still takes the direct path.
    pub chunk_threshold: usize,

    /// Pages per chunk. Default: 40.
    ///
    /// The splitter owns chunking; this value must match it so the
    /// in-process slicer cuts one fragment per chunk. Must be even so that
    /// both sides of a leaf land in the same chunk.
    pub pages_per_chunk: usize,

    /// Upper bound on in-flight rendering invocations. Default: `None`.
    ///
    /// `None` dispatches one invocation per chunk at once, so fan-out width
    /// equals the chunk count. Set a limit when page counts are high enough
    /// that the rendering backend cannot absorb that many calls.
    pub max_concurrent_renders: Option<usize>,

    /// Also delete split chunks and processed chunks during cleanup. Default: false.
    ///
    /// Treatment fragments are always deleted. The source document and the
    /// final output are never deleted.
    pub purge_chunk_artifacts: bool,

    /// Receives per-job, per-state and per-chunk events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            pages_per_chunk: DEFAULT_PAGES_PER_CHUNK,
            max_concurrent_renders: None,
            purge_chunk_artifacts: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("chunk_threshold", &self.chunk_threshold)
            .field("pages_per_chunk", &self.pages_per_chunk)
            .field("max_concurrent_renders", &self.max_concurrent_renders)
            .field("purge_chunk_artifacts", &self.purge_chunk_artifacts)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Fan-out width for `chunk_count` chunks.
    pub fn render_width(&self, chunk_count: usize) -> usize {
        let all = chunk_count.max(1);
        self.max_concurrent_renders.map_or(all, |limit| limit.clamp(1, all))
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn chunk_threshold(mut self, pages: usize) -> Self {
        self.config.chunk_threshold = pages;
        self
    }

    pub fn pages_per_chunk(mut self, pages: usize) -> Self {
        self.config.pages_per_chunk = pages;
        self
    }

    pub fn max_concurrent_renders(mut self, n: usize) -> Self {
        self.config.max_concurrent_renders = Some(n.max(1));
        self
    }

    pub fn unbounded_renders(mut self) -> Self {
        self.config.max_concurrent_renders = None;
        self
    }

    pub fn purge_chunk_artifacts(mut self, v: bool) -> Self {
        self.config.purge_chunk_artifacts = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.chunk_threshold == 0 {
            return Err(PipelineError::InvalidConfig(
                "chunk threshold must be ≥ 1".into(),
            ));
        }
        if c.pages_per_chunk < 2 || c.pages_per_chunk % 2 != 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "pages per chunk must be an even number ≥ 2, got {}",
                c.pages_per_chunk
            )));
        }
        Ok(self.config)
    }
}
