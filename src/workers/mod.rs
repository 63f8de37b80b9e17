//! Stage workers: typed interfaces and their transports.
//!
//! Each pipeline stage is performed by an external collaborator behind one
//! async trait. The orchestrator only ever sees these traits, so any mix of
//! transports can be injected:
//!
//! ```text
//! SlicingWorker    ──▶ slice treatment images into per-chunk fragments
//! SplittingWorker  ──▶ split the source document into page-range chunks
//! RenderingWorker  ──▶ composite one chunk with its fragments
//! MergingWorker    ──▶ concatenate processed chunks in ordinal order
//! DirectProcessor  ──▶ process a small job in one invocation
//! ```
//!
//! 1. [`http`]: JSON-over-HTTP client for a remote worker service; all
//!    five traits
//! 2. [`slicer`]: in-process [`SlicingWorker`] that cuts images with the
//!    `image` crate and writes fragments to the object store
//!
//! Request and response types double as the JSON wire format (camelCase).

pub mod http;
pub mod slicer;

use crate::chunk::{Chunk, SliceSet};
use crate::error::WorkerError;
use crate::job::{BleedMode, JobRequest, LayoutMode, TreatmentName, TrimSize};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ── Wire types ───────────────────────────────────────────────────────────

/// Stage 1 input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceRequest {
    pub session_id: String,
    pub treatment_image_paths: BTreeMap<TreatmentName, String>,
    pub total_pages: usize,
    pub page_layout_mode: LayoutMode,
}

/// Stage 1 output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceResponse {
    #[serde(default)]
    pub sliced_paths: SliceSet,
}

/// Stage 2 input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitRequest {
    pub session_id: String,
    pub source_document_path: String,
    pub total_pages: usize,
}

/// Stage 2 output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitResponse {
    pub chunks: Vec<Chunk>,
    pub total_chunks: usize,
}

/// Stage 3 input, one per chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub session_id: String,
    pub chunk_path: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub start_page: usize,
    pub end_page: usize,
    pub sliced_paths: SliceSet,
    pub bleed_mode: BleedMode,
    pub layout_mode: LayoutMode,
    pub trim_size: TrimSize,
}

/// Stage 3 output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResponse {
    pub processed_chunk_path: String,
}

/// Stage 4 input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub session_id: String,
    /// Ordered by ascending chunk index.
    pub processed_chunk_paths: Vec<String>,
    pub total_chunks: usize,
    pub total_pages: usize,
    pub output_path: String,
}

/// Stage 4 output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResponse {
    /// Page count of the merged document.
    pub total_pages: usize,
}

/// Direct-path output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectResponse {
    pub output_url: String,
    pub total_pages: usize,
}

// ── Traits ───────────────────────────────────────────────────────────────

/// Stage 1: cuts treatment images into per-chunk fragments.
#[async_trait]
pub trait SlicingWorker: Send + Sync {
    async fn slice(&self, request: &SliceRequest) -> Result<SliceResponse, WorkerError>;
}

/// Stage 2: splits the source document into page-range chunks.
#[async_trait]
pub trait SplittingWorker: Send + Sync {
    async fn split(&self, request: &SplitRequest) -> Result<SplitResponse, WorkerError>;
}

/// Stage 3: composites one chunk with its fragments.
///
/// Invoked concurrently, once per chunk. Implementations must not depend on
/// any other chunk's state and must write to a path unique to the chunk.
#[async_trait]
pub trait RenderingWorker: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse, WorkerError>;
}

/// Stage 4: concatenates processed chunks, preserving the given order.
#[async_trait]
pub trait MergingWorker: Send + Sync {
    async fn merge(&self, request: &MergeRequest) -> Result<MergeResponse, WorkerError>;
}

/// Processes a whole small job in one invocation.
#[async_trait]
pub trait DirectProcessor: Send + Sync {
    async fn process(&self, request: &JobRequest) -> Result<DirectResponse, WorkerError>;
}

/// The full set of collaborators an orchestrator needs.
#[derive(Clone)]
pub struct Workers {
    pub slicer: Arc<dyn SlicingWorker>,
    pub splitter: Arc<dyn SplittingWorker>,
    pub renderer: Arc<dyn RenderingWorker>,
    pub merger: Arc<dyn MergingWorker>,
    pub direct: Arc<dyn DirectProcessor>,
}

impl Workers {
    /// Use one value for every stage (e.g. a single HTTP client).
    pub fn from_shared<W>(worker: Arc<W>) -> Self
    where
        W: SlicingWorker
            + SplittingWorker
            + RenderingWorker
            + MergingWorker
            + DirectProcessor
            + 'static,
    {
        Self {
            slicer: worker.clone(),
            splitter: worker.clone(),
            renderer: worker.clone(),
            merger: worker.clone(),
            direct: worker,
        }
    }

    /// Replace the slicing worker, keeping the others.
    pub fn with_slicer(mut self, slicer: Arc<dyn SlicingWorker>) -> Self {
        self.slicer = slicer;
        self
    }
}
