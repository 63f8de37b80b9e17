//! # edgequake-edgeprint
//!
//! Orchestrate edge-printing jobs: composite artwork onto the page edges of
//! a print-ready document, splitting large documents into chunks that are
//! rendered in parallel.
//!
//! ## Why this crate?
//!
//! Compositing a treatment image onto hundreds of pages in one invocation
//! hits the time and memory ceilings of most worker runtimes. Instead this
//! crate cuts the work into page-range chunks, fans the chunks out to
//! independent rendering workers, and joins the results in page order,
//! however the workers happen to finish. Small documents skip all of that
//! and go to a single direct worker.
//!
//! ## Pipeline Overview
//!
//! ```text
//! JobRequest
//!  │
//!  ├─ 0. Strategy  pages ≤ threshold → direct, otherwise chunked
//!  ├─ 1. Slice     treatment images → one fragment per chunk
//!  ├─ 2. Split     source document  → page-range chunks
//!  ├─ 3. Render    every chunk in parallel (fan-out/join by ordinal)
//!  ├─ 4. Merge     processed chunks in ascending order → output
//!  └─ 5. Cleanup   delete fragments (and optionally chunk artifacts)
//! ```
//!
//! The stage workers are traits ([`workers`]); the crate ships a
//! JSON-over-HTTP client for a remote worker service and an in-process
//! image slicer.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_edgeprint::{
//!     create_store, HttpWorkerConfig, HttpWorkers, JobRequest, Orchestrator,
//!     PipelineConfig, StoreLocation, Workers,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = create_store(&StoreLocation::Memory)?;
//!     let http = Arc::new(HttpWorkers::new(HttpWorkerConfig::new("http://localhost:8080"))?);
//!     let orchestrator = Orchestrator::new(
//!         Workers::from_shared(http),
//!         store,
//!         PipelineConfig::default(),
//!     );
//!
//!     let request: JobRequest = serde_json::from_str(r#"{
//!         "sourceDocumentPath": "uploads/book.pdf",
//!         "treatmentImagePaths": {"primary": "uploads/edge.png"},
//!         "totalPages": 120,
//!         "outputPath": "job-42/output.pdf"
//!     }"#)?;
//!
//!     let outcome = orchestrator.run(&request).await;
//!     println!("{}", serde_json::to_string(&outcome)?);
//!     std::process::exit(outcome.exit_code());
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `edgeprint` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-edgeprint = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod chunk;
pub mod config;
pub mod error;
pub mod job;
pub mod outcome;
pub mod pipeline;
pub mod progress;
pub mod store;
pub mod workers;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use chunk::{plan_chunks, validate_chunks, Chunk, PageRange, SliceSet};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{PartialCleanupError, PipelineError, Stage, WorkerError};
pub use job::{BleedMode, JobRequest, LayoutMode, Session, TreatmentName, TrimSize};
pub use outcome::{CleanupReport, FailureKind, JobFailure, JobSuccess, PipelineOutcome, ProcessingMethod};
pub use pipeline::{select_strategy, JobState, Orchestrator};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use store::{create_store, SharedStore, StoreLocation};
pub use workers::http::{HttpWorkerConfig, HttpWorkers, WorkerEndpoints};
pub use workers::slicer::ImageSlicer;
pub use workers::{
    DirectProcessor, MergingWorker, RenderingWorker, SlicingWorker, SplittingWorker, Workers,
};
