//! The chunked document processing pipeline.
//!
//! Each submodule owns one concern of the orchestration and can be tested
//! on its own with fake workers.
//!
//! ## Data Flow
//!
//! ```text
//! JobRequest ─▶ strategy ─┬─ pages ≤ threshold ─▶ direct ──────────────────────────┐
//!                         └─ pages > threshold ─▶ slice ─▶ split ─▶ render×N        │
//!                                                   ─▶ merge ─▶ cleanup ──────────▶ PipelineOutcome
//! ```
//!
//! 1. [`strategy`]: pure choice between direct and chunked processing
//! 2. [`state`]: the job state machine, rejects out-of-order stages
//! 3. [`fanout`]: stage 3, one rendering invocation per chunk joined by ordinal
//! 4. [`cleanup`]: always-run deletion of intermediate artifacts
//! 5. [`direct`]: single-invocation delegate for small jobs
//! 6. [`orchestrator`]: sequences the above into one outcome per job

pub mod cleanup;
pub mod direct;
pub mod fanout;
pub mod orchestrator;
pub mod state;
pub mod strategy;

pub use orchestrator::Orchestrator;
pub use state::JobState;
pub use strategy::select_strategy;
