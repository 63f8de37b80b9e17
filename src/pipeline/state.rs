//! Job state machine for the chunked path.
//!
//! ```text
//! Idle → Slicing → Splitting → Rendering → Merging → CleaningUp → Succeeded
//!   └───────┴─────────┴───────────┴──────────┴──────────────────▶ Failed
//! ```
//!
//! Forward moves are validated so a stage can never start before its
//! predecessor succeeded. Cleanup after a failure happens once the machine
//! is already `Failed`; it is a post-terminal step, not a state.

use crate::error::{PipelineError, Stage};
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Idle,
    Slicing,
    Splitting,
    Rendering,
    Merging,
    CleaningUp,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// The pipeline stage running in this state, if any.
    pub fn stage(self) -> Option<Stage> {
        match self {
            JobState::Slicing => Some(Stage::Slicing),
            JobState::Splitting => Some(Stage::Splitting),
            JobState::Rendering => Some(Stage::Rendering),
            JobState::Merging => Some(Stage::Merging),
            _ => None,
        }
    }

    /// The only state reachable from `self` on success.
    pub fn next(self) -> Option<JobState> {
        match self {
            JobState::Idle => Some(JobState::Slicing),
            JobState::Slicing => Some(JobState::Splitting),
            JobState::Splitting => Some(JobState::Rendering),
            JobState::Rendering => Some(JobState::Merging),
            JobState::Merging => Some(JobState::CleaningUp),
            JobState::CleaningUp => Some(JobState::Succeeded),
            JobState::Succeeded | JobState::Failed => None,
        }
    }
}

/// Tracks one job's state and reports transitions.
pub struct JobStateMachine {
    session: String,
    state: JobState,
    progress: Option<ProgressCallback>,
}

impl JobStateMachine {
    pub fn new(session: impl Into<String>, progress: Option<ProgressCallback>) -> Self {
        Self {
            session: session.into(),
            state: JobState::Idle,
            progress,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Move forward to `to`, which must be the successor of the current state.
    pub fn advance(&mut self, to: JobState) -> Result<(), PipelineError> {
        if self.state.next() != Some(to) || to == JobState::Succeeded {
            return Err(PipelineError::Internal(format!(
                "illegal transition {:?} → {:?} in session {}",
                self.state, to, self.session
            )));
        }
        self.set(to);
        Ok(())
    }

    /// Enter a terminal state. Success is only reachable from `CleaningUp`.
    pub fn finish(&mut self, succeeded: bool) {
        if self.state.is_terminal() {
            warn!(
                "Session {}: already {:?}, ignoring second finish",
                self.session, self.state
            );
            return;
        }
        let to = if succeeded && self.state == JobState::CleaningUp {
            JobState::Succeeded
        } else {
            JobState::Failed
        };
        self.set(to);
    }

    fn set(&mut self, to: JobState) {
        let from = self.state;
        self.state = to;
        info!("Session {}: {:?} → {:?}", self.session, from, to);
        if let Some(ref cb) = self.progress {
            cb.on_state_change(from, to);
        }
    }
}
