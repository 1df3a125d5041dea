//! Finite State Machine for a pipeline run

use serde::{Deserialize, Serialize};

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    /// Nothing has run yet
    Init,

    /// Working directory checks
    Validating,

    /// Checkpoint captured; nothing mutated yet
    Checkpointed,

    /// Staging and committing
    Committing,

    /// Targets are being deployed
    Deploying,

    /// Every target deployed
    Succeeded,

    /// Reversing a failed deployment
    RollingBack,

    /// Deployment failed; rolled back or left as is
    RolledBackOrFailed,

    /// Stopped by a pre-deploy failure
    Aborted,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Succeeded | PipelineState::RolledBackOrFailed | PipelineState::Aborted
        )
    }
}

/// Pipeline event
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Start working directory validation
    Validate,

    /// Checkpoint created
    Checkpoint,

    /// Start committing
    Commit,

    /// Start deploying
    Deploy,

    /// All targets succeeded
    DeploySucceeded,

    /// Some target failed, no rollback will follow
    DeployFailed(String),

    /// Some target failed, rollback starts
    RollbackStarted(String),

    /// Rollback finished (with or without errors)
    RollbackFinished,

    /// Pre-deploy failure
    Abort(String),
}

/// Pipeline FSM; records every state it passes through
#[derive(Debug, Clone)]
pub struct PipelineFsm {
    state: PipelineState,
    error: Option<String>,
    history: Vec<PipelineState>,
}

impl PipelineFsm {
    /// Create a new FSM in init state
    pub fn new() -> Self {
        Self {
            state: PipelineState::Init,
            error: None,
            history: vec![PipelineState::Init],
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// States visited so far, oldest first
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: PipelineEvent) -> Result<PipelineState, String> {
        let new_state = match (&self.state, &event) {
            // From Init
            (PipelineState::Init, PipelineEvent::Validate) => PipelineState::Validating,
            (PipelineState::Init, PipelineEvent::Checkpoint) => PipelineState::Checkpointed,

            // From Validating
            (PipelineState::Validating, PipelineEvent::Checkpoint) => PipelineState::Checkpointed,

            // From Checkpointed
            (PipelineState::Checkpointed, PipelineEvent::Commit) => PipelineState::Committing,
            (PipelineState::Checkpointed, PipelineEvent::Deploy) => PipelineState::Deploying,

            // From Committing
            (PipelineState::Committing, PipelineEvent::Deploy) => PipelineState::Deploying,

            // From Deploying
            (PipelineState::Deploying, PipelineEvent::DeploySucceeded) => PipelineState::Succeeded,
            (PipelineState::Deploying, PipelineEvent::DeployFailed(err)) => {
                self.error = Some(err.clone());
                PipelineState::RolledBackOrFailed
            }
            (PipelineState::Deploying, PipelineEvent::RollbackStarted(err)) => {
                self.error = Some(err.clone());
                PipelineState::RollingBack
            }

            // From RollingBack
            (PipelineState::RollingBack, PipelineEvent::RollbackFinished) => {
                PipelineState::RolledBackOrFailed
            }

            // Pre-deploy failures
            (
                PipelineState::Init
                | PipelineState::Validating
                | PipelineState::Checkpointed
                | PipelineState::Committing,
                PipelineEvent::Abort(err),
            ) => {
                self.error = Some(err.clone());
                PipelineState::Aborted
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        self.history.push(new_state);
        Ok(new_state)
    }
}

impl Default for PipelineFsm {
    fn default() -> Self {
        Self::new()
    }
}
