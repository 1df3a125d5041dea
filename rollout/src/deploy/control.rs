//! Cancellation and deadline for one pipeline run

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::RolloutError;

/// Shared stop signal plus an optional overall deadline.
///
/// Checked between steps. A running deploy command is also bound to it: the
/// token kills the process and its timeout is clamped to
/// [`RunControl::remaining`]. Rollback commands are never bound.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    token: CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deadline `limit` from now
    pub fn with_timeout(limit: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some((Instant::now() + limit, limit)),
        }
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Time left before the deadline; `None` without a deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|(at, _)| at.saturating_duration_since(Instant::now()))
    }

    /// Error if the run was cancelled or is out of time before `step`
    pub fn check(&self, step: &str) -> Result<(), RolloutError> {
        if self.token.is_cancelled() {
            return Err(RolloutError::Cancelled(step.to_string()));
        }
        if let Some((at, limit)) = self.deadline {
            if Instant::now() >= at {
                return Err(RolloutError::DeadlineExceeded {
                    step: step.to_string(),
                    limit,
                });
            }
        }
        Ok(())
    }
}
