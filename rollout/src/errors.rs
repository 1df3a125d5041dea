//! Error types for the deployment pipeline

use std::time::Duration;

use thiserror::Error;

use crate::process::ProcessError;

/// Main error type for the pipeline and its collaborators
#[derive(Error, Debug)]
pub enum RolloutError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base configuration file not found: {0}")]
    ConfigNotFound(String),

    #[error("Failed to parse {kind} configuration: {message}")]
    ConfigParse { kind: &'static str, message: String },

    /// A failed validation rule or an unusable configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Non-zero exit (or failure to launch) of a git invocation
    #[error("Git command failed: {command}\nError: {message}")]
    GitCommand { command: String, message: String },

    /// Non-zero exit (or failure to launch) of a firebase invocation
    #[error("Firebase command failed: {command}\nError: {message}")]
    FirebaseCommand { command: String, message: String },

    #[error("{component} build failed: {message}")]
    Build {
        component: &'static str,
        message: String,
    },

    /// Invalid checkpoint reference or an unsupported rollback target
    #[error("Rollback error: {0}")]
    Rollback(String),

    /// Argument rejected before any executable was touched
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid encrypted text format")]
    InvalidEncryptedFormat,

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// An orchestration phase reported failure
    #[error("{0}")]
    Phase(String),

    #[error("Run cancelled before {0}")]
    Cancelled(String),

    #[error("Run deadline of {limit:?} exceeded before {step}")]
    DeadlineExceeded { step: String, limit: Duration },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for RolloutError {
    fn from(err: anyhow::Error) -> Self {
        RolloutError::Internal(err.to_string())
    }
}
