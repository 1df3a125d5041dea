//! Orchestrator options

use std::path::PathBuf;

use crate::config::manager::ConfigManagerOptions;

pub const DEFAULT_ORCHESTRATOR_LOG: &str = "logs/system-orchestrator.log";

/// Main orchestrator options
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Preview every phase without side effects
    pub dry_run: bool,

    /// Repository the phases operate on
    pub working_dir: PathBuf,

    /// Configuration file locations
    pub config: ConfigManagerOptions,

    /// JSON-lines results log; `None` disables it
    pub log_path: Option<PathBuf>,

    /// Deployment phase commit description
    pub commit_message: String,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            working_dir: PathBuf::from("."),
            config: ConfigManagerOptions::default(),
            log_path: Some(PathBuf::from(DEFAULT_ORCHESTRATOR_LOG)),
            commit_message: "System orchestration: automated deployment".to_string(),
        }
    }
}

/// Phases to skip in [`execute_complete_setup`](super::run::SystemOrchestrator::execute_complete_setup)
#[derive(Debug, Clone, Copy, Default)]
pub struct SetupOptions {
    pub skip_admin: bool,
    pub skip_docs: bool,
    pub skip_deploy: bool,
}
