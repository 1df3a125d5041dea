//! External collaborators of the orchestrator
//!
//! Each is consumed as a black box through a trait. The default
//! implementations shell out and parse the tool's JSON answer.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::model::{AdminConfig, DocumentationConfig};
use crate::deploy::firebase::FirebaseDeployment;
use crate::errors::RolloutError;
use crate::process::{CommandRunner, CommandSpec};

const TOOL_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Admin bootstrap
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSetupResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

/// Creates the default administrator account
#[async_trait]
pub trait AdminBootstrap: Send + Sync {
    async fn initialize_admin(&self, admin: &AdminConfig) -> Result<AdminSetupResult, RolloutError>;
}

/// Calls the `initializeDefaultAdmin` cloud function
pub struct FirebaseAdminBootstrap {
    firebase: FirebaseDeployment,
    runner: Arc<dyn CommandRunner>,
}

impl FirebaseAdminBootstrap {
    pub fn new(firebase: FirebaseDeployment, runner: Arc<dyn CommandRunner>) -> Self {
        Self { firebase, runner }
    }
}

#[async_trait]
impl AdminBootstrap for FirebaseAdminBootstrap {
    async fn initialize_admin(&self, admin: &AdminConfig) -> Result<AdminSetupResult, RolloutError> {
        let probe = CommandSpec::new("firebase", ["--version"]).timeout(PROBE_TIMEOUT);
        match self.runner.run(&probe).await {
            Ok(output) if output.success() => {}
            _ => {
                return Err(RolloutError::Phase(
                    "Firebase CLI not found. Please install Firebase CLI first.".to_string(),
                ))
            }
        }

        let output = self
            .firebase
            .execute_firebase_command(&["functions:call", "initializeDefaultAdmin"])
            .await?;
        let mut result: AdminSetupResult = serde_json::from_str(&output)?;

        if !result.success {
            return Err(RolloutError::Phase(
                result
                    .message
                    .unwrap_or_else(|| "Admin initialization failed".to_string()),
            ));
        }

        result.email.get_or_insert_with(|| admin.default_email.clone());
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Documentation manager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentationResult {
    pub success: bool,
    #[serde(default)]
    pub files_organized: usize,
    /// Backup directory, when one was made
    #[serde(default)]
    pub backup_created: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

/// Reorganizes project documentation
#[async_trait]
pub trait DocumentationManager: Send + Sync {
    async fn organize(&self, settings: &DocumentationConfig) -> Result<DocumentationResult, RolloutError>;
}

/// Runs the configured documentation tool (`documentation.command`)
pub struct CommandDocumentationManager {
    working_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl CommandDocumentationManager {
    pub fn new(working_dir: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            working_dir: working_dir.into(),
            runner,
        }
    }
}

#[async_trait]
impl DocumentationManager for CommandDocumentationManager {
    async fn organize(&self, settings: &DocumentationConfig) -> Result<DocumentationResult, RolloutError> {
        let Some((program, base_args)) = settings.command.split_first() else {
            return Err(RolloutError::Configuration(
                "documentation.command is empty".to_string(),
            ));
        };

        let mut args = base_args.to_vec();
        if settings.create_backup {
            args.push("--backup".to_string());
        }
        if settings.use_git_mv {
            args.push("--git-mv".to_string());
        }
        if settings.update_references {
            args.push("--update-references".to_string());
        }

        let spec = CommandSpec::new(program.clone(), args)
            .current_dir(&self.working_dir)
            .timeout(TOOL_TIMEOUT);
        let output = self.runner.run(&spec).await?;
        if !output.success() {
            return Err(RolloutError::Phase(format!(
                "Documentation organization failed: {}",
                output.failure_text()
            )));
        }

        let result: DocumentationResult = serde_json::from_str(output.stdout.trim())?;
        debug!("Documentation organized: {} file(s)", result.files_organized);
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Environment validator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCheck {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

/// Named check report; only the aggregate is consumed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentReport {
    pub checks: Vec<NamedCheck>,
}

impl EnvironmentReport {
    /// No check failed (warnings are fine)
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.status != CheckStatus::Fail)
    }

    pub fn failures(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
            .count()
    }
}

/// Produces a pre-flight environment report
#[async_trait]
pub trait EnvironmentValidator: Send + Sync {
    async fn validate(&self) -> Result<EnvironmentReport, RolloutError>;
}

/// Probes the tools the pipeline shells out to
pub struct ToolchainValidator {
    working_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl ToolchainValidator {
    pub fn new(working_dir: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            working_dir: working_dir.into(),
            runner,
        }
    }

    async fn probe(&self, name: &str, program: &str, args: &[&str], hint: &str) -> NamedCheck {
        let spec = CommandSpec::new(program, args.iter().copied())
            .current_dir(&self.working_dir)
            .timeout(PROBE_TIMEOUT);

        match self.runner.run(&spec).await {
            Ok(output) if output.success() => NamedCheck {
                name: name.to_string(),
                status: CheckStatus::Pass,
                message: output.stdout.trim().lines().next().unwrap_or("ok").to_string(),
            },
            _ => NamedCheck {
                name: name.to_string(),
                status: CheckStatus::Fail,
                message: hint.to_string(),
            },
        }
    }
}

#[async_trait]
impl EnvironmentValidator for ToolchainValidator {
    async fn validate(&self) -> Result<EnvironmentReport, RolloutError> {
        let mut checks = vec![
            self.probe("Node.js Version", "node", &["--version"], "Node.js not found")
                .await,
            self.probe("NPM Version", "npm", &["--version"], "NPM not found")
                .await,
            self.probe(
                "Git Configuration",
                "git",
                &["config", "user.email"],
                "Git not found or not configured",
            )
            .await,
            self.probe(
                "Firebase CLI",
                "firebase",
                &["--version"],
                "Firebase CLI not found. Install with: npm install -g firebase-tools",
            )
            .await,
        ];

        // Missing login is recoverable by the deploy step's own auth check
        let mut auth = self
            .probe(
                "Firebase Authentication",
                "firebase",
                &["projects:list"],
                "Firebase not authenticated. Run: firebase login",
            )
            .await;
        if auth.status == CheckStatus::Fail {
            auth.status = CheckStatus::Warn;
        }
        checks.push(auth);

        Ok(EnvironmentReport { checks })
    }
}
