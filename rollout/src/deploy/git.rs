//! Git operations for the deployment pipeline

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::RolloutError;
use crate::process::{CommandRunner, CommandSpec};

/// Timeout applied to every git invocation
pub const GIT_TIMEOUT: Duration = Duration::from_secs(60);

const AFFECTED_FILES_SHOWN: usize = 3;

/// Kind of change being committed; selects the conventional prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Admin,
    Docs,
    #[default]
    Deploy,
    Feature,
    Fix,
    Refactor,
    Test,
    Chore,
}

impl ChangeType {
    pub fn prefix(&self) -> &'static str {
        match self {
            ChangeType::Admin => "admin",
            ChangeType::Docs => "docs",
            ChangeType::Deploy => "deploy",
            ChangeType::Feature => "feat",
            ChangeType::Fix => "fix",
            ChangeType::Refactor => "refactor",
            ChangeType::Test => "test",
            ChangeType::Chore => "chore",
        }
    }
}

/// Unknown change types fall back to `chore`
impl From<&str> for ChangeType {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "admin" => ChangeType::Admin,
            "docs" => ChangeType::Docs,
            "deploy" => ChangeType::Deploy,
            "feature" | "feat" => ChangeType::Feature,
            "fix" => ChangeType::Fix,
            "refactor" => ChangeType::Refactor,
            "test" => ChangeType::Test,
            _ => ChangeType::Chore,
        }
    }
}

/// Build a conventional commit message.
///
/// With affected files, a blank line and an `Affected files:` line follow,
/// listing at most three names and `and N more` for the rest.
pub fn generate_commit_message(
    change_type: ChangeType,
    description: &str,
    files: &[String],
) -> String {
    let mut message = format!("{}: {}", change_type.prefix(), description);

    if !files.is_empty() {
        let file_list = if files.len() > AFFECTED_FILES_SHOWN {
            format!(
                "{} and {} more",
                files[..AFFECTED_FILES_SHOWN].join(", "),
                files.len() - AFFECTED_FILES_SHOWN
            )
        } else {
            files.join(", ")
        };
        message.push_str(&format!("\n\nAffected files: {}", file_list));
    }

    message
}

/// Outcome of [`GitOperations::validate_working_directory`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingDirectoryValidation {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub branch: Option<String>,
    pub is_clean: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub staged_files: Vec<String>,
}

/// Options for [`GitOperations::auto_commit`]
#[derive(Debug, Clone)]
pub struct AutoCommitOptions {
    pub change_type: ChangeType,
    pub description: String,
    /// Stage only these files instead of everything
    pub files: Vec<String>,
    pub stage_all: bool,
    /// Commit with this exact message instead of a generated one
    pub message: Option<String>,
}

impl Default for AutoCommitOptions {
    fn default() -> Self {
        Self {
            change_type: ChangeType::Chore,
            description: "Automated commit".to_string(),
            files: Vec::new(),
            stage_all: true,
            message: None,
        }
    }
}

pub const NO_CHANGES_MESSAGE: &str = "No changes to commit";

/// Outcome of [`GitOperations::auto_commit`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOutcome {
    pub success: bool,
    pub message: String,
    pub commit_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub staged_files: Vec<String>,
}

impl CommitOutcome {
    fn nothing_to_commit() -> Self {
        Self {
            success: false,
            message: NO_CHANGES_MESSAGE.to_string(),
            commit_hash: None,
            commit_message: None,
            branch: None,
            staged_files: Vec::new(),
        }
    }

    pub fn is_nothing_to_commit(&self) -> bool {
        !self.success && self.message == NO_CHANGES_MESSAGE
    }
}

/// Git wrapper bound to one working tree
#[derive(Clone)]
pub struct GitOperations {
    working_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl GitOperations {
    pub fn new(working_dir: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            working_dir: working_dir.into(),
            runner,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Run `git <args>` in the working tree and return trimmed stdout
    pub async fn execute_git_command(&self, args: &[&str]) -> Result<String, RolloutError> {
        let spec = CommandSpec::new("git", args.iter().copied())
            .current_dir(&self.working_dir)
            .timeout(GIT_TIMEOUT);
        let command = args.join(" ");

        let output = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| RolloutError::GitCommand {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if !output.success() {
            return Err(RolloutError::GitCommand {
                command,
                message: output.failure_text(),
            });
        }

        Ok(output.stdout.trim().to_string())
    }

    pub async fn is_working_directory_clean(&self) -> Result<bool, RolloutError> {
        let status = self.execute_git_command(&["status", "--porcelain"]).await?;
        Ok(status.is_empty())
    }

    pub async fn current_branch(&self) -> Result<String, RolloutError> {
        self.execute_git_command(&["rev-parse", "--abbrev-ref", "HEAD"])
            .await
    }

    pub async fn last_commit_hash(&self) -> Result<String, RolloutError> {
        self.execute_git_command(&["rev-parse", "HEAD"]).await
    }

    /// Files currently in the index
    pub async fn staged_files(&self) -> Result<Vec<String>, RolloutError> {
        let staged = self
            .execute_git_command(&["diff", "--cached", "--name-only"])
            .await?;
        Ok(split_lines(&staged))
    }

    pub async fn stage_all_changes(&self) -> Result<(), RolloutError> {
        self.execute_git_command(&["add", "--all"]).await?;
        debug!("All changes staged");
        Ok(())
    }

    pub async fn stage_files(&self, files: &[String]) -> Result<(), RolloutError> {
        if files.is_empty() {
            return Err(RolloutError::Validation(
                "Files array is required and must not be empty".to_string(),
            ));
        }

        let mut args = vec!["add", "--"];
        args.extend(files.iter().map(String::as_str));
        self.execute_git_command(&args).await?;
        debug!("Files staged: {}", files.join(", "));
        Ok(())
    }

    /// Commit the index and return the new commit hash
    pub async fn create_commit(&self, message: &str) -> Result<String, RolloutError> {
        if message.trim().is_empty() {
            return Err(RolloutError::Validation(
                "Commit message is required and must not be empty".to_string(),
            ));
        }

        self.execute_git_command(&["commit", "-m", message]).await?;
        let hash = self.last_commit_hash().await?;
        info!("Commit created: {} - {}", short_hash(&hash), first_line(message));
        Ok(hash)
    }

    /// Aggregate repository checks; never fails, problems land in `issues`
    pub async fn validate_working_directory(&self, require_clean: bool) -> WorkingDirectoryValidation {
        let mut validation = WorkingDirectoryValidation {
            is_valid: true,
            ..Default::default()
        };

        if self
            .execute_git_command(&["rev-parse", "--git-dir"])
            .await
            .is_err()
        {
            validation.is_valid = false;
            validation.issues.push("Not in a Git repository".to_string());
            return validation;
        }

        if let Err(e) = self.inspect_repository(&mut validation, require_clean).await {
            validation.is_valid = false;
            validation.issues.push(format!("Git validation failed: {}", e));
        }

        validation
    }

    async fn inspect_repository(
        &self,
        validation: &mut WorkingDirectoryValidation,
        require_clean: bool,
    ) -> Result<(), RolloutError> {
        validation.branch = Some(self.current_branch().await?);
        validation.is_clean = self.is_working_directory_clean().await?;

        if require_clean && !validation.is_clean {
            validation.is_valid = false;
            validation
                .issues
                .push("Working directory has uncommitted changes".to_string());
        }

        validation.staged_files = self.staged_files().await?;
        Ok(())
    }

    /// Stage, then commit if the index is non-empty
    pub async fn auto_commit(&self, options: AutoCommitOptions) -> Result<CommitOutcome, RolloutError> {
        let validation = self.validate_working_directory(false).await;
        if !validation.is_valid {
            return Err(RolloutError::Validation(format!(
                "Git validation failed: {}",
                validation.issues.join(", ")
            )));
        }

        if !options.files.is_empty() {
            self.stage_files(&options.files).await?;
        } else if options.stage_all {
            self.stage_all_changes().await?;
        }

        let staged_files = self.staged_files().await?;
        if staged_files.is_empty() {
            info!("{}", NO_CHANGES_MESSAGE);
            return Ok(CommitOutcome::nothing_to_commit());
        }

        let commit_message = match options.message {
            Some(message) => message,
            None => generate_commit_message(options.change_type, &options.description, &staged_files),
        };
        let commit_hash = self.create_commit(&commit_message).await?;

        Ok(CommitOutcome {
            success: true,
            message: "Changes committed successfully".to_string(),
            commit_hash: Some(commit_hash),
            commit_message: Some(commit_message),
            branch: validation.branch,
            staged_files,
        })
    }

    /// Reset to `commit_hash`. Soft keeps working-tree edits, hard discards them.
    pub async fn revert_to_commit(&self, commit_hash: &str, hard: bool) -> Result<(), RolloutError> {
        if commit_hash.trim().is_empty() {
            return Err(RolloutError::Validation("Commit hash is required".to_string()));
        }

        let reset_type = if hard { "--hard" } else { "--soft" };
        self.execute_git_command(&["reset", reset_type, commit_hash])
            .await?;
        info!("Reverted to commit: {} ({})", short_hash(commit_hash), reset_type);
        Ok(())
    }

    /// Lightweight existence probe for a commit object
    pub async fn commit_exists(&self, commit_hash: &str) -> bool {
        if commit_hash.trim().is_empty() {
            return false;
        }
        let object = format!("{}^{{commit}}", commit_hash);
        self.execute_git_command(&["cat-file", "-e", &object])
            .await
            .is_ok()
    }

    /// One-line summaries of the most recent commits
    pub async fn recent_commits(&self, limit: usize) -> Result<Vec<String>, RolloutError> {
        let limit = format!("-{}", limit);
        let log = self
            .execute_git_command(&["log", "--oneline", &limit])
            .await?;
        Ok(split_lines(&log))
    }

    /// Value of a git config key, if set
    pub async fn config_value(&self, key: &str) -> Option<String> {
        self.execute_git_command(&["config", key])
            .await
            .ok()
            .filter(|v| !v.is_empty())
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn short_hash(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or(message)
}
