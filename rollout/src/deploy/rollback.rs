//! Checkpoints and best-effort reversal of failed deployments

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::model::DeploymentTarget;
use crate::deploy::firebase::{DeploymentStatus, DeploymentSummary, FirebaseDeployment};
use crate::deploy::git::{short_hash, GitOperations};
use crate::errors::RolloutError;

const RECENT_COMMITS_PROBED: usize = 5;

/// Snapshot taken before any commit or deploy; never mutated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub timestamp: DateTime<Utc>,
    pub git_commit: String,
    pub git_branch: String,
    pub working_directory_clean: bool,
    pub firebase_status: DeploymentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetType {
    Soft,
    Hard,
}

/// Result of one reversal attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_type: Option<ResetType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RollbackOutcome {
    fn failed(error: &RolloutError) -> Self {
        Self {
            success: false,
            commit_hash: None,
            reset_type: None,
            output: None,
            error: Some(error.to_string()),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackKind {
    GitRollback,
    FirebaseRollback,
}

/// One entry of the append-only rollback log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackAction {
    #[serde(rename = "type")]
    pub kind: RollbackKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<DeploymentTarget>,
    pub outcome: RollbackOutcome,
}

/// Result of [`DeploymentRollback::perform_automatic_rollback`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackReport {
    pub triggered: bool,
    pub timestamp: DateTime<Utc>,
    /// Commit the rollback returned to
    pub checkpoint: String,
    /// Git reversal first, then one entry per failed target
    pub actions: Vec<RollbackAction>,
    /// Every action succeeded
    pub success: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitCapability {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_commits: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirebaseCapability {
    pub hosting: bool,
    /// Always false; functions can only be redeployed
    pub functions: bool,
}

/// Pre-flight report on which rollback mechanisms are usable right now
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackCapability {
    pub can_rollback: bool,
    pub issues: Vec<String>,
    pub git: GitCapability,
    pub firebase: FirebaseCapability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RollbackStarted,
    RollbackCompleted,
}

/// Sent to every registered [`FailureNotifier`] around an automatic rollback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureNotification {
    pub kind: NotificationKind,
    pub timestamp: DateTime<Utc>,
    pub project: String,
    pub checkpoint_commit: String,
    pub failed_targets: Vec<DeploymentTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_success: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<RollbackAction>,
}

/// Receives deployment failure notifications
#[async_trait]
pub trait FailureNotifier: Send + Sync {
    async fn notify(&self, notification: &FailureNotification) -> Result<(), RolloutError>;
}

/// Writes notifications to the log
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl FailureNotifier for TracingNotifier {
    async fn notify(&self, notification: &FailureNotification) -> Result<(), RolloutError> {
        let targets: Vec<&str> = notification
            .failed_targets
            .iter()
            .map(DeploymentTarget::as_str)
            .collect();

        match notification.kind {
            NotificationKind::RollbackStarted => error!(
                project = %notification.project,
                checkpoint = %short_hash(&notification.checkpoint_commit),
                "Deployment failed for [{}], rolling back",
                targets.join(", ")
            ),
            NotificationKind::RollbackCompleted => warn!(
                project = %notification.project,
                success = ?notification.rollback_success,
                "Rollback finished with {} action(s)",
                notification.actions.len()
            ),
        }
        Ok(())
    }
}

/// Reverses git history and hosting releases
#[derive(Clone)]
pub struct DeploymentRollback {
    git: GitOperations,
    firebase: FirebaseDeployment,
    notifiers: Vec<Arc<dyn FailureNotifier>>,
}

impl DeploymentRollback {
    pub fn new(git: GitOperations, firebase: FirebaseDeployment) -> Self {
        Self {
            git,
            firebase,
            notifiers: Vec::new(),
        }
    }

    pub fn add_notification_handler(&mut self, notifier: Arc<dyn FailureNotifier>) {
        self.notifiers.push(notifier);
    }

    /// A failing handler is logged and skipped
    async fn send_notification(&self, notification: FailureNotification) {
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(&notification).await {
                warn!("Notification handler failed: {}", e);
            }
        }
    }

    pub async fn create_deployment_checkpoint(&self) -> Result<Checkpoint, RolloutError> {
        let snapshot = async {
            Ok::<_, RolloutError>(Checkpoint {
                timestamp: Utc::now(),
                git_commit: self.git.last_commit_hash().await?,
                git_branch: self.git.current_branch().await?,
                working_directory_clean: self.git.is_working_directory_clean().await?,
                firebase_status: self.firebase.get_deployment_status().await,
            })
        };

        let checkpoint = snapshot.await.map_err(|e| {
            RolloutError::Rollback(format!("Failed to create deployment checkpoint: {}", e))
        })?;
        info!(
            "Deployment checkpoint created: {}",
            short_hash(&checkpoint.git_commit)
        );
        Ok(checkpoint)
    }

    /// Reset to `commit_hash` after probing that it exists. An unknown hash
    /// is reported without touching the tree.
    pub async fn rollback_git_changes(&self, commit_hash: &str, hard: bool) -> RollbackOutcome {
        info!("Rolling back Git changes to: {}", short_hash(commit_hash));

        if !self.git.commit_exists(commit_hash).await {
            let mut outcome = RollbackOutcome::failed(&RolloutError::Rollback(format!(
                "Invalid commit hash: {}",
                commit_hash
            )));
            outcome.commit_hash = Some(commit_hash.to_string());
            return outcome;
        }

        match self.git.revert_to_commit(commit_hash, hard).await {
            Ok(()) => RollbackOutcome {
                success: true,
                commit_hash: Some(commit_hash.to_string()),
                reset_type: Some(if hard { ResetType::Hard } else { ResetType::Soft }),
                output: None,
                error: None,
                timestamp: Utc::now(),
            },
            Err(e) => {
                let mut outcome = RollbackOutcome::failed(&e);
                outcome.commit_hash = Some(commit_hash.to_string());
                outcome
            }
        }
    }

    /// Roll one target back to its previous remote state.
    ///
    /// Only hosting keeps release history. Functions cannot be reverted
    /// without a redeploy, so that case always fails.
    pub async fn rollback_firebase_deployment(&self, target: DeploymentTarget) -> RollbackOutcome {
        info!("Rolling back Firebase {}...", target);

        match self.rollback_target(target).await {
            Ok(output) => RollbackOutcome {
                success: true,
                commit_hash: None,
                reset_type: None,
                output: Some(output),
                error: None,
                timestamp: Utc::now(),
            },
            Err(e) => {
                warn!("Rollback of {} failed: {}", target, e);
                RollbackOutcome::failed(&e)
            }
        }
    }

    async fn rollback_target(&self, target: DeploymentTarget) -> Result<String, RolloutError> {
        match target {
            DeploymentTarget::Hosting => {
                let releases = self.firebase.finalized_releases(2).await?;
                let previous = releases
                    .get(1)
                    .and_then(|line| line.split_whitespace().next())
                    .ok_or_else(|| {
                        RolloutError::Rollback(
                            "No previous hosting release found for rollback".to_string(),
                        )
                    })?;

                self.firebase
                    .execute_firebase_command(&["hosting:releases:rollback", previous])
                    .await
            }
            DeploymentTarget::Functions => Err(RolloutError::Rollback(
                "Functions rollback requires redeploying from previous Git commit".to_string(),
            )),
            other => Err(RolloutError::Rollback(format!(
                "Rollback not supported for target: {}",
                other
            ))),
        }
    }

    /// Reverse a failed deployment.
    ///
    /// Callers only invoke this for an unsuccessful `deployment`. Git goes
    /// back to the checkpoint commit first (soft reset), then every failed
    /// target is rolled back in deployment order. Partial failures are
    /// reported in the action list, never returned as an error.
    pub async fn perform_automatic_rollback(
        &self,
        deployment: &DeploymentSummary,
        checkpoint: &Checkpoint,
    ) -> RollbackReport {
        let failed_targets = deployment.failed_targets();
        info!("Performing automatic rollback...");

        self.send_notification(FailureNotification {
            kind: NotificationKind::RollbackStarted,
            timestamp: Utc::now(),
            project: self.firebase.project_id().to_string(),
            checkpoint_commit: checkpoint.git_commit.clone(),
            failed_targets: failed_targets.clone(),
            deployment_error: deployment.error.clone().or(deployment.interrupted.clone()),
            rollback_success: None,
            actions: Vec::new(),
        })
        .await;

        let mut actions = vec![RollbackAction {
            kind: RollbackKind::GitRollback,
            target: None,
            outcome: self.rollback_git_changes(&checkpoint.git_commit, false).await,
        }];

        for target in &failed_targets {
            actions.push(RollbackAction {
                kind: RollbackKind::FirebaseRollback,
                target: Some(*target),
                outcome: self.rollback_firebase_deployment(*target).await,
            });
        }

        let success = actions.iter().all(|a| a.outcome.success);
        if success {
            info!("Automatic rollback completed successfully");
        } else {
            warn!("Automatic rollback completed with errors");
        }

        self.send_notification(FailureNotification {
            kind: NotificationKind::RollbackCompleted,
            timestamp: Utc::now(),
            project: self.firebase.project_id().to_string(),
            checkpoint_commit: checkpoint.git_commit.clone(),
            failed_targets,
            deployment_error: None,
            rollback_success: Some(success),
            actions: actions.clone(),
        })
        .await;

        RollbackReport {
            triggered: true,
            timestamp: Utc::now(),
            checkpoint: checkpoint.git_commit.clone(),
            actions,
            success,
        }
    }

    /// Read-only probe of commit history and hosting release depth
    pub async fn validate_rollback_capability(&self) -> RollbackCapability {
        let mut capability = RollbackCapability {
            can_rollback: true,
            ..Default::default()
        };

        match self.git.recent_commits(RECENT_COMMITS_PROBED).await {
            Ok(commits) => {
                capability.git = GitCapability {
                    available: true,
                    recent_commits: Some(commits.len()),
                };
            }
            Err(_) => {
                capability.can_rollback = false;
                capability.issues.push("Git rollback not available".to_string());
            }
        }

        match self.firebase.finalized_releases(2).await {
            Ok(releases) => {
                capability.firebase.hosting = releases.len() >= 2;
                if releases.len() < 2 {
                    capability
                        .issues
                        .push("No previous Firebase hosting release for rollback".to_string());
                }
            }
            Err(_) => {
                capability
                    .issues
                    .push("Firebase rollback capability check failed".to_string());
            }
        }

        capability
    }
}
