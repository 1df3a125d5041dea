//! Checkpoint → commit → deploy → rollback pipeline

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::model::DeploymentTarget;
use crate::deploy::control::RunControl;
use crate::deploy::firebase::{DeploymentSummary, FirebaseDeployment};
use crate::deploy::fsm::{PipelineEvent, PipelineFsm, PipelineState};
use crate::deploy::git::{AutoCommitOptions, ChangeType, CommitOutcome, GitOperations};
use crate::deploy::rollback::{Checkpoint, DeploymentRollback, FailureNotifier, RollbackReport};
use crate::errors::RolloutError;

pub const DEFAULT_COMMIT_DESCRIPTION: &str = "Automated deployment";
pub const DEFAULT_DEPLOYMENT_LOG: &str = "logs/deployment.log";

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Commit description; the change-type prefix is added
    pub commit_message: Option<String>,
    pub change_type: ChangeType,
    pub skip_commit: bool,
    /// Overrides the deployer's configured targets for this run only
    pub targets: Option<Vec<DeploymentTarget>>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            commit_message: None,
            change_type: ChangeType::Deploy,
            skip_commit: false,
            targets: None,
        }
    }
}

/// Aggregate result of one [`DeploymentPipeline::execute_deployment`] call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub success: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Milliseconds
    pub duration: u64,
    pub checkpoint: Checkpoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<CommitOutcome>,
    pub deployment: DeploymentSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackReport>,
    pub states: Vec<PipelineState>,
}

/// Runs git and firebase steps strictly one after another.
///
/// Callers must serialize runs against the same working tree; the pipeline
/// takes no lock of its own.
pub struct DeploymentPipeline {
    git: GitOperations,
    firebase: FirebaseDeployment,
    rollback: DeploymentRollback,
    auto_rollback: bool,
    log_path: Option<PathBuf>,
}

impl DeploymentPipeline {
    pub fn new(git: GitOperations, firebase: FirebaseDeployment, auto_rollback: bool) -> Self {
        let rollback = DeploymentRollback::new(git.clone(), firebase.clone());
        let log_path = Some(firebase.working_dir().join(DEFAULT_DEPLOYMENT_LOG));
        Self {
            git,
            firebase,
            rollback,
            auto_rollback,
            log_path,
        }
    }

    /// `None` disables the run log
    pub fn with_log_path(mut self, path: Option<PathBuf>) -> Self {
        self.log_path = path;
        self
    }

    pub fn add_notification_handler(&mut self, notifier: Arc<dyn FailureNotifier>) {
        self.rollback.add_notification_handler(notifier);
    }

    pub fn git(&self) -> &GitOperations {
        &self.git
    }

    pub fn firebase(&self) -> &FirebaseDeployment {
        &self.firebase
    }

    pub fn rollback(&self) -> &DeploymentRollback {
        &self.rollback
    }

    /// Run the pipeline.
    ///
    /// Pre-deploy failures (working directory, checkpoint, commit,
    /// environment, cancellation) are returned as errors before anything is
    /// deployed. Deployment failures never are: they come back in the
    /// [`PipelineRun`] together with the rollback report.
    pub async fn execute_deployment(
        &self,
        options: PipelineOptions,
        control: &RunControl,
    ) -> Result<PipelineRun, RolloutError> {
        let mut fsm = PipelineFsm::new();

        match self.prepare(&options, control, &mut fsm).await {
            Ok(prepared) => Ok(self.deploy(prepared, control, fsm).await),
            Err(e) => {
                if let Err(transition) = fsm.process(PipelineEvent::Abort(e.to_string())) {
                    warn!("{}", transition);
                }
                Err(e)
            }
        }
    }

    async fn prepare(
        &self,
        options: &PipelineOptions,
        control: &RunControl,
        fsm: &mut PipelineFsm,
    ) -> Result<Prepared, RolloutError> {
        let run_id = Uuid::new_v4();
        let start_time = Utc::now();
        let started = Instant::now();
        info!(%run_id, "Starting deployment pipeline");

        if !options.skip_commit {
            control.check("working directory validation")?;
            step(fsm, PipelineEvent::Validate)?;

            let validation = self.git.validate_working_directory(false).await;
            if !validation.is_valid {
                return Err(RolloutError::Validation(format!(
                    "Working directory validation failed: {}",
                    validation.issues.join(", ")
                )));
            }
        }

        control.check("checkpoint")?;
        let checkpoint = self.rollback.create_deployment_checkpoint().await?;
        step(fsm, PipelineEvent::Checkpoint)?;

        let mut git_commit = None;
        if !options.skip_commit {
            control.check("commit")?;
            step(fsm, PipelineEvent::Commit)?;

            let outcome = self
                .git
                .auto_commit(AutoCommitOptions {
                    change_type: options.change_type,
                    description: options
                        .commit_message
                        .clone()
                        .unwrap_or_else(|| DEFAULT_COMMIT_DESCRIPTION.to_string()),
                    stage_all: true,
                    ..Default::default()
                })
                .await?;
            if outcome.is_nothing_to_commit() {
                info!("Nothing to commit, deploying current HEAD");
            }
            git_commit = Some(outcome);
        }

        let targets = options
            .targets
            .clone()
            .unwrap_or_else(|| self.firebase.targets().to_vec());

        control.check("environment validation")?;
        let validation = self.firebase.validate_environment_for(&targets).await;
        if !validation.is_valid {
            return Err(RolloutError::Validation(format!(
                "Environment validation failed: {}",
                validation.issues.join(", ")
            )));
        }
        for warning in &validation.warnings {
            warn!("{}", warning);
        }

        Ok(Prepared {
            run_id,
            start_time,
            started,
            checkpoint,
            git_commit,
            targets,
        })
    }

    async fn deploy(
        &self,
        prepared: Prepared,
        control: &RunControl,
        mut fsm: PipelineFsm,
    ) -> PipelineRun {
        record(&mut fsm, PipelineEvent::Deploy);
        let deployment = self
            .firebase
            .deploy_targets(&prepared.targets, control)
            .await;

        let mut rollback = None;
        if deployment.success {
            record(&mut fsm, PipelineEvent::DeploySucceeded);
        } else {
            let reason = failure_reason(&deployment);
            // An interrupted run with no failed target keeps what went live
            if self.auto_rollback && !deployment.failed_targets().is_empty() {
                record(&mut fsm, PipelineEvent::RollbackStarted(reason));
                rollback = Some(
                    self.rollback
                        .perform_automatic_rollback(&deployment, &prepared.checkpoint)
                        .await,
                );
                record(&mut fsm, PipelineEvent::RollbackFinished);
            } else {
                record(&mut fsm, PipelineEvent::DeployFailed(reason));
            }
        }

        let run = PipelineRun {
            run_id: prepared.run_id,
            success: deployment.success,
            start_time: prepared.start_time,
            end_time: Utc::now(),
            duration: prepared.started.elapsed().as_millis() as u64,
            checkpoint: prepared.checkpoint,
            git_commit: prepared.git_commit,
            deployment,
            rollback,
            states: fsm.history().to_vec(),
        };

        if let Some(path) = &self.log_path {
            self.firebase.log_deployment(&run, path).await;
        }

        info!(
            run_id = %run.run_id,
            success = run.success,
            "Deployment pipeline finished"
        );
        run
    }
}

struct Prepared {
    run_id: Uuid,
    start_time: DateTime<Utc>,
    started: Instant,
    checkpoint: Checkpoint,
    git_commit: Option<CommitOutcome>,
    targets: Vec<DeploymentTarget>,
}

fn step(fsm: &mut PipelineFsm, event: PipelineEvent) -> Result<PipelineState, RolloutError> {
    fsm.process(event).map_err(RolloutError::Internal)
}

/// Transitions after deployment starts are always valid
fn record(fsm: &mut PipelineFsm, event: PipelineEvent) {
    if let Err(e) = fsm.process(event) {
        warn!("{}", e);
    }
}

fn failure_reason(deployment: &DeploymentSummary) -> String {
    let failed: Vec<&str> = deployment
        .failed_targets()
        .iter()
        .map(DeploymentTarget::as_str)
        .collect();
    match (&deployment.interrupted, failed.is_empty()) {
        (Some(reason), true) => reason.clone(),
        (Some(reason), false) => {
            format!("Deployment failed for: {} ({})", failed.join(", "), reason)
        }
        (None, _) => format!("Deployment failed for: {}", failed.join(", ")),
    }
}
