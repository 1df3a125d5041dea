//! Deployment pipeline tests: commit, deploy, rollback

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use rollout::config::model::DeploymentTarget;
use rollout::deploy::control::RunControl;
use rollout::deploy::firebase::{FirebaseDeployment, FirebaseOptions};
use rollout::deploy::fsm::PipelineState;
use rollout::deploy::git::GitOperations;
use rollout::deploy::pipeline::{DeploymentPipeline, PipelineOptions, PipelineRun};
use rollout::deploy::rollback::{
    FailureNotification, FailureNotifier, NotificationKind, RollbackKind,
};
use rollout::errors::RolloutError;
use rollout::process::{CommandOutput, CommandRunner, CommandSpec, ProcessError};
use rollout::testing::ScriptedRunner;

const HEAD: &str = "abc123def456";

const RELEASES: &str = "\
rel-0042  FINALIZED  2026-10-17 09:12
rel-0041  FINALIZED  2026-10-16 18:40
rel-0040  FINALIZED  2026-10-15 11:03";

fn pipeline(
    runner: Arc<dyn CommandRunner>,
    dir: &Path,
    targets: Vec<DeploymentTarget>,
    auto_rollback: bool,
) -> DeploymentPipeline {
    let git = GitOperations::new(dir, runner.clone());
    let firebase = FirebaseDeployment::new(
        FirebaseOptions {
            project_id: "clinic-test".to_string(),
            working_dir: dir.to_path_buf(),
            targets,
            build_before_deploy: false,
            ..Default::default()
        },
        runner,
    );
    DeploymentPipeline::new(git, firebase, auto_rollback).with_log_path(None)
}

async fn project_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("firebase.json"), "{}")
        .await
        .unwrap();
    dir
}

fn scripted() -> ScriptedRunner {
    ScriptedRunner::new()
        .on("git rev-parse --abbrev-ref HEAD", "main")
        .on("git rev-parse HEAD", HEAD)
        .on("firebase hosting:releases:list", RELEASES)
}

fn kinds(run: &PipelineRun) -> Vec<RollbackKind> {
    run.rollback
        .as_ref()
        .map(|r| r.actions.iter().map(|a| a.kind).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_failed_target_rolls_back_git_then_firebase() {
    let dir = project_dir().await;
    let runner = Arc::new(scripted().fail("firebase deploy --only hosting", "Upload failed"));

    let run = pipeline(
        runner.clone(),
        dir.path(),
        vec![DeploymentTarget::Hosting, DeploymentTarget::Firestore],
        true,
    )
    .execute_deployment(PipelineOptions::default(), &RunControl::new())
    .await
    .unwrap();

    assert!(!run.success);
    assert_eq!(run.checkpoint.git_commit, HEAD);

    // A failed target does not stop the ones after it
    assert_eq!(run.deployment.deployments.len(), 2);
    assert!(!run.deployment.deployments[0].success);
    assert!(run.deployment.deployments[1].success);
    assert_eq!(run.deployment.failed_targets(), vec![DeploymentTarget::Hosting]);

    assert_eq!(
        kinds(&run),
        vec![RollbackKind::GitRollback, RollbackKind::FirebaseRollback]
    );
    let report = run.rollback.as_ref().unwrap();
    assert!(report.success);
    assert_eq!(report.checkpoint, HEAD);
    assert_eq!(report.actions[1].target, Some(DeploymentTarget::Hosting));

    assert!(runner.invoked(&format!("git reset --soft {}", HEAD)));
    assert!(runner.invoked("firebase hosting:releases:rollback rel-0041"));
    assert!(!runner.invoked("git reset --hard"));

    assert!(run.states.contains(&PipelineState::RollingBack));
    assert_eq!(run.states.last(), Some(&PipelineState::RolledBackOrFailed));
}

#[tokio::test]
async fn test_redeploy_after_rollback_succeeds() {
    let dir = project_dir().await;
    let runner = Arc::new(scripted().fail_once("firebase deploy --only hosting", "Quota exceeded"));
    let pipeline = pipeline(runner.clone(), dir.path(), vec![DeploymentTarget::Hosting], true);
    let options = || PipelineOptions {
        skip_commit: true,
        ..Default::default()
    };

    let first = pipeline
        .execute_deployment(options(), &RunControl::new())
        .await
        .unwrap();
    assert!(!first.success);
    assert!(first.rollback.is_some());

    let second = pipeline
        .execute_deployment(options(), &RunControl::new())
        .await
        .unwrap();
    assert!(second.success);
    assert!(second.rollback.is_none());
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(runner.count("firebase deploy --only hosting"), 2);
    assert_eq!(runner.count("git reset --soft"), 1);
}

#[tokio::test]
async fn test_functions_rollback_failure_is_reported() {
    let dir = project_dir().await;
    let runner = Arc::new(scripted().fail("firebase deploy --only functions", "Build error"));

    let run = pipeline(runner.clone(), dir.path(), vec![DeploymentTarget::Functions], true)
        .execute_deployment(PipelineOptions::default(), &RunControl::new())
        .await
        .unwrap();

    let report = run.rollback.unwrap();
    assert!(!report.success);
    assert!(report.actions[0].outcome.success);
    assert_eq!(
        report.actions[1].outcome.error.as_deref(),
        Some("Rollback error: Functions rollback requires redeploying from previous Git commit")
    );
}

#[tokio::test]
async fn test_commit_happens_before_deploy() {
    let dir = project_dir().await;
    let runner = Arc::new(
        scripted()
            .on("git status --porcelain", " M frontend/src/App.tsx")
            .on("git diff --cached --name-only", "frontend/src/App.tsx"),
    );

    let run = pipeline(runner.clone(), dir.path(), vec![DeploymentTarget::Firestore], true)
        .execute_deployment(
            PipelineOptions {
                commit_message: Some("Stock alerts".to_string()),
                ..Default::default()
            },
            &RunControl::new(),
        )
        .await
        .unwrap();

    assert!(run.success);
    let commit = run.git_commit.unwrap();
    assert!(commit.success);
    assert_eq!(
        commit.commit_message.as_deref(),
        Some("deploy: Stock alerts\n\nAffected files: frontend/src/App.tsx")
    );

    let calls = runner.calls();
    let committed = calls.iter().position(|c| c.starts_with("git commit")).unwrap();
    let deployed = calls
        .iter()
        .position(|c| c.starts_with("firebase deploy"))
        .unwrap();
    assert!(committed < deployed);
    assert_eq!(
        run.states,
        vec![
            PipelineState::Init,
            PipelineState::Validating,
            PipelineState::Checkpointed,
            PipelineState::Committing,
            PipelineState::Deploying,
            PipelineState::Succeeded,
        ]
    );
}

#[tokio::test]
async fn test_skip_commit_leaves_index_alone() {
    let dir = project_dir().await;
    let runner = Arc::new(scripted());

    let run = pipeline(runner.clone(), dir.path(), vec![DeploymentTarget::Storage], true)
        .execute_deployment(
            PipelineOptions {
                skip_commit: true,
                ..Default::default()
            },
            &RunControl::new(),
        )
        .await
        .unwrap();

    assert!(run.success);
    assert!(run.git_commit.is_none());
    assert!(!runner.invoked("git add"));
    assert!(!runner.invoked("git commit"));
    assert!(!run.states.contains(&PipelineState::Committing));
}

#[tokio::test]
async fn test_target_override_applies_to_one_run() {
    let dir = project_dir().await;
    let runner = Arc::new(scripted());
    let pipeline = pipeline(
        runner.clone(),
        dir.path(),
        vec![DeploymentTarget::Hosting, DeploymentTarget::Functions],
        true,
    );

    let run = pipeline
        .execute_deployment(
            PipelineOptions {
                skip_commit: true,
                targets: Some(vec![DeploymentTarget::Firestore]),
                ..Default::default()
            },
            &RunControl::new(),
        )
        .await
        .unwrap();

    assert_eq!(run.deployment.deployments.len(), 1);
    assert_eq!(runner.count("firebase deploy"), 1);
    assert!(runner.invoked("firebase deploy --only firestore --project=clinic-test"));
    assert_eq!(
        pipeline.firebase().targets(),
        &[DeploymentTarget::Hosting, DeploymentTarget::Functions]
    );
}

#[tokio::test]
async fn test_environment_failure_stops_before_deploy() {
    // No firebase.json in the working tree
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(scripted());

    let err = pipeline(runner.clone(), dir.path(), vec![DeploymentTarget::Hosting], true)
        .execute_deployment(
            PipelineOptions {
                skip_commit: true,
                ..Default::default()
            },
            &RunControl::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RolloutError::Validation(_)));
    assert!(err.to_string().contains("Required file missing: firebase.json"));
    assert!(!runner.invoked("firebase deploy"));
    assert!(!runner.invoked("git reset"));
}

#[tokio::test]
async fn test_checkpoint_failure_stops_everything() {
    let dir = project_dir().await;
    let runner = Arc::new(
        ScriptedRunner::new().fail("git rev-parse HEAD", "fatal: ambiguous argument 'HEAD'"),
    );

    let err = pipeline(runner.clone(), dir.path(), vec![DeploymentTarget::Hosting], true)
        .execute_deployment(
            PipelineOptions {
                skip_commit: true,
                ..Default::default()
            },
            &RunControl::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RolloutError::Rollback(_)));
    assert!(!runner.invoked("firebase deploy"));
}

/// Delegates to a scripted runner and cancels the run after the first deploy
struct CancelAfterFirstDeploy {
    inner: ScriptedRunner,
    control: RunControl,
}

#[async_trait]
impl CommandRunner for CancelAfterFirstDeploy {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        let output = self.inner.run(spec).await;
        if spec.command_line().starts_with("firebase deploy") {
            self.control.cancel();
        }
        output
    }
}

#[tokio::test]
async fn test_cancel_mid_deploy_stops_remaining_targets() {
    let dir = project_dir().await;
    let control = RunControl::new();
    let runner = Arc::new(CancelAfterFirstDeploy {
        inner: scripted(),
        control: control.clone(),
    });

    let run = pipeline(
        runner.clone(),
        dir.path(),
        vec![DeploymentTarget::Firestore, DeploymentTarget::Storage],
        true,
    )
    .execute_deployment(
        PipelineOptions {
            skip_commit: true,
            ..Default::default()
        },
        &control,
    )
    .await
    .unwrap();

    assert!(!run.success);
    assert_eq!(run.deployment.deployments.len(), 1);
    assert!(run
        .deployment
        .interrupted
        .as_deref()
        .is_some_and(|reason| reason.contains("deploying storage")));
    assert_eq!(runner.inner.count("firebase deploy"), 1);

    // Nothing failed, so the live firestore deploy and its commit stay put
    assert!(run.deployment.failed_targets().is_empty());
    assert!(run.rollback.is_none());
    assert!(!runner.inner.invoked("git reset"));
    assert!(!run.states.contains(&PipelineState::RollingBack));
    assert_eq!(run.states.last(), Some(&PipelineState::RolledBackOrFailed));
}

#[tokio::test]
async fn test_cancel_after_failed_target_still_rolls_back() {
    let dir = project_dir().await;
    let control = RunControl::new();
    let runner = Arc::new(CancelAfterFirstDeploy {
        inner: scripted().fail("firebase deploy --only hosting", "Upload failed"),
        control: control.clone(),
    });

    let run = pipeline(
        runner.clone(),
        dir.path(),
        vec![DeploymentTarget::Hosting, DeploymentTarget::Storage],
        true,
    )
    .execute_deployment(
        PipelineOptions {
            skip_commit: true,
            ..Default::default()
        },
        &control,
    )
    .await
    .unwrap();

    assert!(!run.success);
    assert!(run.deployment.interrupted.is_some());
    assert_eq!(run.deployment.failed_targets(), vec![DeploymentTarget::Hosting]);

    // Rollback is not itself cancelled
    assert_eq!(
        kinds(&run),
        vec![RollbackKind::GitRollback, RollbackKind::FirebaseRollback]
    );
    assert!(runner.inner.invoked("git reset --soft"));
    assert!(!runner.inner.invoked("firebase deploy --only storage"));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_before_start_throws() {
    let dir = project_dir().await;
    let runner = Arc::new(scripted());
    let control = RunControl::with_timeout(std::time::Duration::from_secs(30));
    tokio::time::advance(std::time::Duration::from_secs(31)).await;

    let err = pipeline(runner.clone(), dir.path(), vec![DeploymentTarget::Hosting], true)
        .execute_deployment(PipelineOptions::default(), &control)
        .await
        .unwrap_err();

    assert!(matches!(err, RolloutError::DeadlineExceeded { .. }));
    assert!(runner.calls().is_empty());
}

#[derive(Default)]
struct RecordingNotifier {
    seen: Mutex<Vec<NotificationKind>>,
}

#[async_trait]
impl FailureNotifier for RecordingNotifier {
    async fn notify(&self, notification: &FailureNotification) -> Result<(), RolloutError> {
        self.seen.lock().unwrap().push(notification.kind);
        Ok(())
    }
}

struct BrokenNotifier;

#[async_trait]
impl FailureNotifier for BrokenNotifier {
    async fn notify(&self, _: &FailureNotification) -> Result<(), RolloutError> {
        Err(RolloutError::Internal("smtp unreachable".to_string()))
    }
}

#[tokio::test]
async fn test_notifiers_bracket_the_rollback() {
    let dir = project_dir().await;
    let runner = Arc::new(scripted().fail("firebase deploy", "Permission denied"));
    let recorder = Arc::new(RecordingNotifier::default());

    let mut pipeline = pipeline(runner, dir.path(), vec![DeploymentTarget::Hosting], true);
    pipeline.add_notification_handler(Arc::new(BrokenNotifier));
    pipeline.add_notification_handler(recorder.clone());

    let run = pipeline
        .execute_deployment(PipelineOptions::default(), &RunControl::new())
        .await
        .unwrap();

    assert!(run.rollback.is_some());
    assert_eq!(
        *recorder.seen.lock().unwrap(),
        vec![
            NotificationKind::RollbackStarted,
            NotificationKind::RollbackCompleted
        ]
    );
}

#[tokio::test]
async fn test_run_is_appended_to_log() {
    let dir = project_dir().await;
    let log = dir.path().join("logs/deployment.log");
    let runner = Arc::new(scripted());

    let pipeline = pipeline(runner, dir.path(), vec![DeploymentTarget::Firestore], true)
        .with_log_path(Some(log.clone()));
    let first = pipeline
        .execute_deployment(PipelineOptions::default(), &RunControl::new())
        .await
        .unwrap();
    pipeline
        .execute_deployment(PipelineOptions::default(), &RunControl::new())
        .await
        .unwrap();

    let contents = tokio::fs::read_to_string(&log).await.unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);

    let entry: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(entry["projectId"], "clinic-test");
    let logged: PipelineRun = serde_json::from_value(entry["result"].clone()).unwrap();
    assert_eq!(logged.run_id, first.run_id);
}
