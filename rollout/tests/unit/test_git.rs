//! Git wrapper tests against a scripted runner

use std::sync::Arc;

use tokio_test::{assert_err, assert_ok, block_on};

use rollout::deploy::git::{AutoCommitOptions, ChangeType, GitOperations};
use rollout::errors::RolloutError;
use rollout::testing::ScriptedRunner;

fn git(runner: &Arc<ScriptedRunner>) -> GitOperations {
    GitOperations::new("/repo", runner.clone())
}

#[test]
fn test_stage_nothing_never_runs_git() {
    let runner = Arc::new(ScriptedRunner::new());

    let err = assert_err!(block_on(git(&runner).stage_files(&[])));
    assert!(matches!(err, RolloutError::Validation(_)));
    assert!(runner.calls().is_empty());
}

#[test]
fn test_empty_commit_message_never_runs_git() {
    let runner = Arc::new(ScriptedRunner::new());
    let git = git(&runner);

    assert_err!(block_on(git.create_commit("")));
    assert_err!(block_on(git.create_commit("   \n")));
    assert!(runner.calls().is_empty());
}

#[test]
fn test_empty_reset_target_never_runs_git() {
    let runner = Arc::new(ScriptedRunner::new());

    assert_err!(block_on(git(&runner).revert_to_commit("", true)));
    assert!(!block_on(git(&runner).commit_exists(" ")));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_commands_run_in_working_tree() {
    let runner = Arc::new(ScriptedRunner::new().on("git rev-parse --abbrev-ref HEAD", "main\n"));

    let branch = git(&runner).current_branch().await.unwrap();
    assert_eq!(branch, "main");

    let specs = runner.specs();
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].cwd.as_deref(), Some(std::path::Path::new("/repo")));
    assert!(specs[0].timeout.is_some());
}

#[tokio::test]
async fn test_failed_command_carries_stderr() {
    let runner = Arc::new(ScriptedRunner::new().fail("git status", "fatal: index corrupt"));

    let err = git(&runner).is_working_directory_clean().await.unwrap_err();
    match err {
        RolloutError::GitCommand { command, message } => {
            assert_eq!(command, "status --porcelain");
            assert_eq!(message, "fatal: index corrupt");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_git_is_a_git_error() {
    let runner = Arc::new(ScriptedRunner::new().missing("git"));

    let err = git(&runner).last_commit_hash().await.unwrap_err();
    assert!(matches!(err, RolloutError::GitCommand { .. }));
}

#[tokio::test]
async fn test_dirty_tree_fails_clean_requirement() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .on("git rev-parse --abbrev-ref HEAD", "feature/stock")
            .on("git status --porcelain", " M src/app.rs"),
    );
    let git = git(&runner);

    let strict = git.validate_working_directory(true).await;
    assert!(!strict.is_valid);
    assert_eq!(strict.issues, vec!["Working directory has uncommitted changes"]);
    assert_eq!(strict.branch.as_deref(), Some("feature/stock"));

    let relaxed = git.validate_working_directory(false).await;
    assert!(relaxed.is_valid);
    assert!(!relaxed.is_clean);
}

#[tokio::test]
async fn test_auto_commit_with_nothing_staged() {
    let runner = Arc::new(ScriptedRunner::new());

    let outcome = git(&runner)
        .auto_commit(AutoCommitOptions::default())
        .await
        .unwrap();

    assert!(outcome.is_nothing_to_commit());
    assert!(outcome.commit_hash.is_none());
    assert!(runner.invoked("git add --all"));
    assert!(!runner.invoked("git commit"));
}

#[tokio::test]
async fn test_auto_commit_generates_message() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .on("git rev-parse --abbrev-ref HEAD", "main")
            .on("git rev-parse HEAD", "0123456789abcdef")
            .on(
                "git diff --cached --name-only",
                "src/a.rs\nsrc/b.rs\nsrc/c.rs\nsrc/d.rs\nsrc/e.rs",
            ),
    );

    let outcome = assert_ok!(
        git(&runner)
            .auto_commit(AutoCommitOptions {
                change_type: ChangeType::Deploy,
                description: "Ship inventory export".to_string(),
                ..Default::default()
            })
            .await
    );

    assert!(outcome.success);
    assert_eq!(outcome.commit_hash.as_deref(), Some("0123456789abcdef"));
    assert_eq!(outcome.branch.as_deref(), Some("main"));
    assert_eq!(outcome.staged_files.len(), 5);
    assert_eq!(
        outcome.commit_message.as_deref(),
        Some(
            "deploy: Ship inventory export\n\n\
             Affected files: src/a.rs, src/b.rs, src/c.rs and 2 more"
        )
    );
    assert_eq!(runner.count("git commit -m"), 1);
}

#[tokio::test]
async fn test_auto_commit_stages_selected_files() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .on("git rev-parse HEAD", "feedface")
            .on("git diff --cached --name-only", "docs/guide.md"),
    );

    let outcome = git(&runner)
        .auto_commit(AutoCommitOptions {
            change_type: ChangeType::Docs,
            description: "Move guide".to_string(),
            files: vec!["docs/guide.md".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(outcome.success);
    assert!(runner.invoked("git add -- docs/guide.md"));
    assert!(!runner.invoked("git add --all"));
}

#[tokio::test]
async fn test_auto_commit_outside_repository() {
    let runner = Arc::new(
        ScriptedRunner::new().fail("git rev-parse --git-dir", "fatal: not a git repository"),
    );

    let err = git(&runner)
        .auto_commit(AutoCommitOptions::default())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Not in a Git repository"));
    assert!(!runner.invoked("git add"));
}

#[tokio::test]
async fn test_revert_requests_reset_type() {
    let runner = Arc::new(ScriptedRunner::new());
    let git = git(&runner);

    git.revert_to_commit("abc123", false).await.unwrap();
    git.revert_to_commit("abc123", true).await.unwrap();

    assert_eq!(
        runner.calls(),
        vec!["git reset --soft abc123", "git reset --hard abc123"]
    );
}
