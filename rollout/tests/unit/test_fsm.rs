//! Pipeline FSM unit tests

use rollout::deploy::fsm::{PipelineEvent, PipelineFsm, PipelineState};

#[test]
fn test_fsm_initial_state() {
    let fsm = PipelineFsm::new();
    assert_eq!(fsm.state(), PipelineState::Init);
    assert!(fsm.error().is_none());
    assert_eq!(fsm.history(), &[PipelineState::Init]);
}

#[test]
fn test_fsm_skip_commit_flow() {
    let mut fsm = PipelineFsm::new();

    fsm.process(PipelineEvent::Validate).unwrap();
    fsm.process(PipelineEvent::Checkpoint).unwrap();

    // Checkpointed -> Deploying without a commit
    fsm.process(PipelineEvent::Deploy).unwrap();
    assert_eq!(fsm.state(), PipelineState::Deploying);

    fsm.process(PipelineEvent::DeploySucceeded).unwrap();
    assert_eq!(
        fsm.history(),
        &[
            PipelineState::Init,
            PipelineState::Validating,
            PipelineState::Checkpointed,
            PipelineState::Deploying,
            PipelineState::Succeeded,
        ]
    );
}

#[test]
fn test_fsm_failure_without_rollback() {
    let mut fsm = PipelineFsm::new();

    fsm.process(PipelineEvent::Checkpoint).unwrap();
    fsm.process(PipelineEvent::Deploy).unwrap();
    fsm.process(PipelineEvent::DeployFailed("storage failed".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), PipelineState::RolledBackOrFailed);
    assert_eq!(fsm.error(), Some("storage failed"));
    assert!(!fsm.history().contains(&PipelineState::RollingBack));
}

#[test]
fn test_fsm_rollback_flow() {
    let mut fsm = PipelineFsm::new();

    fsm.process(PipelineEvent::Checkpoint).unwrap();
    fsm.process(PipelineEvent::Commit).unwrap();
    fsm.process(PipelineEvent::Deploy).unwrap();
    fsm.process(PipelineEvent::RollbackStarted("hosting failed".to_string()))
        .unwrap();
    assert_eq!(fsm.state(), PipelineState::RollingBack);
    assert!(!fsm.state().is_terminal());

    fsm.process(PipelineEvent::RollbackFinished).unwrap();
    assert_eq!(fsm.state(), PipelineState::RolledBackOrFailed);
    assert!(fsm.state().is_terminal());
}

#[test]
fn test_fsm_abort_before_deploy() {
    let mut fsm = PipelineFsm::new();

    fsm.process(PipelineEvent::Validate).unwrap();
    fsm.process(PipelineEvent::Abort("Not in a Git repository".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), PipelineState::Aborted);
    assert_eq!(fsm.error(), Some("Not in a Git repository"));
}

#[test]
fn test_fsm_cannot_abort_while_deploying() {
    let mut fsm = PipelineFsm::new();

    fsm.process(PipelineEvent::Checkpoint).unwrap();
    fsm.process(PipelineEvent::Deploy).unwrap();

    assert!(fsm.process(PipelineEvent::Abort("late".to_string())).is_err());
    assert_eq!(fsm.state(), PipelineState::Deploying);
}

#[test]
fn test_fsm_invalid_transition() {
    let mut fsm = PipelineFsm::new();

    // Cannot deploy before a checkpoint exists
    let result = fsm.process(PipelineEvent::Deploy);
    assert!(result.is_err());
    assert_eq!(fsm.state(), PipelineState::Init);
    assert_eq!(fsm.history().len(), 1);
}

#[test]
fn test_terminal_states_accept_nothing() {
    let mut fsm = PipelineFsm::new();

    fsm.process(PipelineEvent::Abort("stop".to_string())).unwrap();
    assert!(fsm.process(PipelineEvent::Validate).is_err());
    assert!(fsm.process(PipelineEvent::RollbackFinished).is_err());
}

#[test]
fn test_state_wire_names() {
    assert_eq!(
        serde_json::to_string(&PipelineState::RolledBackOrFailed).unwrap(),
        "\"ROLLED_BACK_OR_FAILED\""
    );
}
