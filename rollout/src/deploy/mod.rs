//! Deployment module

pub mod control;
pub mod firebase;
pub mod fsm;
pub mod git;
pub mod pipeline;
pub mod rollback;

pub use control::RunControl;
pub use firebase::{DeploymentResult, DeploymentSummary, FirebaseDeployment, FirebaseOptions};
pub use git::{ChangeType, GitOperations};
pub use pipeline::{DeploymentPipeline, PipelineOptions, PipelineRun};
pub use rollback::{Checkpoint, DeploymentRollback, RollbackReport};
