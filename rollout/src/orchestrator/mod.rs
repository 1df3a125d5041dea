//! Setup orchestration: admin bootstrap, documentation and deployment

pub mod collaborators;
pub mod options;
pub mod progress;
pub mod run;

pub use options::{OrchestratorOptions, SetupOptions};
pub use run::{SetupReport, SystemOrchestrator};
