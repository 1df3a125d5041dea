//! rollout Library
//!
//! Checkpointed git + Firebase deployment pipeline with automatic rollback,
//! layered configuration with encrypted secrets, and the setup orchestrator.

pub mod config;
pub mod deploy;
pub mod env;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod orchestrator;
pub mod process;
pub mod testing;
pub mod utils;
