//! Layered system configuration

pub mod crypto;
pub mod manager;
pub mod model;
pub mod path;

pub use manager::{ConfigManager, ConfigManagerOptions, CredentialsReport, DecryptionReport};
pub use model::{ConfigOverlay, DeploymentTarget, SystemConfig, TargetList, SENSITIVE_FIELDS};
