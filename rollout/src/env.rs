//! Environment provider
//!
//! Process-wide state (environment variables, working directory) is read
//! through [`Environment`] so callers can substitute a fixed view.

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::PathBuf;

pub const CREDENTIALS_PATH_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const ENCRYPTION_KEY_VAR: &str = "CONFIG_ENCRYPTION_KEY";
pub const SMTP_HOST_VAR: &str = "SMTP_HOST";
pub const SMTP_USER_VAR: &str = "SMTP_USER";
pub const SMTP_PASS_VAR: &str = "SMTP_PASS";
pub const SLACK_WEBHOOK_VAR: &str = "SLACK_WEBHOOK_URL";
pub const PROJECT_ID_VAR: &str = "FIREBASE_PROJECT_ID";
pub const RUN_MODE_VAR: &str = "APP_ENV";
pub const ADMIN_UID_VAR: &str = "DEFAULT_ADMIN_UID";
pub const ADMIN_EMAIL_VAR: &str = "DEFAULT_ADMIN_EMAIL";

pub const DEFAULT_RUN_MODE: &str = "development";

/// Read-only view of ambient process state
pub trait Environment: Send + Sync + Debug {
    /// Value of an environment variable; empty values count as unset
    fn var(&self, key: &str) -> Option<String>;

    /// Directory relative paths resolve against
    fn current_dir(&self) -> PathBuf;

    fn is_set(&self, key: &str) -> bool {
        self.var(key).is_some()
    }

    /// Run mode (`development`, `staging`, `production`, ...)
    fn run_mode(&self) -> String {
        self.var(RUN_MODE_VAR)
            .unwrap_or_else(|| DEFAULT_RUN_MODE.to_string())
    }
}

/// The real process environment
#[derive(Debug, Clone, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }

    fn current_dir(&self) -> PathBuf {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }
}

/// A fixed environment
#[derive(Debug, Clone)]
pub struct StaticEnvironment {
    vars: HashMap<String, String>,
    cwd: PathBuf,
}

impl StaticEnvironment {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            vars: HashMap::new(),
            cwd: cwd.into(),
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl Default for StaticEnvironment {
    fn default() -> Self {
        Self::new(".")
    }
}

impl Environment for StaticEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).filter(|v| !v.is_empty()).cloned()
    }

    fn current_dir(&self) -> PathBuf {
        self.cwd.clone()
    }
}
