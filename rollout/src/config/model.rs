//! System configuration model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::RolloutError;

/// Independently deployable unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentTarget {
    Hosting,
    Functions,
    Firestore,
    Storage,
}

impl DeploymentTarget {
    pub const ALL: [DeploymentTarget; 4] = [
        DeploymentTarget::Hosting,
        DeploymentTarget::Functions,
        DeploymentTarget::Firestore,
        DeploymentTarget::Storage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentTarget::Hosting => "hosting",
            DeploymentTarget::Functions => "functions",
            DeploymentTarget::Firestore => "firestore",
            DeploymentTarget::Storage => "storage",
        }
    }
}

impl fmt::Display for DeploymentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentTarget {
    type Err = RolloutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeploymentTarget::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| RolloutError::Configuration(format!("Invalid deployment target: {}", s)))
    }
}

/// `deployment.targets` as written in the file.
///
/// Kept unresolved so a non-array value or an unknown name is reported by
/// validation instead of failing the parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetList {
    Names(Vec<String>),
    Malformed(serde_json::Value),
}

impl TargetList {
    pub fn from_targets(targets: &[DeploymentTarget]) -> Self {
        TargetList::Names(targets.iter().map(|t| t.as_str().to_string()).collect())
    }

    /// Resolve to known targets; the first problem found is returned
    pub fn resolve(&self) -> Result<Vec<DeploymentTarget>, RolloutError> {
        match self {
            TargetList::Names(names) => names.iter().map(|n| n.parse()).collect(),
            // An array that failed to parse as names holds a non-string entry
            TargetList::Malformed(serde_json::Value::Array(items)) => {
                let entry = items
                    .iter()
                    .find(|item| !item.is_string())
                    .map(ToString::to_string)
                    .unwrap_or_default();
                Err(RolloutError::Configuration(format!(
                    "Invalid deployment target: {}",
                    entry
                )))
            }
            TargetList::Malformed(_) => Err(RolloutError::Configuration(
                "deployment.targets must be an array".to_string(),
            )),
        }
    }
}

impl Default for TargetList {
    fn default() -> Self {
        TargetList::from_targets(&[
            DeploymentTarget::Hosting,
            DeploymentTarget::Functions,
            DeploymentTarget::Firestore,
        ])
    }
}

/// Paths of the leaves that are encrypted at rest
pub const SENSITIVE_FIELDS: [&str; 4] = [
    "notifications.email.smtpConfig.password",
    "notifications.slack.webhookUrl",
    "security.apiKeys",
    "firebase.serviceAccountKey",
];

/// Merged system configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfig {
    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub firebase: FirebaseConfig,

    #[serde(default)]
    pub documentation: DocumentationConfig,

    #[serde(default)]
    pub deployment: DeploymentConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,
}

impl SystemConfig {
    /// Sensitive leaves paired with their dotted paths, in [`SENSITIVE_FIELDS`] order
    pub fn sensitive_fields_mut(&mut self) -> [(&'static str, &mut Option<String>); 4] {
        [
            (
                SENSITIVE_FIELDS[0],
                &mut self.notifications.email.smtp_config.password,
            ),
            (SENSITIVE_FIELDS[1], &mut self.notifications.slack.webhook_url),
            (SENSITIVE_FIELDS[2], &mut self.security.api_keys),
            (SENSITIVE_FIELDS[3], &mut self.firebase.service_account_key),
        ]
    }
}

fn default_true() -> bool {
    true
}

/// Default admin account bootstrapped by the setup run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminConfig {
    #[serde(default, rename = "defaultUID")]
    pub default_uid: String,

    #[serde(default)]
    pub default_email: String,

    #[serde(default = "default_true")]
    pub auto_initialize: bool,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            default_uid: String::new(),
            default_email: String::new(),
            auto_initialize: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseConfig {
    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default)]
    pub service_account_key: Option<String>,
}

/// Documentation reorganization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentationConfig {
    #[serde(default = "default_true")]
    pub auto_organize: bool,

    #[serde(default = "default_true")]
    pub create_backup: bool,

    #[serde(default = "default_true")]
    pub update_references: bool,

    #[serde(default = "default_true")]
    pub use_git_mv: bool,

    /// External documentation tool invocation
    #[serde(default = "default_documentation_command")]
    pub command: Vec<String>,
}

fn default_documentation_command() -> Vec<String> {
    vec![
        "node".to_string(),
        "scripts/documentationManager.js".to_string(),
        "--json".to_string(),
    ]
}

impl Default for DocumentationConfig {
    fn default() -> Self {
        Self {
            auto_organize: true,
            create_backup: true,
            update_references: true,
            use_git_mv: true,
            command: default_documentation_command(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    #[serde(default = "default_true")]
    pub auto_commit: bool,

    #[serde(default)]
    pub targets: TargetList,

    #[serde(default = "default_true")]
    pub auto_rollback: bool,

    #[serde(default = "default_true")]
    pub build_before_deploy: bool,

    /// Overall run deadline in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            auto_commit: true,
            targets: TargetList::default(),
            auto_rollback: true,
            build_before_deploy: true,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    #[serde(default)]
    pub encrypt_sensitive_data: bool,

    #[serde(default)]
    pub api_keys: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub console: bool,

    #[serde(default = "default_true")]
    pub log_file: bool,

    #[serde(default)]
    pub email: EmailNotifications,

    #[serde(default)]
    pub slack: SlackNotifications,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            console: true,
            log_file: true,
            email: EmailNotifications::default(),
            slack: SlackNotifications::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailNotifications {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub smtp_config: SmtpConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackNotifications {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub webhook_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Overlay
// ---------------------------------------------------------------------------

/// Environment-specific overlay; every field is optional and only fields
/// present in the file are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOverlay {
    #[serde(default)]
    pub admin: Option<AdminOverlay>,
    #[serde(default)]
    pub firebase: Option<FirebaseOverlay>,
    #[serde(default)]
    pub documentation: Option<DocumentationOverlay>,
    #[serde(default)]
    pub deployment: Option<DeploymentOverlay>,
    #[serde(default)]
    pub security: Option<SecurityOverlay>,
    #[serde(default)]
    pub notifications: Option<NotificationsOverlay>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOverlay {
    #[serde(default, rename = "defaultUID")]
    pub default_uid: Option<String>,
    #[serde(default)]
    pub default_email: Option<String>,
    #[serde(default)]
    pub auto_initialize: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseOverlay {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub service_account_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentationOverlay {
    #[serde(default)]
    pub auto_organize: Option<bool>,
    #[serde(default)]
    pub create_backup: Option<bool>,
    #[serde(default)]
    pub update_references: Option<bool>,
    #[serde(default)]
    pub use_git_mv: Option<bool>,
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOverlay {
    #[serde(default)]
    pub auto_commit: Option<bool>,
    #[serde(default)]
    pub targets: Option<TargetList>,
    #[serde(default)]
    pub auto_rollback: Option<bool>,
    #[serde(default)]
    pub build_before_deploy: Option<bool>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityOverlay {
    #[serde(default)]
    pub encrypt_sensitive_data: Option<bool>,
    #[serde(default)]
    pub api_keys: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsOverlay {
    #[serde(default)]
    pub console: Option<bool>,
    #[serde(default)]
    pub log_file: Option<bool>,
    #[serde(default)]
    pub email: Option<EmailOverlay>,
    #[serde(default)]
    pub slack: Option<SlackOverlay>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailOverlay {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub smtp_config: Option<SmtpOverlay>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmtpOverlay {
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackOverlay {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *slot = v.clone();
    }
}

fn set_some<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        *slot = value.clone();
    }
}

impl SystemConfig {
    /// Apply the fields present in `overlay`. Scalars and lists replace,
    /// sections merge field by field. Applying twice equals applying once.
    pub fn apply_overlay(&mut self, overlay: &ConfigOverlay) {
        if let Some(o) = &overlay.admin {
            set(&mut self.admin.default_uid, &o.default_uid);
            set(&mut self.admin.default_email, &o.default_email);
            set(&mut self.admin.auto_initialize, &o.auto_initialize);
        }

        if let Some(o) = &overlay.firebase {
            set_some(&mut self.firebase.project_id, &o.project_id);
            set_some(&mut self.firebase.service_account_key, &o.service_account_key);
        }

        if let Some(o) = &overlay.documentation {
            set(&mut self.documentation.auto_organize, &o.auto_organize);
            set(&mut self.documentation.create_backup, &o.create_backup);
            set(&mut self.documentation.update_references, &o.update_references);
            set(&mut self.documentation.use_git_mv, &o.use_git_mv);
            set(&mut self.documentation.command, &o.command);
        }

        if let Some(o) = &overlay.deployment {
            set(&mut self.deployment.auto_commit, &o.auto_commit);
            set(&mut self.deployment.targets, &o.targets);
            set(&mut self.deployment.auto_rollback, &o.auto_rollback);
            set(&mut self.deployment.build_before_deploy, &o.build_before_deploy);
            set_some(&mut self.deployment.timeout_secs, &o.timeout_secs);
        }

        if let Some(o) = &overlay.security {
            set(&mut self.security.encrypt_sensitive_data, &o.encrypt_sensitive_data);
            set_some(&mut self.security.api_keys, &o.api_keys);
        }

        if let Some(o) = &overlay.notifications {
            set(&mut self.notifications.console, &o.console);
            set(&mut self.notifications.log_file, &o.log_file);

            if let Some(email) = &o.email {
                set(&mut self.notifications.email.enabled, &email.enabled);
                if let Some(smtp) = &email.smtp_config {
                    set_some(&mut self.notifications.email.smtp_config.password, &smtp.password);
                }
            }

            if let Some(slack) = &o.slack {
                set(&mut self.notifications.slack.enabled, &slack.enabled);
                set_some(&mut self.notifications.slack.webhook_url, &slack.webhook_url);
            }
        }
    }
}
