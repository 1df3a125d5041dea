//! Configuration loading, validation and sensitive-field encryption

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::crypto::{is_envelope, Envelope, FieldCipher};
use crate::config::model::{ConfigOverlay, SystemConfig};
use crate::deploy::git::GitOperations;
use crate::env::{
    Environment, CREDENTIALS_PATH_VAR, ENCRYPTION_KEY_VAR, SLACK_WEBHOOK_VAR, SMTP_HOST_VAR,
    SMTP_PASS_VAR, SMTP_USER_VAR,
};
use crate::errors::RolloutError;
use crate::filesys::file::File;

pub const DEFAULT_BASE_CONFIG_PATH: &str = ".rollout/system-config.json";
pub const DEFAULT_ENVIRONMENT_CONFIG_DIR: &str = ".rollout/config";

const PRODUCTION: &str = "production";

/// Where configuration lives and which overlay applies
#[derive(Debug, Clone)]
pub struct ConfigManagerOptions {
    pub base_config_path: PathBuf,
    pub environment_config_dir: PathBuf,
    /// Overlay name; defaults to the environment's run mode
    pub environment: Option<String>,
    /// Defaults to `CONFIG_ENCRYPTION_KEY`
    pub encryption_key: Option<SecretString>,
}

impl Default for ConfigManagerOptions {
    fn default() -> Self {
        Self {
            base_config_path: PathBuf::from(DEFAULT_BASE_CONFIG_PATH),
            environment_config_dir: PathBuf::from(DEFAULT_ENVIRONMENT_CONFIG_DIR),
            environment: None,
            encryption_key: None,
        }
    }
}

/// A sensitive field that could not be decrypted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFailure {
    pub field: String,
    pub error: String,
}

/// Result of a collect-and-report decryption pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionReport {
    pub decrypted: Vec<String>,
    pub failures: Vec<FieldFailure>,
}

impl DecryptionReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialState {
    Configured,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialCheck {
    pub status: CredentialState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl CredentialCheck {
    fn configured(detail: Option<String>) -> Self {
        Self {
            status: CredentialState::Configured,
            detail,
            instructions: None,
        }
    }

    fn missing(instructions: &str) -> Self {
        Self {
            status: CredentialState::Missing,
            detail: None,
            instructions: Some(instructions.to_string()),
        }
    }
}

/// Ambient identity status; never carries secret values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsReport {
    pub generated_at: DateTime<Utc>,
    pub firebase: CredentialCheck,
    pub git: CredentialCheck,
    pub encryption: CredentialCheck,
}

/// Loads base + overlay configuration and guards sensitive fields
#[derive(Debug, Clone)]
pub struct ConfigManager {
    base_config_path: PathBuf,
    environment_config_dir: PathBuf,
    environment: String,
    encryption_key: Option<SecretString>,
    env: Arc<dyn Environment>,
}

impl ConfigManager {
    pub fn new(options: ConfigManagerOptions, env: Arc<dyn Environment>) -> Self {
        let cwd = env.current_dir();
        let resolve = |p: PathBuf| if p.is_absolute() { p } else { cwd.join(p) };

        Self {
            base_config_path: resolve(options.base_config_path),
            environment_config_dir: resolve(options.environment_config_dir),
            environment: options.environment.unwrap_or_else(|| env.run_mode()),
            encryption_key: options
                .encryption_key
                .or_else(|| env.var(ENCRYPTION_KEY_VAR).map(SecretString::from)),
            env,
        }
    }

    pub fn current_environment(&self) -> &str {
        &self.environment
    }

    pub fn base_config_path(&self) -> &Path {
        &self.base_config_path
    }

    pub fn environment_config_path(&self, environment: &str) -> PathBuf {
        self.environment_config_dir
            .join(format!("{}.json", environment))
    }

    /// Load, merge, validate and (if enabled) decrypt
    pub async fn load_configuration(&self) -> Result<SystemConfig, RolloutError> {
        let base = self.load_base_configuration().await?;
        let overlay = self.load_environment_configuration().await?;
        let mut config = Self::merge_configurations(&base, &overlay);

        self.validate_configuration(&config)?;

        if config.security.encrypt_sensitive_data {
            let report = self.decrypt_sensitive_data(&mut config)?;
            if !report.is_complete() {
                warn!(
                    "{} sensitive field(s) left encrypted",
                    report.failures.len()
                );
            }
        }

        info!("Configuration loaded for environment '{}'", self.environment);
        Ok(config)
    }

    /// The base file is required
    pub async fn load_base_configuration(&self) -> Result<SystemConfig, RolloutError> {
        let file = File::new(&self.base_config_path);
        let contents = match file.read_string().await {
            Ok(contents) => contents,
            Err(RolloutError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RolloutError::ConfigNotFound(
                    self.base_config_path.display().to_string(),
                ));
            }
            Err(e) => {
                return Err(RolloutError::ConfigParse {
                    kind: "base",
                    message: e.to_string(),
                })
            }
        };

        serde_json::from_str(&contents).map_err(|e| RolloutError::ConfigParse {
            kind: "base",
            message: e.to_string(),
        })
    }

    /// The overlay is optional; a missing file is an empty overlay
    pub async fn load_environment_configuration(&self) -> Result<ConfigOverlay, RolloutError> {
        let path = self.environment_config_path(&self.environment);
        let file = File::new(&path);
        let contents = match file.read_string().await {
            Ok(contents) => contents,
            Err(RolloutError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Environment configuration not found: {}, using base configuration only",
                    path.display()
                );
                return Ok(ConfigOverlay::default());
            }
            Err(e) => {
                return Err(RolloutError::ConfigParse {
                    kind: "environment",
                    message: e.to_string(),
                })
            }
        };

        serde_json::from_str(&contents).map_err(|e| RolloutError::ConfigParse {
            kind: "environment",
            message: e.to_string(),
        })
    }

    /// Overlay wins on scalars and lists; sections merge field-wise
    pub fn merge_configurations(base: &SystemConfig, overlay: &ConfigOverlay) -> SystemConfig {
        let mut merged = base.clone();
        merged.apply_overlay(overlay);
        merged
    }

    /// Fail-fast validation: returns the first rule that fails.
    pub fn validate_configuration(&self, config: &SystemConfig) -> Result<(), RolloutError> {
        if config.admin.default_uid.trim().is_empty() {
            return Err(invalid("admin.defaultUID is required"));
        }
        if config.admin.default_email.trim().is_empty() {
            return Err(invalid("admin.defaultEmail is required"));
        }

        config.deployment.targets.resolve().map_err(|e| match e {
            RolloutError::Configuration(msg) => invalid(&msg),
            other => other,
        })?;

        if self.environment == PRODUCTION && !self.env.is_set(CREDENTIALS_PATH_VAR) {
            return Err(missing_var(CREDENTIALS_PATH_VAR));
        }

        if config.security.encrypt_sensitive_data && self.encryption_key.is_none() {
            return Err(missing_var(ENCRYPTION_KEY_VAR));
        }

        if config.notifications.email.enabled {
            for var in [SMTP_HOST_VAR, SMTP_USER_VAR, SMTP_PASS_VAR] {
                if !self.env.is_set(var) {
                    return Err(missing_var(var));
                }
            }
        }

        if config.notifications.slack.enabled && !self.env.is_set(SLACK_WEBHOOK_VAR) {
            return Err(missing_var(SLACK_WEBHOOK_VAR));
        }

        Ok(())
    }

    /// Write `config` to `path` (default: the base file), encrypting a copy
    /// first when encryption is enabled
    pub async fn save_configuration(
        &self,
        config: &SystemConfig,
        path: Option<&Path>,
    ) -> Result<(), RolloutError> {
        let target = path.unwrap_or(&self.base_config_path);

        let mut to_save = config.clone();
        if config.security.encrypt_sensitive_data {
            self.encrypt_sensitive_data(&mut to_save)?;
        }

        File::new(target).write_json(&to_save).await?;
        debug!("Configuration saved to: {}", target.display());
        Ok(())
    }

    /// Write an overlay file for `environment`
    pub async fn create_environment_config(
        &self,
        environment: &str,
        overlay: &ConfigOverlay,
    ) -> Result<PathBuf, RolloutError> {
        let path = self.environment_config_path(environment);
        File::new(&path).write_json(overlay).await?;
        Ok(path)
    }

    /// Names of the overlay files present
    pub async fn list_environments(&self) -> Vec<String> {
        let Ok(mut entries) = tokio::fs::read_dir(&self.environment_config_dir).await else {
            return Vec::new();
        };

        let mut environments = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    environments.push(stem.to_string());
                }
            }
        }
        environments.sort();
        environments
    }

    fn cipher(&self) -> Result<FieldCipher, RolloutError> {
        let key = self
            .encryption_key
            .as_ref()
            .ok_or_else(|| RolloutError::Configuration("Encryption key not provided".to_string()))?;
        FieldCipher::from_passphrase(key)
    }

    pub fn encrypt(&self, text: &str) -> Result<String, RolloutError> {
        self.cipher()?.encrypt(text)
    }

    /// The envelope is checked before the key is looked up
    pub fn decrypt(&self, text: &str) -> Result<String, RolloutError> {
        let envelope = Envelope::parse(text)?;
        self.cipher()?.open(&envelope)
    }

    /// Encrypt every plaintext sensitive leaf; returns how many were sealed
    pub fn encrypt_sensitive_data(&self, config: &mut SystemConfig) -> Result<usize, RolloutError> {
        let cipher = self.cipher()?;
        let mut sealed = 0;

        for (_, slot) in config.sensitive_fields_mut() {
            if let Some(value) = slot.as_mut() {
                if !value.is_empty() && !is_envelope(value) {
                    *value = cipher.encrypt(value)?;
                    sealed += 1;
                }
            }
        }

        Ok(sealed)
    }

    /// Collect-and-report decryption: a field that fails to decrypt is
    /// recorded and left untouched, the rest of the pass continues.
    pub fn decrypt_sensitive_data(
        &self,
        config: &mut SystemConfig,
    ) -> Result<DecryptionReport, RolloutError> {
        let cipher = self.cipher()?;
        let mut report = DecryptionReport::default();

        for (field, slot) in config.sensitive_fields_mut() {
            let Some(value) = slot.as_mut() else {
                continue;
            };
            if !is_envelope(value) {
                continue;
            }

            match cipher.decrypt(value) {
                Ok(plaintext) => {
                    *value = plaintext;
                    report.decrypted.push(field.to_string());
                }
                Err(e) => {
                    warn!("Failed to decrypt field {}: {}", field, e);
                    report.failures.push(FieldFailure {
                        field: field.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Report configured/missing status for git identity, cloud credentials
    /// and the encryption key
    pub async fn generate_secure_credentials(&self, git: &GitOperations) -> CredentialsReport {
        let firebase = match self.env.var(CREDENTIALS_PATH_VAR) {
            Some(path) => CredentialCheck::configured(Some(path)),
            None => CredentialCheck::missing(&format!(
                "Set {} environment variable",
                CREDENTIALS_PATH_VAR
            )),
        };

        let git_check = match (
            git.config_value("user.name").await,
            git.config_value("user.email").await,
        ) {
            (Some(name), Some(email)) => {
                CredentialCheck::configured(Some(format!("{} <{}>", name, email)))
            }
            _ => CredentialCheck::missing("Configure git user.name and user.email"),
        };

        let encryption = if self.encryption_key.is_some() {
            CredentialCheck::configured(None)
        } else {
            CredentialCheck::missing(&format!(
                "Set {} environment variable (32+ random characters)",
                ENCRYPTION_KEY_VAR
            ))
        };

        CredentialsReport {
            generated_at: Utc::now(),
            firebase,
            git: git_check,
            encryption,
        }
    }
}

fn invalid(rule: &str) -> RolloutError {
    RolloutError::Configuration(format!("Configuration validation failed: {}", rule))
}

fn missing_var(var: &str) -> RolloutError {
    RolloutError::Configuration(format!(
        "Configuration validation failed: missing required environment variable {}",
        var
    ))
}
