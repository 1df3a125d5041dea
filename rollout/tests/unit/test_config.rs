//! Configuration manager tests over temporary directories

use std::path::Path;
use std::sync::Arc;

use secrecy::SecretString;
use serde_json::json;

use rollout::config::crypto::is_envelope;
use rollout::config::manager::{ConfigManager, ConfigManagerOptions, CredentialState};
use rollout::config::model::{
    ConfigOverlay, DeploymentOverlay, DeploymentTarget, FirebaseOverlay, SystemConfig, TargetList,
};
use rollout::config::path::{get_config_value, set_config_value};
use rollout::deploy::git::GitOperations;
use rollout::env::{StaticEnvironment, CREDENTIALS_PATH_VAR};
use rollout::errors::RolloutError;
use rollout::testing::ScriptedRunner;

const KEY: &str = "correct horse battery staple 0123456789";

fn manager(dir: &Path, environment: &str, key: Option<&str>) -> ConfigManager {
    let env = StaticEnvironment::new(dir).with_var(CREDENTIALS_PATH_VAR, "/secrets/sa.json");
    ConfigManager::new(
        ConfigManagerOptions {
            base_config_path: dir.join("system-config.json"),
            environment_config_dir: dir.join("config"),
            environment: Some(environment.to_string()),
            encryption_key: key.map(SecretString::from),
        },
        Arc::new(env),
    )
}

fn valid_config() -> SystemConfig {
    let mut config = SystemConfig::default();
    config.admin.default_uid = "uid-admin".to_string();
    config.admin.default_email = "admin@clinic.test".to_string();
    config.firebase.project_id = Some("clinic-dev".to_string());
    config
}

fn with_secrets(mut config: SystemConfig) -> SystemConfig {
    config.security.encrypt_sensitive_data = true;
    config.notifications.email.smtp_config.password = Some("smtp-pass".to_string());
    config.notifications.slack.webhook_url = Some("https://hooks.slack.test/T000".to_string());
    config.security.api_keys = Some("key-1,key-2".to_string());
    config.firebase.service_account_key = Some("{\"type\":\"service_account\"}".to_string());
    config
}

#[tokio::test]
async fn test_missing_base_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = manager(dir.path(), "development", None)
        .load_configuration()
        .await
        .unwrap_err();
    assert!(matches!(err, RolloutError::ConfigNotFound(_)));
}

#[tokio::test]
async fn test_unparseable_base_file() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("system-config.json"), "{ not json")
        .await
        .unwrap();

    let err = manager(dir.path(), "development", None)
        .load_configuration()
        .await
        .unwrap_err();
    assert!(matches!(err, RolloutError::ConfigParse { kind: "base", .. }));
}

#[tokio::test]
async fn test_base_only_without_overlay() {
    let dir = tempfile::tempdir().unwrap();
    let m = manager(dir.path(), "development", None);
    m.save_configuration(&valid_config(), None).await.unwrap();

    let loaded = m.load_configuration().await.unwrap();
    assert_eq!(loaded, valid_config());
}

#[tokio::test]
async fn test_overlay_replaces_present_fields_only() {
    let dir = tempfile::tempdir().unwrap();
    let m = manager(dir.path(), "production", None);
    m.save_configuration(&valid_config(), None).await.unwrap();

    let overlay = ConfigOverlay {
        firebase: Some(FirebaseOverlay {
            project_id: Some("clinic-prod".to_string()),
            ..Default::default()
        }),
        deployment: Some(DeploymentOverlay {
            targets: Some(TargetList::from_targets(&[DeploymentTarget::Hosting])),
            auto_rollback: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    };
    m.create_environment_config("production", &overlay)
        .await
        .unwrap();

    let loaded = m.load_configuration().await.unwrap();
    assert_eq!(loaded.firebase.project_id.as_deref(), Some("clinic-prod"));
    assert_eq!(
        loaded.deployment.targets.resolve().unwrap(),
        vec![DeploymentTarget::Hosting]
    );
    assert!(!loaded.deployment.auto_rollback);
    assert!(loaded.deployment.auto_commit);
    assert_eq!(loaded.admin.default_email, "admin@clinic.test");
}

#[tokio::test]
async fn test_unknown_target_from_overlay_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let m = manager(dir.path(), "staging", None);
    m.save_configuration(&valid_config(), None).await.unwrap();
    tokio::fs::create_dir_all(dir.path().join("config"))
        .await
        .unwrap();
    tokio::fs::write(
        dir.path().join("config/staging.json"),
        json!({ "deployment": { "targets": ["hosting", "database"] } }).to_string(),
    )
    .await
    .unwrap();

    let err = m.load_configuration().await.unwrap_err();
    assert!(matches!(err, RolloutError::Configuration(_)));
    assert!(err.to_string().contains("Invalid deployment target: database"));
}

#[tokio::test]
async fn test_non_array_targets_fail_validation() {
    let dir = tempfile::tempdir().unwrap();
    let mut document = serde_json::to_value(valid_config()).unwrap();
    set_config_value(&mut document, "deployment.targets", json!("hosting"));
    tokio::fs::write(dir.path().join("system-config.json"), document.to_string())
        .await
        .unwrap();

    let err = manager(dir.path(), "development", None)
        .load_configuration()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("deployment.targets must be an array"));
}

#[tokio::test]
async fn test_non_string_target_is_reported_as_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let mut document = serde_json::to_value(valid_config()).unwrap();
    set_config_value(&mut document, "deployment.targets", json!([1]));
    tokio::fs::write(dir.path().join("system-config.json"), document.to_string())
        .await
        .unwrap();

    let err = manager(dir.path(), "development", None)
        .load_configuration()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Invalid deployment target: 1"));
    assert!(!err.to_string().contains("must be an array"));
}

#[tokio::test]
async fn test_sensitive_fields_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let m = manager(dir.path(), "development", Some(KEY));
    let config = with_secrets(valid_config());

    m.save_configuration(&config, None).await.unwrap();

    // Every sensitive leaf is sealed on disk
    let on_disk: SystemConfig = serde_json::from_str(
        &tokio::fs::read_to_string(m.base_config_path()).await.unwrap(),
    )
    .unwrap();
    let mut sealed = on_disk.clone();
    for (field, value) in sealed.sensitive_fields_mut() {
        let value = value.as_deref().unwrap_or_default();
        assert!(is_envelope(value), "{} was written in clear", field);
    }
    assert_eq!(on_disk.admin, config.admin);

    let loaded = m.load_configuration().await.unwrap();
    assert_eq!(loaded, config);
}

#[tokio::test]
async fn test_wrong_key_leaves_fields_encrypted() {
    let dir = tempfile::tempdir().unwrap();
    manager(dir.path(), "development", Some(KEY))
        .save_configuration(&with_secrets(valid_config()), None)
        .await
        .unwrap();

    let other = manager(dir.path(), "development", Some("some other passphrase entirely"));
    let mut config = other.load_base_configuration().await.unwrap();
    let report = other.decrypt_sensitive_data(&mut config).unwrap();

    assert!(report.decrypted.is_empty());
    assert_eq!(report.failures.len(), 4);
    assert!(config
        .security
        .api_keys
        .as_deref()
        .is_some_and(is_envelope));

    // Loading still succeeds; the failures are only reported
    assert!(other.load_configuration().await.is_ok());
}

#[test]
fn test_encryption_requires_key() {
    let dir = tempfile::tempdir().unwrap();
    let m = manager(dir.path(), "development", None);

    let err = m
        .validate_configuration(&with_secrets(valid_config()))
        .unwrap_err();
    assert!(err.to_string().contains("CONFIG_ENCRYPTION_KEY"));

    let err = m.encrypt("secret").unwrap_err();
    assert_eq!(err.to_string(), "Configuration error: Encryption key not provided");
}

#[test]
fn test_malformed_envelope_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let m = manager(dir.path(), "development", Some(KEY));

    assert!(matches!(
        m.decrypt("encrypted:abc"),
        Err(RolloutError::InvalidEncryptedFormat)
    ));

    let sealed = m.encrypt("inventory").unwrap();
    assert_ne!(m.encrypt("inventory").unwrap(), sealed);
    assert_eq!(m.decrypt(&sealed).unwrap(), "inventory");
}

#[tokio::test]
async fn test_list_environments() {
    let dir = tempfile::tempdir().unwrap();
    let m = manager(dir.path(), "development", None);
    assert!(m.list_environments().await.is_empty());

    for name in ["staging", "production"] {
        m.create_environment_config(name, &ConfigOverlay::default())
            .await
            .unwrap();
    }
    tokio::fs::write(dir.path().join("config/README.md"), "notes")
        .await
        .unwrap();

    assert_eq!(m.list_environments().await, vec!["production", "staging"]);
}

#[test]
fn test_dotted_path_access() {
    let mut document = serde_json::to_value(valid_config()).unwrap();

    assert_eq!(
        get_config_value(&document, "admin.defaultUID"),
        Some(&json!("uid-admin"))
    );
    assert_eq!(get_config_value(&document, "admin.missing.deeper"), None);

    set_config_value(&mut document, "firebase.projectId", json!("clinic-qa"));
    let config: SystemConfig = serde_json::from_value(document).unwrap();
    assert_eq!(config.firebase.project_id.as_deref(), Some("clinic-qa"));
}

#[tokio::test]
async fn test_credentials_report_hides_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        ScriptedRunner::new()
            .on("git config user.name", "Ana")
            .on("git config user.email", "ana@clinic.test"),
    );
    let git = GitOperations::new(dir.path(), runner);

    let report = manager(dir.path(), "development", Some(KEY))
        .generate_secure_credentials(&git)
        .await;

    assert_eq!(report.git.status, CredentialState::Configured);
    assert_eq!(report.git.detail.as_deref(), Some("Ana <ana@clinic.test>"));
    assert_eq!(report.firebase.status, CredentialState::Configured);
    assert_eq!(report.encryption.status, CredentialState::Configured);
    assert!(!serde_json::to_string(&report).unwrap().contains(KEY));
}
