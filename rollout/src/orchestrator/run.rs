//! Admin → documentation → deployment setup run

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::manager::{ConfigManager, ConfigManagerOptions};
use crate::config::model::SystemConfig;
use crate::deploy::control::RunControl;
use crate::deploy::firebase::{
    EnvironmentValidation, FirebaseDeployment, FirebaseOptions, DEFAULT_PROJECT_ID,
};
use crate::deploy::git::{ChangeType, GitOperations};
use crate::deploy::pipeline::{DeploymentPipeline, PipelineOptions, PipelineRun};
use crate::deploy::rollback::FailureNotifier;
use crate::env::{Environment, ADMIN_EMAIL_VAR, ADMIN_UID_VAR, PROJECT_ID_VAR};
use crate::errors::RolloutError;
use crate::filesys::file::File;
use crate::orchestrator::collaborators::{
    AdminBootstrap, AdminSetupResult, CommandDocumentationManager, DocumentationManager,
    DocumentationResult, EnvironmentValidator, FirebaseAdminBootstrap,
};
use crate::orchestrator::options::{OrchestratorOptions, SetupOptions};
use crate::orchestrator::progress::{Progress, StepStatus};
use crate::process::CommandRunner;

pub const ADMIN_STEP: &str = "Admin Setup";
pub const DOCUMENTATION_STEP: &str = "Documentation Organization";
pub const DEPLOYMENT_STEP: &str = "Deployment";

pub const DEFAULT_ADMIN_UID: &str = "default-admin";
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@localhost";

/// Deployment phase output: a preview in dry-run mode, else the pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeploymentPhaseResult {
    Preview {
        success: bool,
        #[serde(rename = "dryRun")]
        dry_run: bool,
        validation: EnvironmentValidation,
    },
    Run(Box<PipelineRun>),
}

impl DeploymentPhaseResult {
    pub fn success(&self) -> bool {
        match self {
            DeploymentPhaseResult::Preview { success, .. } => *success,
            DeploymentPhaseResult::Run(run) => run.success,
        }
    }
}

/// Results of the phases that completed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<AdminSetupResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<DocumentationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentPhaseResult>,
}

impl SetupResults {
    fn all_succeeded(&self) -> bool {
        self.admin.as_ref().is_none_or(|r| r.success)
            && self.documentation.as_ref().is_none_or(|r| r.success)
            && self.deployment.as_ref().is_none_or(|r| r.success())
    }
}

/// Aggregate result of [`SystemOrchestrator::execute_complete_setup`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupReport {
    pub success: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Milliseconds
    pub duration: u64,
    pub results: SetupResults,
    pub errors: Vec<String>,
    pub progress: Progress,
}

#[derive(Serialize)]
struct OrchestratorLogEntry<'a> {
    timestamp: DateTime<Utc>,
    operation: &'static str,
    results: &'a SetupReport,
    environment: &'a str,
}

/// Runs the setup phases in order, keeping whatever completed
pub struct SystemOrchestrator {
    options: OrchestratorOptions,
    env: Arc<dyn Environment>,
    runner: Arc<dyn CommandRunner>,
    config_manager: ConfigManager,
    admin: Option<Arc<dyn AdminBootstrap>>,
    documentation: Arc<dyn DocumentationManager>,
    validator: Option<Arc<dyn EnvironmentValidator>>,
    notifiers: Vec<Arc<dyn FailureNotifier>>,
    control: RunControl,
    progress: Progress,
}

impl SystemOrchestrator {
    pub fn new(
        mut options: OrchestratorOptions,
        env: Arc<dyn Environment>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let working_dir = options.working_dir.clone();
        let config_options = ConfigManagerOptions {
            base_config_path: resolve(&working_dir, &options.config.base_config_path),
            environment_config_dir: resolve(&working_dir, &options.config.environment_config_dir),
            ..options.config.clone()
        };
        options.log_path = options.log_path.map(|p| resolve(&working_dir, &p));

        Self {
            config_manager: ConfigManager::new(config_options, env.clone()),
            documentation: Arc::new(CommandDocumentationManager::new(
                working_dir,
                runner.clone(),
            )),
            admin: None,
            validator: None,
            notifiers: Vec::new(),
            control: RunControl::new(),
            progress: Progress::default(),
            options,
            env,
            runner,
        }
    }

    pub fn with_admin_bootstrap(mut self, admin: Arc<dyn AdminBootstrap>) -> Self {
        self.admin = Some(admin);
        self
    }

    pub fn with_documentation_manager(mut self, manager: Arc<dyn DocumentationManager>) -> Self {
        self.documentation = manager;
        self
    }

    /// Pre-flight check run before the deployment phase
    pub fn with_environment_validator(mut self, validator: Arc<dyn EnvironmentValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_control(mut self, control: RunControl) -> Self {
        self.control = control;
        self
    }

    pub fn add_notification_handler(&mut self, notifier: Arc<dyn FailureNotifier>) {
        self.notifiers.push(notifier);
    }

    pub fn config_manager(&self) -> &ConfigManager {
        &self.config_manager
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Load the configuration; a missing or unparseable file falls back to
    /// the defaults, any other problem (a failed rule) is returned.
    pub async fn load_configuration(&self) -> Result<SystemConfig, RolloutError> {
        match self.config_manager.load_configuration().await {
            Ok(config) => Ok(config),
            Err(e @ (RolloutError::ConfigNotFound(_) | RolloutError::ConfigParse { .. })) => {
                warn!("Could not load configuration: {}, using defaults", e);
                let config = self.create_default_configuration();
                self.config_manager.validate_configuration(&config)?;
                Ok(config)
            }
            Err(e) => Err(e),
        }
    }

    /// Built-in configuration; passes validation outside production.
    /// The admin account and project come from the environment when set.
    pub fn create_default_configuration(&self) -> SystemConfig {
        let mut config = SystemConfig::default();
        config.admin.default_uid = self
            .env
            .var(ADMIN_UID_VAR)
            .unwrap_or_else(|| DEFAULT_ADMIN_UID.to_string());
        config.admin.default_email = self
            .env
            .var(ADMIN_EMAIL_VAR)
            .unwrap_or_else(|| DEFAULT_ADMIN_EMAIL.to_string());
        config.firebase.project_id = self.env.var(PROJECT_ID_VAR);
        config
    }

    pub async fn save_configuration(&self, config: &SystemConfig) -> Result<(), RolloutError> {
        self.config_manager.save_configuration(config, None).await?;
        info!("Configuration saved successfully");
        Ok(())
    }

    pub fn initialize_progress<S: AsRef<str>>(&mut self, steps: &[S]) {
        self.progress = Progress::new(steps);
    }

    /// Unknown step names are ignored
    pub fn update_progress(&mut self, name: &str, status: StepStatus, message: &str) {
        if self.progress.update(name, status, message) {
            info!("{}: {:?}{}", name, status, suffix(message));
        }
    }

    pub fn progress_summary(&self) -> String {
        self.progress.summary()
    }

    fn project_id(&self, config: &SystemConfig) -> String {
        config
            .firebase
            .project_id
            .clone()
            .or_else(|| self.env.var(PROJECT_ID_VAR))
            .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string())
    }

    /// Firebase deployer for `config`, bound to the working directory
    pub fn firebase_deployment(
        &self,
        config: &SystemConfig,
    ) -> Result<FirebaseDeployment, RolloutError> {
        Ok(FirebaseDeployment::new(
            FirebaseOptions {
                project_id: self.project_id(config),
                working_dir: self.options.working_dir.clone(),
                targets: config.deployment.targets.resolve()?,
                build_before_deploy: config.deployment.build_before_deploy,
                environment: self.config_manager.current_environment().to_string(),
            },
            self.runner.clone(),
        ))
    }

    pub fn git_operations(&self) -> GitOperations {
        GitOperations::new(&self.options.working_dir, self.runner.clone())
    }

    /// Pipeline over `firebase` carrying the registered notifiers
    pub fn deployment_pipeline(
        &self,
        config: &SystemConfig,
        firebase: FirebaseDeployment,
    ) -> DeploymentPipeline {
        let mut pipeline =
            DeploymentPipeline::new(self.git_operations(), firebase, config.deployment.auto_rollback);
        for notifier in &self.notifiers {
            pipeline.add_notification_handler(notifier.clone());
        }
        pipeline
    }

    /// Mark `step` failed and hand the error back
    fn fail_step(&mut self, step: &str, e: RolloutError) -> RolloutError {
        self.update_progress(step, StepStatus::Failed, &e.to_string());
        e
    }

    pub async fn execute_admin_setup(
        &mut self,
        config: &SystemConfig,
    ) -> Result<AdminSetupResult, RolloutError> {
        self.update_progress(ADMIN_STEP, StepStatus::Running, "Initializing admin user");

        if self.options.dry_run {
            self.update_progress(
                ADMIN_STEP,
                StepStatus::Completed,
                "Dry run - admin setup skipped",
            );
            return Ok(AdminSetupResult {
                success: true,
                dry_run: true,
                ..Default::default()
            });
        }

        let admin: Arc<dyn AdminBootstrap> = match self.admin.clone() {
            Some(admin) => admin,
            None => match self.firebase_deployment(config) {
                Ok(firebase) => Arc::new(FirebaseAdminBootstrap::new(firebase, self.runner.clone())),
                Err(e) => return Err(self.fail_step(ADMIN_STEP, e)),
            },
        };

        let outcome = admin.initialize_admin(&config.admin).await;
        match outcome {
            Ok(result) => {
                self.update_progress(
                    ADMIN_STEP,
                    StepStatus::Completed,
                    &format!("Admin user initialized: {}", config.admin.default_email),
                );
                Ok(result)
            }
            Err(e) => Err(self.fail_step(ADMIN_STEP, e)),
        }
    }

    pub async fn execute_documentation_organization(
        &mut self,
        config: &SystemConfig,
    ) -> Result<DocumentationResult, RolloutError> {
        self.update_progress(
            DOCUMENTATION_STEP,
            StepStatus::Running,
            "Scanning and organizing files",
        );

        if self.options.dry_run {
            self.update_progress(
                DOCUMENTATION_STEP,
                StepStatus::Completed,
                "Dry run - no files moved",
            );
            return Ok(DocumentationResult {
                success: true,
                dry_run: true,
                ..Default::default()
            });
        }

        let outcome = self.documentation.organize(&config.documentation).await;
        match outcome {
            Ok(result) if result.success => {
                self.update_progress(
                    DOCUMENTATION_STEP,
                    StepStatus::Completed,
                    &format!("Organized {} files", result.files_organized),
                );
                Ok(result)
            }
            Ok(_) => Err(self.fail_step(
                DOCUMENTATION_STEP,
                RolloutError::Phase("Documentation organization failed".to_string()),
            )),
            Err(e) => Err(self.fail_step(DOCUMENTATION_STEP, e)),
        }
    }

    pub async fn execute_deployment(
        &mut self,
        config: &SystemConfig,
    ) -> Result<DeploymentPhaseResult, RolloutError> {
        self.update_progress(
            DEPLOYMENT_STEP,
            StepStatus::Running,
            "Executing deployment pipeline",
        );

        let outcome = self.run_deployment(config).await;
        match outcome {
            Ok(result) => {
                let (status, message) = match &result {
                    DeploymentPhaseResult::Preview { .. } => {
                        (StepStatus::Completed, "Dry run - environment validated".to_string())
                    }
                    DeploymentPhaseResult::Run(run) if run.success => {
                        let targets: Vec<&str> = run
                            .deployment
                            .deployments
                            .iter()
                            .map(|d| d.target.as_str())
                            .collect();
                        (StepStatus::Completed, format!("Deployed {}", targets.join(", ")))
                    }
                    DeploymentPhaseResult::Run(run) => (
                        StepStatus::Failed,
                        format!("Deployment failed for {:?}", run.deployment.failed_targets()),
                    ),
                };
                self.update_progress(DEPLOYMENT_STEP, status, &message);
                Ok(result)
            }
            Err(e) => Err(self.fail_step(DEPLOYMENT_STEP, e)),
        }
    }

    async fn run_deployment(
        &self,
        config: &SystemConfig,
    ) -> Result<DeploymentPhaseResult, RolloutError> {
        let firebase = self.firebase_deployment(config)?;

        if self.options.dry_run {
            let validation = firebase.validate_environment().await;
            return Ok(DeploymentPhaseResult::Preview {
                success: true,
                dry_run: true,
                validation,
            });
        }

        if let Some(validator) = &self.validator {
            let report = validator.validate().await?;
            if !report.passed() {
                return Err(RolloutError::Validation(format!(
                    "Environment validation failed: {} check(s) failed",
                    report.failures()
                )));
            }
        }

        let run = self
            .deployment_pipeline(config, firebase)
            .execute_deployment(
                PipelineOptions {
                    commit_message: Some(self.options.commit_message.clone()),
                    change_type: ChangeType::Deploy,
                    skip_commit: !config.deployment.auto_commit,
                    targets: None,
                },
                &self.control,
            )
            .await?;
        Ok(DeploymentPhaseResult::Run(Box::new(run)))
    }

    /// Run admin → documentation → deployment, honoring skip flags.
    ///
    /// The first phase to fail stops the run; results of earlier phases are
    /// kept. Only a configuration that fails validation is returned as an
    /// error.
    pub async fn execute_complete_setup(
        &mut self,
        setup: SetupOptions,
    ) -> Result<SetupReport, RolloutError> {
        info!("Starting System Orchestration");
        let config = self.load_configuration().await?;

        let mut steps = Vec::new();
        if !setup.skip_admin {
            steps.push(ADMIN_STEP);
        }
        if !setup.skip_docs {
            steps.push(DOCUMENTATION_STEP);
        }
        if !setup.skip_deploy {
            steps.push(DEPLOYMENT_STEP);
        }
        self.initialize_progress(&steps);

        let start_time = Utc::now();
        let started = Instant::now();
        let mut results = SetupResults::default();
        let mut errors = Vec::new();

        if let Err(e) = self.run_phases(&config, setup, &mut results).await {
            error!("Setup failed: {}", e);
            errors.push(e.to_string());
        }

        let report = SetupReport {
            success: errors.is_empty() && results.all_succeeded(),
            start_time,
            end_time: Utc::now(),
            duration: started.elapsed().as_millis() as u64,
            results,
            errors,
            progress: self.progress.clone(),
        };

        if report.success {
            info!("System orchestration completed successfully");
        } else {
            warn!("System orchestration completed with errors");
        }

        self.log_results(&report).await;
        Ok(report)
    }

    async fn run_phases(
        &mut self,
        config: &SystemConfig,
        setup: SetupOptions,
        results: &mut SetupResults,
    ) -> Result<(), RolloutError> {
        if !setup.skip_admin {
            results.admin = Some(self.execute_admin_setup(config).await?);
        }
        if !setup.skip_docs {
            results.documentation = Some(self.execute_documentation_organization(config).await?);
        }
        if !setup.skip_deploy {
            results.deployment = Some(self.execute_deployment(config).await?);
        }
        Ok(())
    }

    async fn log_results(&self, report: &SetupReport) {
        let Some(path) = &self.options.log_path else {
            return;
        };

        let entry = OrchestratorLogEntry {
            timestamp: Utc::now(),
            operation: "system_orchestration",
            results: report,
            environment: self.config_manager.current_environment(),
        };
        if let Err(e) = File::new(path).append_json_line(&entry).await {
            warn!("Could not write log: {}", e);
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn suffix(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(" - {}", message)
    }
}
