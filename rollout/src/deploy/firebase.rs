//! Firebase CLI wrapper: environment checks, builds and per-target deploys

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::model::DeploymentTarget;
use crate::deploy::control::RunControl;
use crate::env::DEFAULT_RUN_MODE;
use crate::errors::RolloutError;
use crate::filesys::file::File;
use crate::process::{CommandOutput, CommandRunner, CommandSpec};

/// Default timeout for firebase commands
pub const FIREBASE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Timeout for `deploy --only <target>`
pub const DEPLOY_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const FRONTEND_BUILD_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Applies to `npm install` and `npm run build` separately
pub const FUNCTIONS_BUILD_TIMEOUT: Duration = Duration::from_secs(3 * 60);

pub const DEFAULT_PROJECT_ID: &str = "default";

const OUTPUT_TAIL_LINES: usize = 10;
const FINALIZED: &str = "FINALIZED";

#[derive(Debug, Clone)]
pub struct FirebaseOptions {
    pub project_id: String,
    pub working_dir: PathBuf,
    pub targets: Vec<DeploymentTarget>,
    pub build_before_deploy: bool,
    /// Run mode recorded in deployment logs
    pub environment: String,
}

impl Default for FirebaseOptions {
    fn default() -> Self {
        Self {
            project_id: DEFAULT_PROJECT_ID.to_string(),
            working_dir: PathBuf::from("."),
            targets: vec![
                DeploymentTarget::Hosting,
                DeploymentTarget::Functions,
                DeploymentTarget::Firestore,
            ],
            build_before_deploy: true,
            environment: DEFAULT_RUN_MODE.to_string(),
        }
    }
}

/// Pre-deploy environment report.
///
/// `issues` block deployment, `warnings` do not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentValidation {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub checks: BTreeMap<String, bool>,
}

impl EnvironmentValidation {
    fn pass(&mut self, check: &str) {
        self.checks.insert(check.to_string(), true);
    }

    fn fail(&mut self, check: &str, issue: String) {
        self.is_valid = false;
        self.checks.insert(check.to_string(), false);
        self.issues.push(issue);
    }

    fn warn(&mut self, check: &str, warning: &str) {
        self.checks.insert(check.to_string(), false);
        self.warnings.push(warning.to_string());
    }
}

/// Outcome of deploying one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    pub success: bool,
    pub target: DeploymentTarget,
    /// Wall-clock milliseconds, build included
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Deployment-phase output: one result per attempted target, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSummary {
    pub success: bool,
    pub deployments: Vec<DeploymentResult>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Milliseconds
    pub total_duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Why the remaining targets were not launched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<String>,
}

impl DeploymentSummary {
    pub fn failed_targets(&self) -> Vec<DeploymentTarget> {
        self.deployments
            .iter()
            .filter(|d| !d.success)
            .map(|d| d.target)
            .collect()
    }
}

/// Read-only snapshot of remote deployment state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosting_releases: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentLogEntry<'a, T: Serialize> {
    timestamp: DateTime<Utc>,
    project_id: &'a str,
    targets: &'a [DeploymentTarget],
    result: &'a T,
    environment: &'a str,
}

/// Firebase deployer bound to one project and working tree
#[derive(Clone)]
pub struct FirebaseDeployment {
    project_id: String,
    working_dir: PathBuf,
    targets: Vec<DeploymentTarget>,
    build_before_deploy: bool,
    environment: String,
    runner: Arc<dyn CommandRunner>,
}

impl FirebaseDeployment {
    pub fn new(options: FirebaseOptions, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            project_id: options.project_id,
            working_dir: options.working_dir,
            targets: options.targets,
            build_before_deploy: options.build_before_deploy,
            environment: options.environment,
            runner,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Configured target order
    pub fn targets(&self) -> &[DeploymentTarget] {
        &self.targets
    }

    /// Run `firebase <args> --project=<id>` and return trimmed stdout
    pub async fn execute_firebase_command(&self, args: &[&str]) -> Result<String, RolloutError> {
        let spec = self.firebase_spec(args).timeout(FIREBASE_TIMEOUT);
        self.run_firebase(spec, args).await
    }

    fn firebase_spec(&self, args: &[&str]) -> CommandSpec {
        let mut full_args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        full_args.push(format!("--project={}", self.project_id));

        CommandSpec::new("firebase", full_args).current_dir(&self.working_dir)
    }

    async fn run_firebase(&self, spec: CommandSpec, args: &[&str]) -> Result<String, RolloutError> {
        let command = args.join(" ");

        let output = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| RolloutError::FirebaseCommand {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if !output.success() {
            return Err(RolloutError::FirebaseCommand {
                command,
                message: output.failure_text(),
            });
        }

        Ok(output.stdout.trim().to_string())
    }

    /// Check the configured targets' environment
    pub async fn validate_environment(&self) -> EnvironmentValidation {
        self.validate_environment_for(&self.targets).await
    }

    /// CLI presence, authentication, project access and local artifacts.
    /// Expected failures are reported, never returned as errors.
    pub async fn validate_environment_for(
        &self,
        targets: &[DeploymentTarget],
    ) -> EnvironmentValidation {
        let mut validation = EnvironmentValidation {
            is_valid: true,
            ..Default::default()
        };

        let version = CommandSpec::new("firebase", ["--version"])
            .current_dir(&self.working_dir)
            .timeout(FIREBASE_TIMEOUT);
        match self.runner.run(&version).await {
            Ok(output) if output.success() => validation.pass("firebaseCli"),
            _ => validation.fail("firebaseCli", "Firebase CLI is not installed".to_string()),
        }

        match self.execute_firebase_command(&["projects:list"]).await {
            Ok(_) => validation.pass("firebaseAuth"),
            Err(_) => validation.fail(
                "firebaseAuth",
                "Not authenticated with Firebase CLI".to_string(),
            ),
        }

        match self.execute_firebase_command(&["use", "--current"]).await {
            Ok(_) => validation.pass("projectAccess"),
            Err(_) => validation.fail(
                "projectAccess",
                format!("Cannot access Firebase project: {}", self.project_id),
            ),
        }

        if File::new(self.working_dir.join("firebase.json")).exists().await {
            validation.pass("file_firebase.json");
        } else {
            validation.fail(
                "file_firebase.json",
                "Required file missing: firebase.json".to_string(),
            );
        }

        // Build outputs are produced by the deploy step itself
        if targets.contains(&DeploymentTarget::Hosting) {
            if File::new(self.frontend_dir().join("dist")).exists().await {
                validation.pass("hostingBuild");
            } else {
                validation.warn(
                    "hostingBuild",
                    "Frontend build directory not found (frontend/dist)",
                );
            }
        }

        if targets.contains(&DeploymentTarget::Functions) {
            if File::new(self.functions_dir()).exists().await {
                validation.pass("functionsSource");
            } else {
                validation.warn("functionsSource", "Functions source directory not found");
            }
        }

        debug!(
            "Environment validation: valid={} issues={}",
            validation.is_valid,
            validation.issues.len()
        );
        validation
    }

    fn frontend_dir(&self) -> PathBuf {
        self.working_dir.join("frontend")
    }

    fn functions_dir(&self) -> PathBuf {
        self.working_dir.join("functions")
    }

    async fn npm(
        &self,
        component: &'static str,
        dir: &Path,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, RolloutError> {
        let spec = CommandSpec::new("npm", args.iter().copied())
            .current_dir(dir)
            .timeout(timeout);

        let output = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| RolloutError::Build {
                component,
                message: e.to_string(),
            })?;

        if !output.success() {
            return Err(RolloutError::Build {
                component,
                message: output.failure_text(),
            });
        }
        Ok(output)
    }

    /// `npm run build` in `frontend/`
    pub async fn build_frontend(&self) -> Result<(), RolloutError> {
        let dir = self.frontend_dir();
        if !File::new(dir.join("package.json")).exists().await {
            return Err(RolloutError::Build {
                component: "Frontend",
                message: "Frontend package.json not found".to_string(),
            });
        }

        info!("Building frontend...");
        self.npm("Frontend", &dir, &["run", "build"], FRONTEND_BUILD_TIMEOUT)
            .await?;
        info!("Frontend build completed");
        Ok(())
    }

    /// `npm install`, then `npm run build` if the package defines one
    pub async fn build_functions(&self) -> Result<(), RolloutError> {
        let dir = self.functions_dir();
        let manifest = File::new(dir.join("package.json"));
        if !manifest.exists().await {
            return Err(RolloutError::Build {
                component: "Functions",
                message: "Functions package.json not found".to_string(),
            });
        }

        info!("Building functions...");
        self.npm("Functions", &dir, &["install"], FUNCTIONS_BUILD_TIMEOUT)
            .await?;

        let package: serde_json::Value =
            manifest
                .read_json()
                .await
                .map_err(|e| RolloutError::Build {
                    component: "Functions",
                    message: e.to_string(),
                })?;
        if package.pointer("/scripts/build").is_some() {
            self.npm("Functions", &dir, &["run", "build"], FUNCTIONS_BUILD_TIMEOUT)
                .await?;
        }

        info!("Functions build completed");
        Ok(())
    }

    /// Build (if configured) and deploy one target
    pub async fn deploy_target(&self, target: DeploymentTarget) -> DeploymentResult {
        self.deploy_target_under(target, &RunControl::new()).await
    }

    /// As [`deploy_target`](Self::deploy_target), with the deploy command
    /// bounded by `control`: its timeout is clamped to the remaining time and
    /// cancelling the run kills it. Failures are returned in the result.
    pub async fn deploy_target_under(
        &self,
        target: DeploymentTarget,
        control: &RunControl,
    ) -> DeploymentResult {
        let started = Instant::now();
        info!("Deploying {}...", target);

        let outcome = self.build_and_deploy(target, control).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => DeploymentResult {
                success: true,
                target,
                duration_ms,
                output: Some(tail_lines(&output, OUTPUT_TAIL_LINES)),
                error: None,
                timestamp: Utc::now(),
            },
            Err(e) => {
                error!("Deployment failed for {}: {}", target, e);
                DeploymentResult {
                    success: false,
                    target,
                    duration_ms,
                    output: None,
                    error: Some(e.to_string()),
                    timestamp: Utc::now(),
                }
            }
        }
    }

    async fn build_and_deploy(
        &self,
        target: DeploymentTarget,
        control: &RunControl,
    ) -> Result<String, RolloutError> {
        if self.build_before_deploy {
            match target {
                DeploymentTarget::Hosting => self.build_frontend().await?,
                DeploymentTarget::Functions => self.build_functions().await?,
                _ => {}
            }
        }

        let args = ["deploy", "--only", target.as_str()];
        let spec = self
            .firebase_spec(&args)
            .timeout(DEPLOY_TIMEOUT)
            .clamp_timeout(control.remaining())
            .cancel_on(control.token().clone());
        self.run_firebase(spec, &args).await
    }

    /// Validate, then deploy every configured target
    pub async fn deploy_all(&self, control: &RunControl) -> DeploymentSummary {
        let validation = self.validate_environment().await;
        if !validation.is_valid {
            let now = Utc::now();
            return DeploymentSummary {
                success: false,
                deployments: Vec::new(),
                start_time: now,
                end_time: now,
                total_duration: 0,
                error: Some(format!(
                    "Environment validation failed: {}",
                    validation.issues.join(", ")
                )),
                interrupted: None,
            };
        }

        self.deploy_targets(&self.targets, control).await
    }

    /// Deploy `targets` one at a time, in order. A failed target does not
    /// stop the rest; a tripped `control` does.
    pub async fn deploy_targets(
        &self,
        targets: &[DeploymentTarget],
        control: &RunControl,
    ) -> DeploymentSummary {
        let start_time = Utc::now();
        let started = Instant::now();
        let mut deployments = Vec::with_capacity(targets.len());
        let mut interrupted = None;

        for &target in targets {
            if let Err(e) = control.check(&format!("deploying {}", target)) {
                warn!("Stopping deployment: {}", e);
                interrupted = Some(e.to_string());
                break;
            }

            let result = self.deploy_target_under(target, control).await;
            deployments.push(result);
        }

        let success = interrupted.is_none() && deployments.iter().all(|d| d.success);
        DeploymentSummary {
            success,
            deployments,
            start_time,
            end_time: Utc::now(),
            total_duration: started.elapsed().as_millis() as u64,
            error: None,
            interrupted,
        }
    }

    /// Recent hosting releases and deployed functions; never fails
    pub async fn get_deployment_status(&self) -> DeploymentStatus {
        let status = async {
            let releases = self
                .execute_firebase_command(&["hosting:releases:list", "--limit=5"])
                .await?;
            let functions = self.execute_firebase_command(&["functions:list"]).await?;
            Ok::<_, RolloutError>((non_empty_lines(&releases), non_empty_lines(&functions)))
        };

        match status.await {
            Ok((hosting_releases, functions)) => DeploymentStatus {
                success: true,
                hosting_releases,
                functions,
                error: None,
                timestamp: Utc::now(),
            },
            Err(e) => DeploymentStatus {
                success: false,
                hosting_releases: Vec::new(),
                functions: Vec::new(),
                error: Some(e.to_string()),
                timestamp: Utc::now(),
            },
        }
    }

    /// Finalized hosting releases, newest first
    pub async fn finalized_releases(&self, limit: usize) -> Result<Vec<String>, RolloutError> {
        let limit = format!("--limit={}", limit);
        let releases = self
            .execute_firebase_command(&["hosting:releases:list", &limit])
            .await?;
        Ok(releases
            .lines()
            .filter(|line| line.contains(FINALIZED))
            .map(|line| line.trim().to_string())
            .collect())
    }

    /// Append `result` to a JSON-lines deployment log
    pub async fn log_deployment<T: Serialize>(&self, result: &T, path: &Path) {
        let entry = DeploymentLogEntry {
            timestamp: Utc::now(),
            project_id: &self.project_id,
            targets: &self.targets,
            result,
            environment: &self.environment,
        };

        if let Err(e) = File::new(path).append_json_line(&entry).await {
            warn!("Failed to write deployment log: {}", e);
        }
    }
}

fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}
