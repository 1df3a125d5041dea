//! rollout - Entry Point
//!
//! Checkpointed git + Firebase deployments with automatic rollback, plus the
//! admin / documentation / deployment setup run.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rollout::config::model::{DeploymentTarget, SystemConfig};
use rollout::config::path::{get_config_value, set_config_value};
use rollout::config::ConfigManagerOptions;
use rollout::deploy::control::RunControl;
use rollout::deploy::git::ChangeType;
use rollout::deploy::pipeline::{PipelineOptions, DEFAULT_COMMIT_DESCRIPTION};
use rollout::deploy::rollback::{DeploymentRollback, TracingNotifier};
use rollout::env::{Environment, ProcessEnvironment};
use rollout::filesys::file::File;
use rollout::logs::{init_logging, LogLevel, LogOptions};
use rollout::orchestrator::collaborators::ToolchainValidator;
use rollout::orchestrator::{OrchestratorOptions, SetupOptions, SystemOrchestrator};
use rollout::process::{CommandRunner, SystemRunner};
use rollout::utils::{format_duration_ms, version_info};

const REDACTED: &str = "********";

#[derive(Debug, Parser)]
#[command(name = "rollout", version, about = "Checkpointed deployments with automatic rollback")]
struct Cli {
    /// Preview every phase without side effects
    #[arg(long, global = true)]
    dry_run: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print results as single-line JSON
    #[arg(long, global = true)]
    json: bool,

    /// Base configuration file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Repository to operate on
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    workdir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Admin setup, documentation organization and deployment in order
    Setup {
        #[arg(long)]
        skip_admin: bool,
        #[arg(long)]
        skip_docs: bool,
        #[arg(long)]
        skip_deploy: bool,
    },
    /// Initialize the default admin account
    Admin,
    /// Organize project documentation
    Docs,
    /// Commit, deploy, and roll back on failure
    Deploy(DeployArgs),
    /// Inspect or edit the configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Report which credentials are configured
    Credentials,
    /// Report which rollback mechanisms are usable
    RollbackCheck,
    /// Print version information
    Version,
}

#[derive(Debug, Args)]
struct DeployArgs {
    /// Comma-separated targets, overriding the configuration
    #[arg(long, value_delimiter = ',')]
    targets: Option<Vec<DeploymentTarget>>,

    /// Deploy without committing pending changes
    #[arg(long)]
    skip_commit: bool,

    /// Commit description
    #[arg(long, short)]
    message: Option<String>,

    /// Overall deadline for the run
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the merged configuration with secrets redacted
    Show,
    /// Overwrite the base file with defaults
    Reset,
    /// Print the value at a dotted path
    Get { path: String },
    /// Set a dotted path in the base file to a JSON value
    Set { path: String, value: String },
    /// Load and validate the merged configuration
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let _log_guard = init_logging(LogOptions {
        log_level: LogLevel::from_verbosity(cli.verbose),
        ..Default::default()
    })?;

    let env: Arc<dyn Environment> = Arc::new(ProcessEnvironment);
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let working_dir = if cli.workdir.is_absolute() {
        cli.workdir.clone()
    } else {
        env.current_dir().join(&cli.workdir)
    };

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    // --config is relative to the invocation directory, not --workdir
    let mut config_options = ConfigManagerOptions::default();
    if let Some(path) = &cli.config {
        config_options.base_config_path = env.current_dir().join(path);
    }

    let mut orchestrator = SystemOrchestrator::new(
        OrchestratorOptions {
            dry_run: cli.dry_run,
            working_dir: working_dir.clone(),
            config: config_options,
            ..Default::default()
        },
        env.clone(),
        runner.clone(),
    )
    .with_environment_validator(Arc::new(ToolchainValidator::new(
        &working_dir,
        runner.clone(),
    )))
    .with_control(RunControl::new().with_token(token.clone()));
    orchestrator.add_notification_handler(Arc::new(TracingNotifier));

    match cli.command {
        Command::Setup {
            skip_admin,
            skip_docs,
            skip_deploy,
        } => {
            let report = orchestrator
                .execute_complete_setup(SetupOptions {
                    skip_admin,
                    skip_docs,
                    skip_deploy,
                })
                .await?;
            if !cli.json {
                println!("{}", orchestrator.progress_summary());
                println!("Finished in {}", format_duration_ms(report.duration));
            }
            emit(&report, cli.json)?;
            Ok(exit_code(report.success))
        }
        Command::Admin => {
            let config = orchestrator.load_configuration().await?;
            orchestrator.initialize_progress(&[rollout::orchestrator::run::ADMIN_STEP]);
            let result = orchestrator.execute_admin_setup(&config).await?;
            emit(&result, cli.json)?;
            Ok(exit_code(result.success))
        }
        Command::Docs => {
            let config = orchestrator.load_configuration().await?;
            orchestrator.initialize_progress(&[rollout::orchestrator::run::DOCUMENTATION_STEP]);
            let result = orchestrator
                .execute_documentation_organization(&config)
                .await?;
            emit(&result, cli.json)?;
            Ok(exit_code(result.success))
        }
        Command::Deploy(args) => deploy(&orchestrator, args, token, cli.dry_run, cli.json).await,
        Command::Config(command) => config(&orchestrator, command, cli.json).await,
        Command::Credentials => {
            let git = orchestrator.git_operations();
            let report = orchestrator
                .config_manager()
                .generate_secure_credentials(&git)
                .await;
            emit(&report, cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::RollbackCheck => {
            let config = orchestrator.load_configuration().await?;
            let firebase = orchestrator.firebase_deployment(&config)?;
            let rollback = DeploymentRollback::new(orchestrator.git_operations(), firebase);
            let capability = rollback.validate_rollback_capability().await;
            emit(&capability, cli.json)?;
            Ok(exit_code(capability.can_rollback))
        }
        Command::Version => {
            emit(&version_info(), cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn deploy(
    orchestrator: &SystemOrchestrator,
    args: DeployArgs,
    token: CancellationToken,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let config = orchestrator.load_configuration().await?;
    let firebase = orchestrator.firebase_deployment(&config)?;

    if dry_run {
        let targets = args
            .targets
            .unwrap_or_else(|| firebase.targets().to_vec());
        let validation = firebase.validate_environment_for(&targets).await;
        emit(&validation, json)?;
        return Ok(exit_code(validation.is_valid));
    }

    let control = match args.timeout_secs.or(config.deployment.timeout_secs) {
        Some(secs) => RunControl::with_timeout(Duration::from_secs(secs)),
        None => RunControl::new(),
    }
    .with_token(token);

    let pipeline = orchestrator.deployment_pipeline(&config, firebase);
    let run = pipeline
        .execute_deployment(
            PipelineOptions {
                commit_message: Some(
                    args.message
                        .unwrap_or_else(|| DEFAULT_COMMIT_DESCRIPTION.to_string()),
                ),
                change_type: ChangeType::Deploy,
                skip_commit: args.skip_commit || !config.deployment.auto_commit,
                targets: args.targets,
            },
            &control,
        )
        .await?;

    if !json {
        info!(
            "Run {} finished in {}",
            run.run_id,
            format_duration_ms(run.duration)
        );
    }
    emit(&run, json)?;
    Ok(exit_code(run.success))
}

async fn config(
    orchestrator: &SystemOrchestrator,
    command: ConfigCommand,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let manager = orchestrator.config_manager();

    match command {
        ConfigCommand::Show => {
            let mut config = orchestrator.load_configuration().await?;
            for (_, value) in config.sensitive_fields_mut() {
                if value.is_some() {
                    *value = Some(REDACTED.to_string());
                }
            }
            emit(&config, json)?;
        }
        ConfigCommand::Reset => {
            let config = orchestrator.create_default_configuration();
            orchestrator.save_configuration(&config).await?;
            info!("Configuration reset: {}", manager.base_config_path().display());
        }
        ConfigCommand::Get { path } => {
            let config = serde_json::to_value(orchestrator.load_configuration().await?)?;
            match get_config_value(&config, &path) {
                Some(value) => emit(value, json)?,
                None => bail!("No configuration value at {}", path),
            }
        }
        ConfigCommand::Set { path, value } => {
            let file = File::new(manager.base_config_path());
            let mut document: Value = if file.exists().await {
                file.read_json().await?
            } else {
                serde_json::to_value(SystemConfig::default())?
            };

            let value = serde_json::from_str(&value)
                .unwrap_or_else(|_| Value::String(value.clone()));
            set_config_value(&mut document, &path, value);

            let config: SystemConfig = serde_json::from_value(document.clone())
                .with_context(|| format!("{} does not fit the configuration", path))?;
            manager.validate_configuration(&config)?;
            file.write_json(&document).await?;
            info!("Updated {} in {}", path, file.path().display());
        }
        ConfigCommand::Validate => {
            let config = manager.load_configuration().await?;
            info!(
                "Configuration is valid for environment {}",
                manager.current_environment()
            );
            let targets = config.deployment.targets.resolve()?;
            emit(&targets, json)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn emit<T: Serialize + ?Sized>(value: &T, json: bool) -> anyhow::Result<()> {
    let text = if json {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", text);
    Ok(())
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Cancel `token` on the first interrupt; the run stops at its next step
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            warn!("Could not install SIGTERM handler");
            return;
        };

        tokio::select! {
            _ = sigterm.recv() => {
                warn!("SIGTERM received, cancelling run...");
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Ctrl+C received, cancelling run...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("Could not listen for Ctrl+C");
            return;
        }
        warn!("Ctrl+C received, cancelling run...");
    }

    token.cancel();
}
