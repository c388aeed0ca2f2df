//! Forge CLI entrypoint.
//!
//! This is the main entrypoint for the forge command-line tool.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use forge_deploy::aiven::{AivenClient, CacheProvisioner};
use forge_deploy::cli::{
    Cli, Commands, DeployArgs, OutputFormatter, StatusView, parse_assignment_arg,
};
use forge_deploy::config::{
    CacheSettings, DatabaseSettings, DeploySettings, EnvSource, ProcessEnv, ProvisionTarget,
    SecretReport, SecretStatus, WizardOptions, load_process_env, required_secrets, should_override,
    vars,
};
use forge_deploy::envfile::{CredentialSet, apply_overlay};
use forge_deploy::error::{ConfigError, Result};
use forge_deploy::neon::{DatabaseProvisioner, NeonClient};
use forge_deploy::railway::{DeployAdapter, LogOptions, LogsOutcome, SystemRunner};
use forge_deploy::wizard::{StdinPrompter, Wizard};

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. `RUST_LOG` overrides the default level.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    let dotenv = cli.dir.join(".env");
    let overload = should_override(std::env::var(vars::APP_ENV).ok().as_deref());
    debug!("Reading {} (override: {overload})", dotenv.display());
    let process = load_process_env(&dotenv, overload);

    match cli.command {
        Commands::Deploy(args) => cmd_deploy(&cli.dir, args, process, &formatter).await,
        Commands::Provision {
            target,
            run,
            env_file,
        } => {
            let env_file = env_file.unwrap_or(dotenv);
            cmd_provision(target, run, &env_file, &process, &formatter).await
        }
        Commands::Secrets { set, get, env_file } => {
            let env_file = env_file.unwrap_or(dotenv);
            cmd_secrets(set.as_deref(), get.as_deref(), &cli.dir, &env_file, &process, &formatter)
        }
        Commands::Status { env_file } => {
            let env_file = env_file.unwrap_or(dotenv);
            cmd_status(&cli.dir, &env_file, &process, &formatter).await
        }
        Commands::Logs { follow, since } => {
            let options = LogOptions { follow, since };
            cmd_logs(&cli.dir, &dotenv, &process, &options, &formatter).await
        }
    }
}

/// Run the wizard.
async fn cmd_deploy(
    dir: &Path,
    args: DeployArgs,
    process: ProcessEnv,
    formatter: &OutputFormatter,
) -> Result<()> {
    let mut options = WizardOptions::new(dir);
    options.dry_run = !args.run;
    options.interactive = !args.non_interactive;
    options.assume_yes = args.yes;
    options.database = args.db;
    options.cache = args.cache;
    options.deploy = !args.no_deploy;
    options.allow_install = args.install;
    options.auto_init = args.init || args.link;
    options.link_instead = args.link;
    if let Some(env_file) = args.env_file {
        options.env_file = env_file;
    }

    let mut wizard = Wizard::new(
        options,
        process,
        Arc::new(SystemRunner),
        Box::new(StdinPrompter),
    );

    match wizard.run().await {
        Ok(report) => {
            formatter.print(&formatter.format_wizard_report(&report));
            Ok(())
        }
        Err(e) => {
            formatter.print(&formatter.format_plan(wizard.plan()));
            Err(e)
        }
    }
}

/// Run one provisioner.
async fn cmd_provision(
    target: ProvisionTarget,
    run: bool,
    env_file: &Path,
    process: &ProcessEnv,
    formatter: &OutputFormatter,
) -> Result<()> {
    let mut credentials = CredentialSet::load(env_file)?;

    let report = match target {
        ProvisionTarget::Database => {
            let (provisioner, client) = {
                let env = EnvSource::new(&credentials, process);
                let settings = DatabaseSettings::resolve(&env);
                if !run {
                    let lines = DatabaseProvisioner::new(settings).plan(&credentials);
                    formatter.print(&formatter.format_lines("Database plan (dry run)", &lines));
                    return Ok(());
                }
                let client = NeonClient::from_settings(&settings, &env)?;
                (DatabaseProvisioner::new(settings), client)
            };
            provisioner
                .provision(&client, &mut credentials, env_file)
                .await?
        }
        ProvisionTarget::Cache => {
            let (provisioner, client) = {
                let env = EnvSource::new(&credentials, process);
                let provisioner = CacheProvisioner::new(CacheSettings::resolve(&env));
                if !run {
                    let lines = provisioner.plan(&credentials);
                    formatter.print(&formatter.format_lines("Cache plan (dry run)", &lines));
                    return Ok(());
                }
                provisioner.validate()?;
                let client = AivenClient::from_settings(provisioner.settings(), &env)?;
                (provisioner, client)
            };
            provisioner
                .provision(&client, &mut credentials, env_file)
                .await?
        }
    };

    formatter.print(&formatter.format_provision(&report));
    Ok(())
}

/// Set a value or report presence.
fn cmd_secrets(
    set: Option<&str>,
    get: Option<&str>,
    dir: &Path,
    env_file: &Path,
    process: &ProcessEnv,
    formatter: &OutputFormatter,
) -> Result<()> {
    if let Some(raw) = set {
        let (key, value) = parse_assignment_arg(raw).map_err(|message| ConfigError::InvalidValue {
            name: String::from("--set"),
            message,
        })?;
        let outcome = apply_overlay(env_file, &BTreeMap::from([(key.clone(), value)]))?;
        if outcome.changed {
            formatter.success(&format!("{key} saved to {}", env_file.display()));
        } else {
            formatter.success(&format!("{key} unchanged"));
        }
        return Ok(());
    }

    let credentials = CredentialSet::load(env_file)?;
    let env = EnvSource::new(&credentials, process);

    if let Some(key) = get {
        if env.has(key) {
            formatter.success(&format!("{key} is set"));
        } else {
            formatter.warning(&format!("{key} is not set"));
        }
        return Ok(());
    }

    let report = SecretReport::build(&required_secrets(&WizardOptions::new(dir), &env), &env);
    let view = StatusView {
        secrets: &report,
        link: None,
        cli_installed: None,
    };
    formatter.print(&formatter.format_status(&view));
    Ok(())
}

/// Presence of tokens and runtime values, plus link state.
async fn cmd_status(
    dir: &Path,
    env_file: &Path,
    process: &ProcessEnv,
    formatter: &OutputFormatter,
) -> Result<()> {
    let credentials = CredentialSet::load(env_file)?;
    let env = EnvSource::new(&credentials, process);

    let keys = [
        (vars::NEON_TOKEN, "database platform API token"),
        (vars::AIVEN_TOKEN, "cache platform API token"),
        (vars::RAILWAY_TOKEN, "deploy project token"),
        (vars::RAILWAY_API_TOKEN, "deploy account token"),
        (vars::DATABASE_URL, "Postgres connection string"),
        (vars::REDIS_URL, "Valkey/Redis connection string"),
        (vars::JWT_SECRET, "token signing secret"),
        (vars::CSRF_SECRET, "CSRF protection secret"),
        (vars::SITE_BASE_URL, "public base URL"),
    ];
    let report = SecretReport {
        entries: keys
            .iter()
            .map(|(key, description)| SecretStatus {
                key: (*key).to_string(),
                description: (*description).to_string(),
                secret: *key != vars::SITE_BASE_URL,
                present: env.has(key),
            })
            .collect(),
    };

    let adapter = DeployAdapter::new(Arc::new(SystemRunner), DeploySettings::resolve(&env, dir));
    let cli_installed = adapter.locate().is_some();
    let link = if cli_installed {
        Some(adapter.link_state().await)
    } else {
        None
    };

    let view = StatusView {
        secrets: &report,
        link,
        cli_installed: Some(cli_installed),
    };
    formatter.print(&formatter.format_status(&view));
    Ok(())
}

/// Stream deploy logs.
async fn cmd_logs(
    dir: &Path,
    env_file: &Path,
    process: &ProcessEnv,
    options: &LogOptions,
    formatter: &OutputFormatter,
) -> Result<()> {
    let credentials = CredentialSet::load(env_file)?;
    let settings = DeploySettings::resolve(&EnvSource::new(&credentials, process), dir);
    let adapter = DeployAdapter::new(Arc::new(SystemRunner), settings);
    if let LogsOutcome::NeedsLink { guidance } = adapter.logs(options).await? {
        formatter.warning(&guidance);
    }
    Ok(())
}
