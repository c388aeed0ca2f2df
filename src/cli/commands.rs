//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{ProviderMode, ProvisionTarget};

/// Forge - provision managed Postgres and Valkey, then deploy with Railway.
#[derive(Parser, Debug)]
#[command(name = "forge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project directory (defaults to current directory).
    #[arg(short, long, global = true, env = "FORGE_DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the provisioning and deploy wizard (dry run unless --run).
    Deploy(DeployArgs),

    /// Run a single provisioner.
    Provision {
        /// What to provision.
        target: ProvisionTarget,

        /// Execute instead of printing the plan.
        #[arg(long)]
        run: bool,

        /// Credential file (defaults to <dir>/.env).
        #[arg(long)]
        env_file: Option<PathBuf>,
    },

    /// Set or check values in the credential file.
    Secrets {
        /// Set a value (KEY=VALUE).
        #[arg(long, value_name = "KEY=VALUE", conflicts_with = "get")]
        set: Option<String>,

        /// Report whether a value is set. The value itself is never printed.
        #[arg(long, value_name = "KEY")]
        get: Option<String>,

        /// Credential file (defaults to <dir>/.env).
        #[arg(long)]
        env_file: Option<PathBuf>,
    },

    /// Show token and runtime variable presence plus link state.
    Status {
        /// Credential file (defaults to <dir>/.env).
        #[arg(long)]
        env_file: Option<PathBuf>,
    },

    /// Stream deploy logs.
    Logs {
        /// Keep streaming new lines.
        #[arg(long)]
        follow: bool,

        /// Only show logs after this timestamp.
        #[arg(long, value_name = "TIMESTAMP")]
        since: Option<String>,
    },
}

/// Arguments of the `deploy` command.
#[derive(Args, Debug, Clone)]
pub struct DeployArgs {
    /// Execute instead of printing the plan.
    #[arg(long)]
    pub run: bool,

    /// Deploy without asking for confirmation.
    #[arg(short, long)]
    pub yes: bool,

    /// Never prompt.
    #[arg(long)]
    pub non_interactive: bool,

    /// Install the railway CLI if it is missing.
    #[arg(long)]
    pub install: bool,

    /// Initialize a Railway project when none is linked.
    #[arg(long)]
    pub init: bool,

    /// Link an existing Railway project instead of creating one (implies --init).
    #[arg(long)]
    pub link: bool,

    /// Database step mode.
    #[arg(long, value_enum, default_value_t = ProviderMode::Auto)]
    pub db: ProviderMode,

    /// Cache step mode.
    #[arg(long, value_enum, default_value_t = ProviderMode::Auto)]
    pub cache: ProviderMode,

    /// Skip the deploy step.
    #[arg(long)]
    pub no_deploy: bool,

    /// Credential file (defaults to <dir>/.env).
    #[arg(long)]
    pub env_file: Option<PathBuf>,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Splits `KEY=VALUE`, rejecting an empty key.
///
/// # Errors
///
/// Returns a message when the `=` is missing or the key is empty.
pub fn parse_assignment_arg(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_defaults_to_dry_run() {
        let cli = Cli::try_parse_from(["forge", "deploy"]).expect("parse");

        match cli.command {
            Commands::Deploy(args) => {
                assert!(!args.run);
                assert_eq!(args.db, ProviderMode::Auto);
                assert_eq!(args.cache, ProviderMode::Auto);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.output, OutputFormat::Text);
    }

    #[test]
    fn test_deploy_flags() {
        let cli = Cli::try_parse_from([
            "forge", "deploy", "--run", "--yes", "--db", "manual", "--cache", "skip", "--link",
            "--output", "json",
        ])
        .expect("parse");

        let Commands::Deploy(args) = cli.command else {
            panic!("expected deploy");
        };
        assert!(args.run && args.yes && args.link);
        assert_eq!(args.db, ProviderMode::Manual);
        assert_eq!(args.cache, ProviderMode::Skip);
        assert_eq!(cli.output, OutputFormat::Json);
    }

    #[test]
    fn test_provision_target_names() {
        let cli = Cli::try_parse_from(["forge", "provision", "db", "--run"]).expect("parse");

        assert!(matches!(
            cli.command,
            Commands::Provision {
                target: ProvisionTarget::Database,
                run: true,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["forge", "provision", "cache"]).is_ok());
    }

    #[test]
    fn test_logs_flags() {
        let cli = Cli::try_parse_from(["forge", "logs", "--follow", "--since", "1h"]).expect("parse");

        match cli.command {
            Commands::Logs { follow, since } => {
                assert!(follow);
                assert_eq!(since.as_deref(), Some("1h"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_secrets_set_and_get_conflict() {
        assert!(Cli::try_parse_from(["forge", "secrets", "--set", "A=1", "--get", "A"]).is_err());
    }

    #[test]
    fn test_parse_assignment_arg() {
        assert_eq!(
            parse_assignment_arg("JWT_SECRET=a=b").expect("valid"),
            (String::from("JWT_SECRET"), String::from("a=b"))
        );
        assert!(parse_assignment_arg("=x").is_err());
        assert!(parse_assignment_arg("novalue").is_err());
    }
}
