//! Locating and installing the deploy CLI.

use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::{DeployError, Result};

use super::runner::{CommandRunner, CommandSpec};

/// Executable name of the deploy CLI.
pub const CLI_NAME: &str = "railway";

/// Release page for prebuilt binaries.
pub const RELEASES_URL: &str = "https://github.com/railwayapp/cli/releases";

/// One way of installing the CLI.
#[derive(Debug, Clone)]
pub struct InstallAttempt {
    /// Human label.
    pub label: &'static str,
    /// Executables that must be on `PATH` for this attempt.
    pub requires: &'static [&'static str],
    /// Command to run.
    pub command: CommandSpec,
}

fn attempt(label: &'static str, requires: &'static [&'static str], program: &str, args: &[&str]) -> InstallAttempt {
    InstallAttempt {
        label,
        requires,
        command: CommandSpec::new(program, args).interactive(),
    }
}

/// Install attempts for `os` (as in `std::env::consts::OS`), in preference order.
#[must_use]
pub fn install_attempts(os: &str) -> Vec<InstallAttempt> {
    let npm = attempt("npm", &["npm"], "npm", &["i", "-g", "@railway/cli"]);
    match os {
        "windows" => vec![
            attempt("Scoop", &["scoop"], "scoop", &["install", "railway"]),
            npm,
        ],
        "macos" => vec![
            attempt("Homebrew", &["brew"], "brew", &["install", "railway"]),
            npm,
        ],
        _ => vec![
            attempt(
                "install script",
                &["bash", "curl"],
                "bash",
                &["-lc", "bash <(curl -fsSL cli.new)"],
            ),
            npm,
        ],
    }
}

/// Manual install instructions for `os`.
#[must_use]
pub fn install_guidance(os: &str) -> String {
    let first = match os {
        "windows" => "Scoop (recommended): scoop install railway",
        "macos" => "Homebrew: brew install railway",
        _ => "Shell: bash <(curl -fsSL cli.new)",
    };
    format!(
        "Install the Railway CLI using one of:\n  - {first}\n  - npm: npm i -g @railway/cli\n  - Prebuilt binary: {RELEASES_URL}"
    )
}

/// Returns the CLI path, installing it first when allowed.
///
/// # Errors
///
/// Returns `DeployError::CliNotFound` with install guidance when the CLI is
/// missing and could not be installed.
pub async fn ensure_cli(runner: &dyn CommandRunner, allow_install: bool, os: &str) -> Result<PathBuf> {
    if let Some(path) = runner.locate(CLI_NAME) {
        return Ok(path);
    }

    if allow_install {
        for install in install_attempts(os) {
            if install.requires.iter().any(|tool| runner.locate(tool).is_none()) {
                continue;
            }
            info!("Installing {CLI_NAME} CLI via {}", install.label);
            match runner.run(&install.command).await {
                Ok(output) if output.success() => {}
                Ok(output) => {
                    warn!("{} exited with {:?}", install.command, output.code);
                }
                Err(e) => {
                    warn!("{} failed: {e}", install.command);
                }
            }
            if let Some(path) = runner.locate(CLI_NAME) {
                info!("{CLI_NAME} CLI installed at {}", path.display());
                return Ok(path);
            }
        }
    }

    Err(DeployError::CliNotFound {
        guidance: install_guidance(os),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::railway::runner::{CommandOutput, MockCommandRunner};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_attempts_per_os() {
        let labels = |os| {
            install_attempts(os)
                .iter()
                .map(|a| a.command.command_line())
                .collect::<Vec<_>>()
        };

        assert_eq!(labels("windows"), vec!["scoop install railway", "npm i -g @railway/cli"]);
        assert_eq!(labels("macos"), vec!["brew install railway", "npm i -g @railway/cli"]);
        assert_eq!(
            labels("linux"),
            vec!["bash -lc bash <(curl -fsSL cli.new)", "npm i -g @railway/cli"]
        );
    }

    #[test]
    fn test_guidance_mentions_release_page() {
        let guidance = install_guidance("windows");

        assert!(guidance.contains("scoop install railway"));
        assert!(guidance.contains(RELEASES_URL));
    }

    #[tokio::test]
    async fn test_missing_cli_without_install_fails_with_guidance() {
        let mut runner = MockCommandRunner::new();
        runner.expect_locate().returning(|_| None);
        runner.expect_run().never();

        let err = ensure_cli(&runner, false, "linux")
            .await
            .expect_err("cli is missing");

        assert!(err.to_string().contains("railway CLI not found"));
        assert!(err.to_string().contains("cli.new"));
    }

    #[tokio::test]
    async fn test_install_skips_unavailable_managers() {
        let installed = Arc::new(AtomicBool::new(false));
        let mut runner = MockCommandRunner::new();

        let seen = Arc::clone(&installed);
        runner
            .expect_locate()
            .withf(|program| program == "railway")
            .returning(move |_| seen.load(Ordering::SeqCst).then(|| PathBuf::from("/usr/bin/railway")));
        runner.expect_locate().withf(|program| program == "brew").returning(|_| None);
        runner
            .expect_locate()
            .withf(|program| program == "npm")
            .returning(|_| Some(PathBuf::from("/usr/bin/npm")));

        let done = Arc::clone(&installed);
        runner
            .expect_run()
            .withf(|spec| spec.command_line() == "npm i -g @railway/cli")
            .times(1)
            .returning(move |_| {
                done.store(true, Ordering::SeqCst);
                Ok(CommandOutput::ok(""))
            });

        let path = ensure_cli(&runner, true, "macos").await.expect("install");

        assert_eq!(path, PathBuf::from("/usr/bin/railway"));
    }
}
