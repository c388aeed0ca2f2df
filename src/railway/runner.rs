//! Subprocess execution behind a mockable trait.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tracing::debug;

use crate::error::{DeployError, Result};

/// Deadline for interactive actions (login, init, link, up, logs, installs).
pub const INTERACTIVE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Deadline for quick probes (whoami, status).
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// How the child's standard streams are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Inherit the terminal so the tool can prompt.
    Interactive,
    /// Capture stdout and stderr.
    Capture,
}

/// A fully described subprocess invocation.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Variables set in the child environment.
    pub env: BTreeMap<String, String>,
    /// Variables removed from the child environment.
    pub env_remove: Vec<String>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Stream handling.
    pub mode: RunMode,
    /// Deadline.
    pub timeout: Duration,
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("command", &self.command_line())
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("env_remove", &self.env_remove)
            .field("cwd", &self.cwd)
            .field("mode", &self.mode)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

impl CommandSpec {
    /// Creates a captured probe with the probe deadline.
    #[must_use]
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            env: BTreeMap::new(),
            env_remove: Vec::new(),
            cwd: None,
            mode: RunMode::Capture,
            timeout: PROBE_TIMEOUT,
        }
    }

    /// Switches to interactive mode with the interactive deadline.
    #[must_use]
    pub fn interactive(mut self) -> Self {
        self.mode = RunMode::Interactive;
        self.timeout = INTERACTIVE_TIMEOUT;
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Sets a child variable, cancelling any removal of it.
    pub fn set_env(&mut self, key: &str, value: &str) {
        self.env_remove.retain(|k| k != key);
        self.env.insert(key.to_string(), value.to_string());
    }

    /// Removes a variable from the child environment.
    pub fn remove_env(&mut self, key: &str) {
        self.env.remove(key);
        if !self.env_remove.iter().any(|k| k == key) {
            self.env_remove.push(key.to_string());
        }
    }

    /// Returns true if `key` is stripped from the child environment.
    #[must_use]
    pub fn removes(&self, key: &str) -> bool {
        self.env_remove.iter().any(|k| k == key)
    }

    /// `program arg1 arg2`.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Exit status and captured output of a finished subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if killed by a signal.
    pub code: Option<i32>,
    /// Combined stdout and stderr; empty for interactive runs.
    pub output: String,
}

impl CommandOutput {
    /// Successful exit with the given output.
    #[must_use]
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            output: output.into(),
        }
    }

    /// Failed exit with the given code and output.
    #[must_use]
    pub fn failed(code: i32, output: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            output: output.into(),
        }
    }

    /// Returns true for exit code 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Runs subprocesses and resolves executables.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs a command to completion. A non-zero exit is not an error here.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Resolves an executable on `PATH`.
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// Runs `spec` and turns a non-zero exit into `DeployError::CommandFailed`.
///
/// # Errors
///
/// Returns the runner error or `DeployError::CommandFailed`.
pub async fn run_checked(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<CommandOutput> {
    let output = runner.run(spec).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(DeployError::CommandFailed {
            command: spec.command_line(),
            code: output.code,
            output: output.output,
        }
        .into())
    }
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut command = tokio::process::Command::new(&spec.program);
        command.args(&spec.args).kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        for key in &spec.env_remove {
            command.env_remove(key);
        }
        command.envs(&spec.env);

        debug!(
            "Running `{}` ({:?}, removed env: {:?})",
            spec.command_line(),
            spec.mode,
            spec.env_remove
        );

        let spawn_error = |e: std::io::Error| DeployError::Spawn {
            command: spec.command_line(),
            message: e.to_string(),
        };
        let timeout_error = |_| DeployError::CommandTimeout {
            command: spec.command_line(),
            secs: spec.timeout.as_secs(),
        };

        match spec.mode {
            RunMode::Interactive => {
                command
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
                let mut child = command.spawn().map_err(spawn_error)?;
                let status = tokio::time::timeout(spec.timeout, child.wait())
                    .await
                    .map_err(timeout_error)?
                    .map_err(spawn_error)?;
                Ok(CommandOutput {
                    code: status.code(),
                    output: String::new(),
                })
            }
            RunMode::Capture => {
                command.stdin(Stdio::null());
                let output = tokio::time::timeout(spec.timeout, command.output())
                    .await
                    .map_err(timeout_error)?
                    .map_err(spawn_error)?;
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                Ok(CommandOutput {
                    code: output.status.code(),
                    output: combined,
                })
            }
        }
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_set_and_remove_are_exclusive() {
        let mut spec = CommandSpec::new("railway", &["whoami"]);
        spec.remove_env("RAILWAY_TOKEN");
        assert!(spec.removes("RAILWAY_TOKEN"));

        spec.set_env("RAILWAY_TOKEN", "t");
        assert!(!spec.removes("RAILWAY_TOKEN"));
        assert_eq!(spec.env.get("RAILWAY_TOKEN").map(String::as_str), Some("t"));

        spec.remove_env("RAILWAY_TOKEN");
        assert!(spec.env.is_empty());
        assert_eq!(spec.env_remove.len(), 1);
    }

    #[test]
    fn test_debug_hides_env_values() {
        let mut spec = CommandSpec::new("railway", &["up", "--detach"]).interactive();
        spec.set_env("DATABASE_URL", "postgres://app:secret@h/db");

        let debug = format!("{spec:?}");
        assert!(debug.contains("railway up --detach"));
        assert!(debug.contains("DATABASE_URL"));
        assert!(!debug.contains("secret"));
        assert_eq!(spec.timeout, INTERACTIVE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_run_checked_maps_failure() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_| Ok(CommandOutput::failed(2, "not logged in")));

        let err = run_checked(&runner, &CommandSpec::new("railway", &["whoami"]))
            .await
            .expect_err("should fail");

        assert_eq!(
            err.to_string(),
            "Deploy error: `railway whoami` failed (exit code 2): not logged in"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_and_strips_env() {
        let mut spec = CommandSpec::new("sh", &["-c", "echo \"${FORGE_TEST_A:-unset}\" 1>&2; exit 3"]);
        spec.set_env("FORGE_TEST_A", "visible");

        let output = SystemRunner.run(&spec).await.expect("run");
        assert_eq!(output.code, Some(3));
        assert_eq!(output.output.trim(), "visible");

        spec.remove_env("FORGE_TEST_A");
        let stripped = SystemRunner.run(&spec).await.expect("run");
        assert_eq!(stripped.output.trim(), "unset");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_timeout() {
        let mut spec = CommandSpec::new("sleep", &["5"]);
        spec.timeout = Duration::from_millis(50);

        let err = SystemRunner.run(&spec).await.expect_err("should time out");
        assert!(err.is_timeout());
    }
}
