//! Deploy CLI state machine.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::DeploySettings;
use crate::error::{DeployError, Result};

use super::install::{CLI_NAME, ensure_cli, install_attempts};
use super::runner::{CommandOutput, CommandRunner, CommandSpec, run_checked};
use super::scope::CredentialContext;

/// Directory the CLI creates when a project is linked.
pub const LINK_MARKER_DIR: &str = ".railway";

/// Where the adapter stands before deploying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    /// The CLI is not on `PATH`.
    NotInstalled,
    /// The CLI exists but no project is linked.
    InstalledUnlinked,
    /// A project is linked.
    Linked,
}

/// Evidence that a project is linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSignal {
    /// The `.railway` marker directory exists.
    MarkerDirectory,
    /// A deploy token is present.
    Token,
    /// `railway status --json` names a project.
    CliStatus,
}

impl fmt::Display for LinkSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarkerDirectory => write!(f, "{LINK_MARKER_DIR} directory"),
            Self::Token => write!(f, "deploy token"),
            Self::CliStatus => write!(f, "railway status"),
        }
    }
}

/// Link state, recomputed on every check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkState {
    /// First signal that held, if any.
    pub reason: Option<LinkSignal>,
}

impl LinkState {
    /// Returns true if any signal held.
    #[must_use]
    pub const fn is_linked(&self) -> bool {
        self.reason.is_some()
    }
}

/// Result of a deploy attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeployOutcome {
    /// The deploy was started.
    Deployed {
        /// A project was initialized or linked during this run.
        linked_now: bool,
        /// The deploy succeeded only after relinking and retrying.
        retried: bool,
    },
    /// Nothing was done; the project has to be linked first.
    NeedsLink {
        /// What to run.
        guidance: String,
    },
}

/// Result of a log request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LogsOutcome {
    /// Logs were streamed until the CLI exited.
    Streamed,
    /// Nothing was run; the project has to be linked first.
    NeedsLink {
        /// What to run.
        guidance: String,
    },
}

/// Options forwarded to `railway logs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Keep streaming new lines.
    pub follow: bool,
    /// Only show lines after this timestamp.
    pub since: Option<String>,
}

impl LogOptions {
    fn args(&self) -> Vec<&str> {
        let mut args = vec!["logs"];
        if self.follow {
            args.push("--follow");
        }
        if let Some(since) = self.since.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            args.extend(["--since", since]);
        }
        args
    }
}

/// Instructions shown when the project is not linked.
#[must_use]
pub fn link_guidance() -> String {
    String::from(
        "Run: railway link    (to select project/environment)\n     railway service (to select service)\nThen re-run: forge deploy --run",
    )
}

/// Returns true if `railway status --json` output names a project.
#[must_use]
pub fn status_reports_project(output: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(output) {
        Ok(value) => match value.get("project") {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
            Some(serde_json::Value::Object(o)) => !o.is_empty(),
            Some(_) => true,
        },
        Err(_) => output.contains("\"project\""),
    }
}

/// Drives the `railway` CLI.
pub struct DeployAdapter {
    runner: Arc<dyn CommandRunner>,
    settings: DeploySettings,
    credentials: CredentialContext,
    runtime_env: BTreeMap<String, String>,
    os: &'static str,
}

impl fmt::Debug for DeployAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployAdapter")
            .field("settings", &self.settings)
            .field("credentials", &self.credentials)
            .field("runtime_env", &self.runtime_env.keys().collect::<Vec<_>>())
            .field("os", &self.os)
            .finish_non_exhaustive()
    }
}

impl DeployAdapter {
    /// Creates an adapter for the current OS.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, settings: DeploySettings) -> Self {
        let credentials = CredentialContext::from_settings(&settings);
        Self {
            runner,
            settings,
            credentials,
            runtime_env: BTreeMap::new(),
            os: std::env::consts::OS,
        }
    }

    /// Variables injected into the deploy subprocess.
    #[must_use]
    pub fn with_runtime_env(mut self, runtime_env: BTreeMap<String, String>) -> Self {
        self.runtime_env = runtime_env;
        self
    }

    /// Current credential context.
    #[must_use]
    pub const fn credentials(&self) -> &CredentialContext {
        &self.credentials
    }

    /// Settings in use.
    #[must_use]
    pub const fn settings(&self) -> &DeploySettings {
        &self.settings
    }

    fn command(&self, args: &[&str]) -> CommandSpec {
        CommandSpec::new(CLI_NAME, args).in_dir(&self.settings.project_dir)
    }

    fn up_command(&self) -> CommandSpec {
        let mut spec = self.command(&["up", "--detach"]).interactive();
        for (key, value) in &self.runtime_env {
            spec.set_env(key, value);
        }
        spec
    }

    /// Path to the CLI, if installed.
    #[must_use]
    pub fn locate(&self) -> Option<PathBuf> {
        self.runner.locate(CLI_NAME)
    }

    /// Locates the CLI, installing it when allowed.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::CliNotFound` with install guidance.
    pub async fn ensure_installed(&self) -> Result<PathBuf> {
        ensure_cli(self.runner.as_ref(), self.settings.allow_install, self.os).await
    }

    /// Link state from the marker directory and tokens only.
    #[must_use]
    pub fn link_state_offline(&self) -> LinkState {
        let reason = if self.settings.project_dir.join(LINK_MARKER_DIR).is_dir() {
            Some(LinkSignal::MarkerDirectory)
        } else if self.credentials.has_any_token() {
            Some(LinkSignal::Token)
        } else {
            None
        };
        LinkState { reason }
    }

    /// Link state, falling back to `railway status --json`.
    pub async fn link_state(&self) -> LinkState {
        let offline = self.link_state_offline();
        if offline.is_linked() {
            return offline;
        }

        let mut probe = self.command(&["status", "--json"]);
        self.credentials.apply_to(&mut probe);
        match run_checked(self.runner.as_ref(), &probe).await {
            Ok(output) if status_reports_project(&output.output) => LinkState {
                reason: Some(LinkSignal::CliStatus),
            },
            Ok(_) => LinkState::default(),
            Err(e) => {
                debug!("status probe failed, treating as unlinked: {e}");
                LinkState::default()
            }
        }
    }

    /// Installation and link state.
    pub async fn state(&self) -> AdapterState {
        if self.locate().is_none() {
            AdapterState::NotInstalled
        } else if self.link_state().await.is_linked() {
            AdapterState::Linked
        } else {
            AdapterState::InstalledUnlinked
        }
    }

    /// Makes sure a login session exists, logging in interactively if needed.
    ///
    /// Tokens are withheld for the duration and restored afterwards.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::LoginFailed` if login fails or the session is
    /// still missing afterwards.
    pub async fn ensure_login_session(&mut self) -> Result<()> {
        let runner = Arc::clone(&self.runner);
        let whoami = self.command(&["whoami"]);
        let login = self.command(&["login"]).interactive();
        let guard = self.credentials.suppress_tokens();

        if invoke(runner.as_ref(), &guard, whoami.clone()).await.is_ok() {
            debug!("Login session present");
            return Ok(());
        }

        info!("No railway login session, starting login");
        invoke(runner.as_ref(), &guard, login)
            .await
            .map_err(|e| DeployError::LoginFailed {
                message: e.to_string(),
            })?;
        invoke(runner.as_ref(), &guard, whoami)
            .await
            .map_err(|e| DeployError::LoginFailed {
                message: format!("whoami failed after login: {e}"),
            })?;

        Ok(())
    }

    /// Deploys the project directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the CLI is missing, login fails, init or link
    /// fails, or the deploy fails (after one relink and retry when the
    /// project was set up during this run).
    pub async fn deploy(&mut self) -> Result<DeployOutcome> {
        self.ensure_installed().await?;
        let link_state = self.link_state().await;
        self.deploy_with(link_state).await
    }

    /// Deploys using a link state the caller already computed.
    ///
    /// # Errors
    ///
    /// Same as [`Self::deploy`], except that the CLI must already be located.
    pub async fn deploy_with(&mut self, link_state: LinkState) -> Result<DeployOutcome> {
        let runner = Arc::clone(&self.runner);
        let up = self.up_command();

        if let Some(reason) = link_state.reason {
            info!(
                "Project linked via {reason}; deploying with {}",
                self.credentials.auth_mode()
            );
            invoke(runner.as_ref(), &self.credentials, up).await?;
            return Ok(DeployOutcome::Deployed {
                linked_now: false,
                retried: false,
            });
        }

        if !self.settings.auto_init {
            info!("Project not linked and init not requested");
            return Ok(DeployOutcome::NeedsLink {
                guidance: link_guidance(),
            });
        }

        self.ensure_login_session().await?;
        let link = self.command(&["link"]).interactive();
        let setup = if self.settings.link_instead {
            link.clone()
        } else {
            self.command(&["init"]).interactive()
        };

        let guard = self.credentials.suppress_tokens();
        invoke(runner.as_ref(), &guard, setup).await?;

        match invoke(runner.as_ref(), &guard, up.clone()).await {
            Ok(_) => Ok(DeployOutcome::Deployed {
                linked_now: true,
                retried: false,
            }),
            Err(first) => {
                warn!("Deploy failed right after setup, relinking once: {first}");
                if invoke(runner.as_ref(), &guard, link).await.is_err() {
                    return Err(first);
                }
                invoke(runner.as_ref(), &guard, up).await?;
                Ok(DeployOutcome::Deployed {
                    linked_now: true,
                    retried: true,
                })
            }
        }
    }

    /// Streams deploy logs. Nothing runs in an unlinked project.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::CliNotFound` with install guidance if the CLI
    /// is missing, or an error if it exits with failure.
    pub async fn logs(&self, options: &LogOptions) -> Result<LogsOutcome> {
        self.ensure_installed().await?;
        if !self.link_state().await.is_linked() {
            return Ok(LogsOutcome::NeedsLink {
                guidance: String::from(
                    "No Railway project link detected. Run 'railway link' first, then re-run: forge logs",
                ),
            });
        }

        info!("Streaming logs via railway");
        let spec = self.command(&options.args()).interactive();
        invoke(self.runner.as_ref(), &self.credentials, spec).await?;
        Ok(LogsOutcome::Streamed)
    }

    /// Steps [`Self::deploy`] would take, without running anything.
    #[must_use]
    pub fn plan(&self) -> Vec<String> {
        let mut lines = Vec::new();

        match self.locate() {
            Some(path) => lines.push(format!("railway CLI found at {}", path.display())),
            None if self.settings.allow_install => {
                let methods: Vec<_> = install_attempts(self.os)
                    .iter()
                    .map(|a| a.command.command_line())
                    .collect();
                lines.push(format!("Would install railway CLI (trying: {})", methods.join(", ")));
            }
            None => lines.push(String::from(
                "railway CLI not found; re-run with --install or install it manually",
            )),
        }

        lines.push(format!("Auth: {}", self.credentials.auth_mode()));
        let link_state = self.link_state_offline();

        if let Some(reason) = link_state.reason {
            lines.push(format!("Project linked ({reason})"));
            lines.push(String::from("Would run: railway up --detach"));
        } else if self.settings.auto_init {
            lines.push(String::from("Would run: railway whoami (login session)"));
            lines.push(String::from("Would run: railway login (if session missing)"));
            if self.settings.link_instead {
                lines.push(String::from("Would run: railway link (interactive)"));
            } else {
                lines.push(String::from("Would run: railway init (interactive)"));
            }
            lines.push(String::from("Would run: railway up --detach"));
            lines.push(String::from(
                "On deploy failure: railway link, then retry railway up --detach once",
            ));
        } else {
            lines.push(String::from("Project not linked; nothing would be deployed"));
            lines.extend(link_guidance().lines().map(|l| l.trim().to_string()));
        }

        if !self.runtime_env.is_empty() {
            let keys: Vec<_> = self.runtime_env.keys().map(String::as_str).collect();
            lines.push(format!("Deploy environment: {}", keys.join(", ")));
        }

        lines
    }
}

async fn invoke(
    runner: &dyn CommandRunner,
    context: &CredentialContext,
    mut spec: CommandSpec,
) -> Result<CommandOutput> {
    context.apply_to(&mut spec);
    run_checked(runner, &spec).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::railway::runner::MockCommandRunner;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn settings(dir: &TempDir, project_token: Option<&str>) -> DeploySettings {
        DeploySettings {
            project_token: project_token.map(str::to_string),
            api_token: None,
            project_dir: dir.path().to_path_buf(),
            allow_install: false,
            auto_init: false,
            link_instead: false,
        }
    }

    fn installed(runner: &mut MockCommandRunner) {
        runner
            .expect_locate()
            .returning(|_| Some(PathBuf::from("/usr/local/bin/railway")));
    }

    #[test]
    fn test_status_output_parsing() {
        assert!(status_reports_project(r#"{"project":{"id":"p","name":"demo"}}"#));
        assert!(status_reports_project(r#"{"project":"demo"}"#));
        assert!(!status_reports_project(r#"{"project":null}"#));
        assert!(!status_reports_project(r#"{"project":""}"#));
        assert!(!status_reports_project("{}"));
        assert!(status_reports_project("warning\n{\"project\": {\"id\": 1}}"));
        assert!(!status_reports_project("No linked project found"));
    }

    #[tokio::test]
    async fn test_project_token_means_linked_without_probe() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut runner = MockCommandRunner::new();
        installed(&mut runner);
        runner.expect_run().never();

        let adapter = DeployAdapter::new(Arc::new(runner), settings(&dir, Some("proj")));

        assert_eq!(adapter.link_state().await.reason, Some(LinkSignal::Token));
        assert_eq!(adapter.state().await, AdapterState::Linked);
    }

    #[tokio::test]
    async fn test_marker_directory_wins_first() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::create_dir(dir.path().join(LINK_MARKER_DIR)).expect("mkdir");
        let adapter = DeployAdapter::new(
            Arc::new(MockCommandRunner::new()),
            settings(&dir, Some("proj")),
        );

        assert_eq!(adapter.link_state_offline().reason, Some(LinkSignal::MarkerDirectory));
    }

    #[tokio::test]
    async fn test_status_probe_links_and_failures_do_not() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut runner = MockCommandRunner::new();
        installed(&mut runner);
        runner
            .expect_run()
            .withf(|spec| spec.command_line() == "railway status --json")
            .times(1)
            .returning(|_| Ok(CommandOutput::ok(r#"{"project":{"name":"demo"}}"#)));
        runner
            .expect_run()
            .times(1)
            .returning(|_| Ok(CommandOutput::failed(1, "Not logged in")));

        let adapter = DeployAdapter::new(Arc::new(runner), settings(&dir, None));

        assert_eq!(adapter.link_state().await.reason, Some(LinkSignal::CliStatus));
        assert!(!adapter.link_state().await.is_linked());
    }

    #[tokio::test]
    async fn test_tokens_restored_after_failed_login() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|spec| spec.removes("RAILWAY_TOKEN") && spec.removes("RAILWAY_API_TOKEN"))
            .returning(|_| Ok(CommandOutput::failed(1, "unauthorized")));

        let mut deploy_settings = settings(&dir, Some("proj"));
        deploy_settings.api_token = Some(String::from("acct"));
        let mut adapter = DeployAdapter::new(Arc::new(runner), deploy_settings);
        let before = adapter.credentials().clone();

        let err = adapter
            .ensure_login_session()
            .await
            .expect_err("login should fail");

        assert!(err.to_string().contains("railway login failed"));
        assert_eq!(adapter.credentials(), &before);
        assert!(adapter.credentials().has_project_token());
    }

    #[tokio::test]
    async fn test_linked_deploy_keeps_tokens_and_injects_runtime_env() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut runner = MockCommandRunner::new();
        installed(&mut runner);
        runner
            .expect_run()
            .withf(|spec| {
                spec.command_line() == "railway up --detach"
                    && spec.env.get("RAILWAY_TOKEN").map(String::as_str) == Some("proj")
                    && spec.env.get("DATABASE_URL").map(String::as_str) == Some("postgres://x")
            })
            .times(1)
            .returning(|_| Ok(CommandOutput::ok("")));

        let mut adapter = DeployAdapter::new(Arc::new(runner), settings(&dir, Some("proj")))
            .with_runtime_env(BTreeMap::from([(
                String::from("DATABASE_URL"),
                String::from("postgres://x"),
            )]));

        let outcome = adapter.deploy().await.expect("deploy");

        assert_eq!(
            outcome,
            DeployOutcome::Deployed {
                linked_now: false,
                retried: false
            }
        );
    }

    #[tokio::test]
    async fn test_unlinked_without_init_needs_link() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut runner = MockCommandRunner::new();
        installed(&mut runner);
        runner
            .expect_run()
            .withf(|spec| spec.command_line() == "railway status --json")
            .returning(|_| Ok(CommandOutput::ok("{}")));

        let mut adapter = DeployAdapter::new(Arc::new(runner), settings(&dir, None));
        let outcome = adapter.deploy().await.expect("deploy");

        match outcome {
            DeployOutcome::NeedsLink { guidance } => {
                assert!(guidance.contains("railway link"));
                assert!(guidance.contains("railway service"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_init_flow_relinks_and_retries_once() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let up_attempts = Arc::new(Mutex::new(0u32));
        let mut runner = MockCommandRunner::new();
        installed(&mut runner);

        let log = Arc::clone(&calls);
        let ups = Arc::clone(&up_attempts);
        runner.expect_run().returning(move |spec| {
            let line = spec.command_line();
            log.lock().expect("lock").push(line.clone());
            match line.as_str() {
                "railway status --json" => Ok(CommandOutput::failed(1, "no project")),
                "railway up --detach" => {
                    let mut n = ups.lock().expect("lock");
                    *n += 1;
                    if *n == 1 {
                        Ok(CommandOutput::failed(1, "service not selected"))
                    } else {
                        Ok(CommandOutput::ok(""))
                    }
                }
                _ => Ok(CommandOutput::ok("")),
            }
        });

        let mut deploy_settings = settings(&dir, None);
        deploy_settings.auto_init = true;
        let mut adapter = DeployAdapter::new(Arc::new(runner), deploy_settings);

        let outcome = adapter.deploy().await.expect("deploy");

        assert_eq!(
            outcome,
            DeployOutcome::Deployed {
                linked_now: true,
                retried: true
            }
        );
        assert_eq!(
            *calls.lock().expect("lock"),
            vec![
                "railway status --json",
                "railway whoami",
                "railway init",
                "railway up --detach",
                "railway link",
                "railway up --detach",
            ]
        );
    }

    #[tokio::test]
    async fn test_logs_forwards_follow_and_since() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut runner = MockCommandRunner::new();
        installed(&mut runner);
        runner
            .expect_run()
            .withf(|spec| {
                spec.command_line() == "railway logs --follow --since 2024-05-01T00:00:00Z"
                    && spec.env.get("RAILWAY_TOKEN").map(String::as_str) == Some("proj")
            })
            .times(1)
            .returning(|_| Ok(CommandOutput::ok("")));

        let adapter = DeployAdapter::new(Arc::new(runner), settings(&dir, Some("proj")));
        let options = LogOptions {
            follow: true,
            since: Some(String::from(" 2024-05-01T00:00:00Z ")),
        };

        assert_eq!(adapter.logs(&options).await.expect("logs"), LogsOutcome::Streamed);
    }

    #[tokio::test]
    async fn test_logs_in_unlinked_project_runs_nothing() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut runner = MockCommandRunner::new();
        installed(&mut runner);
        runner
            .expect_run()
            .withf(|spec| spec.command_line() == "railway status --json")
            .times(1)
            .returning(|_| Ok(CommandOutput::ok(r#"{"project":null}"#)));

        let adapter = DeployAdapter::new(Arc::new(runner), settings(&dir, None));

        match adapter.logs(&LogOptions::default()).await.expect("logs") {
            LogsOutcome::NeedsLink { guidance } => assert!(guidance.contains("railway link")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_logs_without_cli_reports_install_help() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut runner = MockCommandRunner::new();
        runner.expect_locate().returning(|_| None);
        runner.expect_run().never();

        let adapter = DeployAdapter::new(Arc::new(runner), settings(&dir, Some("proj")));
        let err = adapter
            .logs(&LogOptions::default())
            .await
            .expect_err("CLI is missing");

        assert!(err.to_string().contains("npm i -g @railway/cli"));
    }

    #[tokio::test]
    async fn test_deploy_with_known_state_skips_status_probe() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut runner = MockCommandRunner::new();
        runner.expect_run().never();

        let mut adapter = DeployAdapter::new(Arc::new(runner), settings(&dir, None));
        let outcome = adapter
            .deploy_with(LinkState::default())
            .await
            .expect("deploy");

        assert!(matches!(outcome, DeployOutcome::NeedsLink { .. }));
    }

    #[test]
    fn test_plan_reports_auth_mode_and_steps() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut runner = MockCommandRunner::new();
        runner.expect_locate().returning(|_| None);
        runner.expect_run().never();

        let mut deploy_settings = settings(&dir, None);
        deploy_settings.auto_init = true;
        deploy_settings.link_instead = true;
        let adapter = DeployAdapter::new(Arc::new(runner), deploy_settings);

        let plan = adapter.plan();

        assert!(plan.iter().any(|l| l.contains("railway CLI not found")));
        assert!(plan.iter().any(|l| l == "Auth: login session"));
        assert!(plan.iter().any(|l| l.contains("railway link (interactive)")));
        assert!(!plan.iter().any(|l| l.contains("railway init")));
    }
}
