//! Provisioning wizard control flow.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::aiven::{AivenClient, CacheProvisioner};
use crate::config::{
    CacheSettings, ConnectionDescriptor, DatabaseSettings, DeploySettings, EnvSource, ProcessEnv,
    ProviderMode, ProvisionOutcome, ProvisionReport, ProvisionTarget, SecretReport, WizardOptions,
    required_secrets, vars,
};
use crate::envfile::{BootstrapOutcome, CredentialSet, apply_overlay, bootstrap};
use crate::error::{ProvisionError, Result};
use crate::neon::{DatabaseProvisioner, NeonClient};
use crate::railway::{CommandRunner, CommandSpec, DeployAdapter, DeployOutcome, run_checked};

use super::plan::{DeployPlan, Stage, StepStatus};
use super::prompt::Prompter;

/// Variables passed to the deployed application.
const RUNTIME_KEYS: [&str; 6] = [
    vars::APP_ENV,
    vars::SITE_BASE_URL,
    vars::JWT_SECRET,
    vars::CSRF_SECRET,
    vars::DATABASE_URL,
    vars::REDIS_URL,
];

/// Summary of a wizard run.
#[derive(Debug, Clone, Serialize)]
pub struct WizardReport {
    /// Steps taken or planned.
    pub plan: DeployPlan,
    /// Presence of required values before prompting.
    pub secrets: SecretReport,
    /// Database step result.
    pub database: Option<ProvisionReport>,
    /// Cache step result.
    pub cache: Option<ProvisionReport>,
    /// Deploy step result.
    pub deploy: Option<DeployOutcome>,
}

/// Runs load, secrets, build, provisioning and deploy in order.
pub struct Wizard {
    options: WizardOptions,
    process: ProcessEnv,
    runner: Arc<dyn CommandRunner>,
    prompter: Box<dyn Prompter>,
    plan: DeployPlan,
}

impl std::fmt::Debug for Wizard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wizard")
            .field("options", &self.options)
            .field("process", &self.process)
            .field("plan", &self.plan)
            .finish_non_exhaustive()
    }
}

impl Wizard {
    /// Creates a wizard.
    #[must_use]
    pub fn new(
        options: WizardOptions,
        process: ProcessEnv,
        runner: Arc<dyn CommandRunner>,
        prompter: Box<dyn Prompter>,
    ) -> Self {
        let plan = DeployPlan::new(options.dry_run);
        Self {
            options,
            process,
            runner,
            prompter,
            plan,
        }
    }

    /// Plan of the latest run, including the failed step if the run failed.
    #[must_use]
    pub const fn plan(&self) -> &DeployPlan {
        &self.plan
    }

    /// Options in use.
    #[must_use]
    pub const fn options(&self) -> &WizardOptions {
        &self.options
    }

    /// Runs the wizard. In dry-run mode nothing is written or executed.
    ///
    /// # Errors
    ///
    /// Returns the first hard failure; the failed step is recorded in
    /// [`Self::plan`].
    pub async fn run(&mut self) -> Result<WizardReport> {
        self.plan = DeployPlan::new(self.options.dry_run);
        info!(
            "Starting wizard run {} ({})",
            self.plan.run_id,
            if self.options.dry_run { "dry run" } else { "live" }
        );

        let result = self.load();
        let mut credentials = self.check(Stage::Load, "load credential file", result)?;

        let secrets = self.report_secrets(&credentials);

        let result = self.prompt_missing(&secrets, &mut credentials);
        self.check(Stage::Prompt, "collect missing values", result)?;

        let result = self.build(&credentials).await;
        self.check(Stage::Build, "build artifacts", result)?;

        let result = self
            .provision(ProvisionTarget::Database, self.options.database, &mut credentials)
            .await;
        let database = self.check(Stage::Database, "provision database", result)?;

        let result = self
            .provision(ProvisionTarget::Cache, self.options.cache, &mut credentials)
            .await;
        let cache = self.check(Stage::Cache, "provision cache", result)?;

        let result = self.deploy(&credentials).await;
        let deploy = self.check(Stage::Deploy, "deploy", result)?;

        Ok(WizardReport {
            plan: self.plan.clone(),
            secrets,
            database,
            cache,
            deploy,
        })
    }

    fn check<T>(&mut self, stage: Stage, description: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!("Wizard step {stage} failed: {e}");
            self.plan.fail(stage, description, e);
        }
        result
    }

    fn env<'a>(&'a self, credentials: &'a CredentialSet) -> EnvSource<'a> {
        EnvSource::new(credentials, &self.process)
    }

    fn load(&mut self) -> Result<CredentialSet> {
        let path = self.options.env_file.clone();

        if self.options.dry_run {
            if path.exists() {
                self.plan.push(
                    Stage::Load,
                    format!("Load {}", path.display()),
                    StepStatus::Executed,
                );
            } else {
                self.plan.record(
                    Stage::Load,
                    format!("Create {} from template or defaults", path.display()),
                );
            }
        } else {
            let description = match bootstrap(&path, &BTreeMap::new())? {
                BootstrapOutcome::AlreadyPresent => format!("Load {}", path.display()),
                BootstrapOutcome::FromTemplate => {
                    format!("Create {} from template", path.display())
                }
                BootstrapOutcome::Minimal => {
                    format!("Create {} with minimal defaults", path.display())
                }
            };
            self.plan.record(Stage::Load, description);
        }

        CredentialSet::load(&path)
    }

    fn report_secrets(&mut self, credentials: &CredentialSet) -> SecretReport {
        let env = self.env(credentials);
        let required = required_secrets(&self.options, &env);
        let report = SecretReport::build(&required, &env);

        let missing = report.missing();
        if missing.is_empty() {
            info!("All {} required values present", report.entries.len());
        } else {
            info!("Missing values: {}", missing.join(", "));
        }

        let description = format!(
            "Check required values ({} of {} present)",
            report.entries.len() - missing.len(),
            report.entries.len()
        );
        self.plan
            .push(Stage::Secrets, description, StepStatus::Executed);
        report
    }

    fn prompt_missing(&mut self, report: &SecretReport, credentials: &mut CredentialSet) -> Result<()> {
        let missing = report.missing();
        let promptable: Vec<_> = required_secrets(&self.options, &self.env(credentials))
            .into_iter()
            .filter(|r| r.is_promptable() && missing.contains(&r.key))
            .collect();

        if promptable.is_empty() {
            self.plan
                .skip(Stage::Prompt, "Ask for missing values", "nothing to ask");
            return Ok(());
        }

        let keys: Vec<_> = promptable.iter().map(|r| r.key).collect();
        let description = format!("Ask for {}", keys.join(", "));
        if !self.options.interactive {
            self.plan.skip(Stage::Prompt, description, "non-interactive");
            return Ok(());
        }
        if self.options.dry_run {
            self.plan.record(Stage::Prompt, description);
            return Ok(());
        }

        let mut updates = BTreeMap::new();
        for secret in &promptable {
            let default = secret.suggested_default();
            let answer = self.prompter.ask(
                &format!("{} ({})", secret.key, secret.description),
                default.as_deref(),
            )?;
            if answer.is_empty() {
                warn!("No value given for {}", secret.key);
            } else {
                updates.insert(secret.key.to_string(), answer);
            }
        }

        if !updates.is_empty() {
            apply_overlay(&self.options.env_file, &updates)?;
            credentials.apply(&updates);
        }
        self.plan.record(Stage::Prompt, description);
        Ok(())
    }

    async fn build(&mut self, credentials: &CredentialSet) -> Result<()> {
        let command = self.env(credentials).get_owned(vars::FORGE_BUILD_CMD);
        let parts: Vec<&str> = command.as_deref().unwrap_or_default().split_whitespace().collect();
        let Some((program, args)) = parts.split_first() else {
            self.plan.skip(
                Stage::Build,
                "Build artifacts",
                format!("{} not set", vars::FORGE_BUILD_CMD),
            );
            return Ok(());
        };

        let spec = CommandSpec::new(*program, args)
            .interactive()
            .in_dir(&self.options.project_dir);
        let description = format!("Run `{}`", spec.command_line());
        if !self.options.dry_run {
            info!("Building: {}", spec.command_line());
            run_checked(self.runner.as_ref(), &spec).await?;
        }
        self.plan.record(Stage::Build, description);
        Ok(())
    }

    async fn provision(
        &mut self,
        target: ProvisionTarget,
        mode: ProviderMode,
        credentials: &mut CredentialSet,
    ) -> Result<Option<ProvisionReport>> {
        let stage = match target {
            ProvisionTarget::Database => Stage::Database,
            ProvisionTarget::Cache => Stage::Cache,
        };
        let variable = target.variable();

        if mode == ProviderMode::Skip {
            self.plan.skip(stage, format!("Provision {target}"), "mode is skip");
            return Ok(None);
        }
        if let Some(existing) = self.env(credentials).get_owned(variable) {
            self.plan
                .skip(stage, format!("Provision {target}"), format!("{variable} already set"));
            return Ok(Some(ProvisionReport::already_configured(target, &existing)));
        }

        match mode {
            ProviderMode::Manual => self.provision_manual(stage, target, credentials).map(Some),
            _ if self.options.dry_run => {
                let lines = match target {
                    ProvisionTarget::Database => {
                        DatabaseProvisioner::new(DatabaseSettings::resolve(&self.env(credentials)))
                            .plan(credentials)
                    }
                    ProvisionTarget::Cache => {
                        CacheProvisioner::new(CacheSettings::resolve(&self.env(credentials)))
                            .plan(credentials)
                    }
                };
                for line in lines {
                    self.plan.record(stage, line);
                }
                Ok(None)
            }
            _ => {
                let env_file = self.options.env_file.clone();
                let report = match target {
                    ProvisionTarget::Database => {
                        let (provisioner, client) = {
                            let env = self.env(credentials);
                            let settings = DatabaseSettings::resolve(&env);
                            let client = NeonClient::from_settings(&settings, &env)?;
                            (DatabaseProvisioner::new(settings), client)
                        };
                        provisioner.provision(&client, credentials, &env_file).await?
                    }
                    ProvisionTarget::Cache => {
                        let (provisioner, client) = {
                            let env = self.env(credentials);
                            let settings = CacheSettings::resolve(&env);
                            let provisioner = CacheProvisioner::new(settings);
                            provisioner.validate()?;
                            let client = AivenClient::from_settings(provisioner.settings(), &env)?;
                            (provisioner, client)
                        };
                        provisioner.provision(&client, credentials, &env_file).await?
                    }
                };
                self.plan.record(
                    stage,
                    format!(
                        "Provision {target} ({} created, {} reused)",
                        report.created.len(),
                        report.reused.len()
                    ),
                );
                Ok(Some(report))
            }
        }
    }

    fn provision_manual(
        &mut self,
        stage: Stage,
        target: ProvisionTarget,
        credentials: &mut CredentialSet,
    ) -> Result<ProvisionReport> {
        let variable = target.variable();
        let description = format!("Paste {variable} for the {target}");

        if self.options.dry_run {
            self.plan.record(stage, description);
            return Ok(ProvisionReport {
                outcome: ProvisionOutcome::Manual,
                created: Vec::new(),
                reused: Vec::new(),
                connection: ConnectionDescriptor::from_uri(target, ""),
            });
        }

        let uri = if self.options.interactive {
            self.prompter.ask(&format!("Paste {variable}"), None)?
        } else {
            String::new()
        };
        let uri = uri.trim().to_string();
        if uri.is_empty() {
            return Err(ProvisionError::NoInput {
                variable: variable.to_string(),
            }
            .into());
        }

        let updates = BTreeMap::from([(variable.to_string(), uri.clone())]);
        apply_overlay(&self.options.env_file, &updates)?;
        credentials.apply(&updates);
        self.plan.record(stage, description);

        Ok(ProvisionReport {
            outcome: ProvisionOutcome::Manual,
            created: Vec::new(),
            reused: Vec::new(),
            connection: ConnectionDescriptor::from_uri(target, uri),
        })
    }

    fn runtime_env(&self, credentials: &CredentialSet) -> BTreeMap<String, String> {
        let env = self.env(credentials);
        RUNTIME_KEYS
            .iter()
            .filter_map(|key| env.get(key).map(|v| ((*key).to_string(), v.to_string())))
            .collect()
    }

    async fn deploy(&mut self, credentials: &CredentialSet) -> Result<Option<DeployOutcome>> {
        if !self.options.deploy {
            self.plan.skip(Stage::Deploy, "Deploy", "deploy disabled");
            return Ok(None);
        }

        let settings = DeploySettings {
            allow_install: self.options.allow_install,
            auto_init: self.options.auto_init,
            link_instead: self.options.link_instead,
            ..DeploySettings::resolve(&self.env(credentials), &self.options.project_dir)
        };
        let mut adapter = DeployAdapter::new(Arc::clone(&self.runner), settings)
            .with_runtime_env(self.runtime_env(credentials));

        if self.options.dry_run {
            for line in adapter.plan() {
                self.plan.record(Stage::Deploy, line);
            }
            return Ok(None);
        }

        adapter.ensure_installed().await?;
        let link_state = adapter.link_state().await;
        if !link_state.is_linked() && !self.options.assume_yes && self.options.interactive {
            let proceed = self.prompter.confirm("Deploy with railway now?", true)?;
            if !proceed {
                self.plan
                    .skip(Stage::Deploy, "railway up --detach", "declined at prompt");
                return Ok(None);
            }
        }

        let outcome = adapter.deploy_with(link_state).await?;
        match &outcome {
            DeployOutcome::Deployed { retried, .. } => {
                let description = if *retried {
                    "railway up --detach (after relink)"
                } else {
                    "railway up --detach"
                };
                self.plan.record(Stage::Deploy, description);
            }
            DeployOutcome::NeedsLink { .. } => {
                self.plan
                    .skip(Stage::Deploy, "railway up --detach", "project not linked");
            }
        }
        Ok(Some(outcome))
    }
}
