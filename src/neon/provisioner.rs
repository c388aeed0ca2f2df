//! Name-addressed, idempotent provisioning of a Postgres database.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{
    ConnectionDescriptor, DatabaseSettings, ProvisionOutcome, ProvisionReport, ProvisionTarget,
    generate_secret, vars,
};
use crate::envfile::{CredentialSet, apply_overlay};
use crate::error::{ApiError, ForgeError, ProvisionError, Result};
use crate::poller::Poller;

use super::client::NeonClient;
use super::types::{CreateResponse, Operation, OperationStatus};

/// Budget for a single provisioning step, polling included.
const STEP_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// Ensures a project, branch, endpoint, role and database exist and writes `DATABASE_URL`.
#[derive(Debug, Clone)]
pub struct DatabaseProvisioner {
    settings: DatabaseSettings,
    poller: Poller,
    step_deadline: Duration,
}

/// Progress collected while reconciling.
#[derive(Debug, Default)]
struct Progress {
    created: Vec<String>,
    reused: Vec<String>,
}

impl DatabaseProvisioner {
    /// Creates a provisioner with the default poller.
    #[must_use]
    pub const fn new(settings: DatabaseSettings) -> Self {
        Self {
            settings,
            poller: Poller::neon_operations(),
            step_deadline: STEP_DEADLINE,
        }
    }

    /// Overrides the operation poller.
    #[must_use]
    pub const fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }

    /// Overrides the per-step deadline.
    #[must_use]
    pub const fn with_step_deadline(mut self, deadline: Duration) -> Self {
        self.step_deadline = deadline;
        self
    }

    /// Settings in use.
    #[must_use]
    pub const fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    /// Describes what [`Self::provision`] would do, without network calls.
    #[must_use]
    pub fn plan(&self, credentials: &CredentialSet) -> Vec<String> {
        if credentials.has(vars::DATABASE_URL) {
            return vec![format!("{} already set; database provisioning skipped", vars::DATABASE_URL)];
        }

        let s = &self.settings;
        vec![
            format!(
                "Ensure database project '{}' (region {})",
                s.project_name,
                s.region_label()
            ),
            format!("Ensure branch '{}'", s.branch_name),
            format!("Ensure read-write endpoint on branch '{}'", s.branch_name),
            format!("Ensure role '{}' and database '{}'", s.role_name, s.database_name),
            format!(
                "Write {} and {} to the credential file",
                vars::DATABASE_URL,
                vars::NEON_DB_PASSWORD
            ),
        ]
    }

    /// Reconciles the database and persists the connection string.
    ///
    /// Returns immediately if `DATABASE_URL` is already set.
    ///
    /// # Errors
    ///
    /// Returns an error on any API failure other than a role or database
    /// that already exists, on a failed or timed out operation, when the
    /// endpoint has no host, or when the credential file cannot be written.
    pub async fn provision(
        &self,
        client: &NeonClient,
        credentials: &mut CredentialSet,
        env_file: &Path,
    ) -> Result<ProvisionReport> {
        if let Some(existing) = credentials.non_empty(vars::DATABASE_URL) {
            info!("{} already set, skipping database provisioning", vars::DATABASE_URL);
            return Ok(ProvisionReport::already_configured(
                ProvisionTarget::Database,
                existing,
            ));
        }

        let s = &self.settings;
        let password_generated = s.password.is_none();
        let password = s.password.clone().unwrap_or_else(generate_secret);
        let mut progress = Progress::default();

        let (project_id, created_project) = self
            .within("ensure project", self.ensure_project(client, &mut progress))
            .await?;

        let captured_branch = created_project
            .as_ref()
            .and_then(|r| r.branch.as_ref())
            .filter(|b| !b.id.is_empty() && b.name.eq_ignore_ascii_case(&s.branch_name))
            .map(|b| b.id.clone());
        let captured_host = captured_branch.as_ref().and_then(|branch| {
            created_project
                .as_ref()
                .and_then(CreateResponse::first_endpoint)
                .filter(|e| e.branch_id.is_empty() || e.branch_id == *branch)
                .map(|e| e.host.clone())
        });

        let branch_id = if let Some(id) = captured_branch {
            debug!("Using branch {id} returned with the new project");
            id
        } else {
            self.within(
                "ensure branch",
                self.ensure_branch(client, &project_id, &mut progress),
            )
            .await?
        };

        let host = if let Some(h) = captured_host {
            h
        } else {
            self.within(
                "ensure endpoint",
                self.ensure_endpoint(client, &project_id, &branch_id, &mut progress),
            )
            .await?
        };
        if host.trim().is_empty() {
            return Err(ProvisionError::MissingEndpointHost {
                project: project_id,
            }
            .into());
        }

        self.within(
            "ensure role",
            self.ensure_role(client, &project_id, &branch_id, &password, &mut progress),
        )
        .await?;
        if password_generated && progress.reused.iter().any(|r| r.starts_with("role ")) {
            warn!(
                "Role '{}' already existed; the generated password may not match. Set {} to its password if connections fail",
                s.role_name,
                vars::NEON_DB_PASSWORD
            );
        }

        self.within(
            "ensure database",
            self.ensure_database(client, &project_id, &branch_id, &mut progress),
        )
        .await?;

        let connection =
            ConnectionDescriptor::postgres(&s.role_name, &password, &host, &s.database_name);

        let updates = BTreeMap::from([
            (vars::DATABASE_URL.to_string(), connection.uri.clone()),
            (vars::NEON_DB_PASSWORD.to_string(), password),
        ]);
        apply_overlay(env_file, &updates)?;
        credentials.apply(&updates);
        info!(
            "Database ready on {host} ({} created, {} reused)",
            progress.created.len(),
            progress.reused.len()
        );

        Ok(ProvisionReport {
            outcome: ProvisionOutcome::Provisioned,
            created: progress.created,
            reused: progress.reused,
            connection,
        })
    }

    async fn within<T, F>(&self, step: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.step_deadline, fut)
            .await
            .map_err(|_| ProvisionError::StepDeadline {
                step: step.to_string(),
                secs: self.step_deadline.as_secs(),
            })?
    }

    async fn ensure_project(
        &self,
        client: &NeonClient,
        progress: &mut Progress,
    ) -> Result<(String, Option<CreateResponse>)> {
        let name = &self.settings.project_name;
        let projects = client.list_projects().await?;

        if let Some(project) = projects
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name) && !p.id.is_empty())
        {
            info!("Reusing database project '{}' ({})", project.name, project.id);
            progress.reused.push(format!("project {name}"));
            return Ok((project.id.clone(), None));
        }

        info!("Creating database project '{name}'");
        let response = client
            .create_project(name, self.settings.region.as_deref())
            .await?;
        let id = response
            .project
            .as_ref()
            .map(|p| p.id.clone())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ForgeError::internal("project creation returned no project id"))?;
        progress.created.push(format!("project {name}"));

        self.wait_operations(client, &response.all_operations()).await?;
        Ok((id, Some(response)))
    }

    async fn ensure_branch(
        &self,
        client: &NeonClient,
        project_id: &str,
        progress: &mut Progress,
    ) -> Result<String> {
        let name = &self.settings.branch_name;
        let branches = client.list_branches(project_id).await?;

        if let Some(branch) = branches
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name) && !b.id.is_empty())
        {
            debug!("Reusing branch '{}' ({})", branch.name, branch.id);
            progress.reused.push(format!("branch {name}"));
            return Ok(branch.id.clone());
        }

        info!("Creating branch '{name}'");
        let response = client.create_branch(project_id, name).await?;
        let id = response
            .branch
            .as_ref()
            .map(|b| b.id.clone())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ForgeError::internal("branch creation returned no branch id"))?;
        progress.created.push(format!("branch {name}"));

        self.wait_operations(client, &response.all_operations()).await?;
        Ok(id)
    }

    async fn ensure_endpoint(
        &self,
        client: &NeonClient,
        project_id: &str,
        branch_id: &str,
        progress: &mut Progress,
    ) -> Result<String> {
        let endpoints = client.list_endpoints(project_id).await?;

        if let Some(endpoint) = endpoints
            .iter()
            .find(|e| e.branch_id == branch_id && e.is_read_write() && !e.host.is_empty())
        {
            debug!("Reusing endpoint {} ({})", endpoint.id, endpoint.host);
            progress.reused.push(format!("endpoint {}", endpoint.id));
            return Ok(endpoint.host.clone());
        }

        info!("Creating read-write endpoint for branch {branch_id}");
        let response = client.create_endpoint(project_id, branch_id).await?;
        let endpoint = response.first_endpoint().cloned().ok_or_else(|| {
            ProvisionError::MissingEndpointHost {
                project: project_id.to_string(),
            }
        })?;
        progress.created.push(format!("endpoint {}", endpoint.id));

        self.wait_operations(client, &response.all_operations()).await?;
        Ok(endpoint.host)
    }

    async fn ensure_role(
        &self,
        client: &NeonClient,
        project_id: &str,
        branch_id: &str,
        password: &str,
        progress: &mut Progress,
    ) -> Result<()> {
        let name = &self.settings.role_name;
        match client
            .create_role(project_id, branch_id, name, password)
            .await
        {
            Ok(response) => {
                info!("Created role '{name}'");
                progress.created.push(format!("role {name}"));
                self.wait_operations(client, &response.all_operations()).await
            }
            Err(e) if is_already_exists(&e) => {
                debug!("Role '{name}' already exists: {e}");
                progress.reused.push(format!("role {name}"));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_database(
        &self,
        client: &NeonClient,
        project_id: &str,
        branch_id: &str,
        progress: &mut Progress,
    ) -> Result<()> {
        let name = &self.settings.database_name;
        match client
            .create_database(project_id, branch_id, name, &self.settings.role_name)
            .await
        {
            Ok(response) => {
                info!("Created database '{name}'");
                progress.created.push(format!("database {name}"));
                self.wait_operations(client, &response.all_operations()).await
            }
            Err(e) if is_already_exists(&e) => {
                debug!("Database '{name}' already exists: {e}");
                progress.reused.push(format!("database {name}"));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn wait_operations(&self, client: &NeonClient, operations: &[Operation]) -> Result<()> {
        for operation in operations {
            if operation.parsed_status() == OperationStatus::Succeeded {
                continue;
            }
            let label = format!("operation {} ({})", operation.id, operation.action);
            let mut source = client.operation_source(operation.id.clone());
            self.poller.poll(&mut source, &label).await?;
        }
        Ok(())
    }
}

fn is_already_exists(error: &ForgeError) -> bool {
    error.as_api().is_some_and(ApiError::is_conflict)
}
