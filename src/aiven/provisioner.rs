//! Idempotent provisioning of a managed Valkey service.

use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::config::{
    CacheSettings, ConnectionDescriptor, ProvisionOutcome, ProvisionReport, ProvisionTarget, vars,
};
use crate::envfile::{CredentialSet, apply_overlay};
use crate::error::{ConfigError, ProvisionError, Result};
use crate::poller::Poller;

use super::client::AivenClient;
use super::types::{CreateServiceRequest, Service, ServiceState};

/// Ensures a cache service exists and runs, then writes `REDIS_URL`.
#[derive(Debug, Clone)]
pub struct CacheProvisioner {
    settings: CacheSettings,
    create_poller: Poller,
    existing_poller: Poller,
}

impl CacheProvisioner {
    /// Creates a provisioner with the default pollers.
    #[must_use]
    pub const fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            create_poller: Poller::aiven_create(),
            existing_poller: Poller::aiven_existing(),
        }
    }

    /// Overrides both pollers.
    #[must_use]
    pub const fn with_pollers(mut self, create: Poller, existing: Poller) -> Self {
        self.create_poller = create;
        self.existing_poller = existing;
        self
    }

    /// Settings in use.
    #[must_use]
    pub const fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Checks that project, cloud and plan are set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingSetting` naming the first unset variable.
    pub fn validate(&self) -> Result<()> {
        match self.settings.first_missing() {
            Some(name) => Err(ConfigError::missing_setting(name, "cache").into()),
            None => Ok(()),
        }
    }

    /// Describes what [`Self::provision`] would do, without network calls.
    #[must_use]
    pub fn plan(&self, credentials: &CredentialSet) -> Vec<String> {
        if credentials.has(vars::REDIS_URL) {
            return vec![format!("{} already set; cache provisioning skipped", vars::REDIS_URL)];
        }

        let s = &self.settings;
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| String::from("(not set)"));
        vec![
            format!(
                "Ensure {} service '{}' in project {} (cloud {}, plan {})",
                s.service_type,
                s.service_name,
                show(&s.project),
                show(&s.cloud),
                show(&s.plan)
            ),
            String::from("Wait for the service to reach RUNNING"),
            format!("Write {} to the credential file", vars::REDIS_URL),
        ]
    }

    /// Reconciles the service and persists its URI.
    ///
    /// Returns immediately if `REDIS_URL` is already set.
    ///
    /// # Errors
    ///
    /// Returns an error when project, cloud or plan is missing, on API
    /// failures, when the service fails to start or does not start in time,
    /// when its URI is empty, or when the credential file cannot be written.
    pub async fn provision(
        &self,
        client: &AivenClient,
        credentials: &mut CredentialSet,
        env_file: &Path,
    ) -> Result<ProvisionReport> {
        if let Some(existing) = credentials.non_empty(vars::REDIS_URL) {
            info!("{} already set, skipping cache provisioning", vars::REDIS_URL);
            return Ok(ProvisionReport::already_configured(
                ProvisionTarget::Cache,
                existing,
            ));
        }
        self.validate()?;

        let s = &self.settings;
        let (Some(project), Some(cloud), Some(plan)) = (&s.project, &s.cloud, &s.plan) else {
            return Err(ConfigError::missing_setting(vars::AIVEN_PROJECT, "cache").into());
        };
        let name = s.service_name.as_str();
        let mut created = Vec::new();
        let mut reused = Vec::new();

        let service = match client.get_service(project, name).await? {
            Some(service) if service.parsed_state() == ServiceState::Running
                && !service.service_uri.is_empty() =>
            {
                debug!("Service '{name}' already running");
                reused.push(format!("service {name}"));
                service
            }
            Some(service) => {
                info!("Service '{name}' is {}, waiting for RUNNING", service.state);
                reused.push(format!("service {name}"));
                self.wait_running(client, project, name, false).await?
            }
            None => {
                info!("Creating {} service '{name}' in {project}", s.service_type);
                let request = CreateServiceRequest {
                    cloud: cloud.clone(),
                    plan: plan.clone(),
                    service_name: name.to_string(),
                    service_type: s.service_type.clone(),
                };
                client.create_service(project, &request).await?;
                created.push(format!("service {name}"));
                self.wait_running(client, project, name, true).await?
            }
        };

        if service.service_uri.trim().is_empty() {
            return Err(ProvisionError::EmptyServiceUri {
                service: name.to_string(),
            }
            .into());
        }

        let connection = ConnectionDescriptor::from_uri(ProvisionTarget::Cache, &service.service_uri);
        let updates = BTreeMap::from([(vars::REDIS_URL.to_string(), service.service_uri)]);
        apply_overlay(env_file, &updates)?;
        credentials.apply(&updates);
        info!("Cache service '{name}' ready");

        Ok(ProvisionReport {
            outcome: ProvisionOutcome::Provisioned,
            created,
            reused,
            connection,
        })
    }

    async fn wait_running(
        &self,
        client: &AivenClient,
        project: &str,
        name: &str,
        just_created: bool,
    ) -> Result<Service> {
        let poller = if just_created {
            self.create_poller
        } else {
            self.existing_poller
        };
        let label = format!("service {name}");
        let mut source = client.service_source(project, name, just_created);
        poller.poll(&mut source, &label).await?;

        source.into_last().ok_or_else(|| {
            ProvisionError::EmptyServiceUri {
                service: name.to_string(),
            }
            .into()
        })
    }
}
