//! Cache platform API client.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::{AuthScheme, ResourceClient, path_segment};
use crate::config::{CacheSettings, EnvSource, vars};
use crate::error::{ApiError, Result};
use crate::poller::{PollStatus, StatusSource};

use super::types::{CreateServiceRequest, Service, ServiceEnvelope, ServiceState};

/// Provider name used in errors and logs.
pub const PROVIDER: &str = "aiven";

/// Authorization header prefix.
pub const AUTH_PREFIX: &str = "aivenv1";

/// Request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Cache platform API client.
#[derive(Debug, Clone)]
pub struct AivenClient {
    api: ResourceClient,
}

impl AivenClient {
    /// Wraps an existing resource client.
    #[must_use]
    pub const fn new(api: ResourceClient) -> Self {
        Self { api }
    }

    /// Builds a client from settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `AIVEN_TOKEN` is unset or the HTTP client cannot be created.
    pub fn from_settings(settings: &CacheSettings, env: &EnvSource<'_>) -> Result<Self> {
        ResourceClient::from_credentials(
            PROVIDER,
            vars::AIVEN_TOKEN,
            settings.api_url.clone(),
            AuthScheme::Prefixed(AUTH_PREFIX),
            REQUEST_TIMEOUT,
            env,
        )
        .map(Self::new)
    }

    /// Reads a service. A 404 means the service does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than 404.
    pub async fn get_service(&self, project: &str, name: &str) -> Result<Option<Service>> {
        match self
            .api
            .get::<ServiceEnvelope>(&format!(
                "/project/{}/service/{}",
                path_segment(project),
                path_segment(name)
            ))
            .await
        {
            Ok(envelope) => Ok(Some(envelope.service)),
            Err(e) if e.as_api().is_some_and(ApiError::is_not_found) => {
                debug!("service {name} not found in project {project}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Creates a service.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn create_service(
        &self,
        project: &str,
        request: &CreateServiceRequest,
    ) -> Result<Service> {
        let envelope: ServiceEnvelope = self
            .api
            .post(&format!("/project/{}/service", path_segment(project)), request)
            .await?;
        Ok(envelope.service)
    }

    /// Status source that waits for `name` to reach `RUNNING`.
    ///
    /// With `expect_start`, a powered-off or failed service is a terminal failure.
    #[must_use]
    pub fn service_source<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
        expect_start: bool,
    ) -> ServiceStateSource<'a> {
        ServiceStateSource {
            client: self,
            project,
            name,
            expect_start,
            last: None,
        }
    }
}

/// Polls a service until it runs, keeping the last read.
#[derive(Debug)]
pub struct ServiceStateSource<'a> {
    client: &'a AivenClient,
    project: &'a str,
    name: &'a str,
    expect_start: bool,
    last: Option<Service>,
}

impl ServiceStateSource<'_> {
    /// Consumes the source, returning the last service read.
    #[must_use]
    pub fn into_last(self) -> Option<Service> {
        self.last
    }
}

#[async_trait]
impl StatusSource for ServiceStateSource<'_> {
    async fn fetch_status(&mut self) -> Result<PollStatus> {
        let Some(service) = self.client.get_service(self.project, self.name).await? else {
            return Ok(PollStatus::Pending);
        };

        let status = match service.parsed_state() {
            ServiceState::Running => PollStatus::Succeeded,
            ServiceState::PoweredOff | ServiceState::Failed if self.expect_start => {
                PollStatus::Failed(service.state.clone())
            }
            ServiceState::PoweredOff | ServiceState::Failed => {
                warn!("service {} is {}; waiting for it to start", self.name, service.state);
                PollStatus::Unknown(service.state.clone())
            }
            ServiceState::Rebuilding => PollStatus::Running,
            ServiceState::Other(state) => PollStatus::Unknown(state),
        };

        debug!("service {} state {}", self.name, service.state);
        self.last = Some(service);
        Ok(status)
    }
}
