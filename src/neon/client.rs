//! Database platform API client.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::api::{AuthScheme, ResourceClient, path_segment};
use crate::config::{DatabaseSettings, EnvSource, vars};
use crate::error::Result;
use crate::poller::{PollStatus, StatusSource};

use super::types::{
    Branch, BranchList, BranchSpec, CreateBranchRequest, CreateDatabaseRequest,
    CreateEndpointRequest, CreateProjectRequest, CreateResponse, CreateRoleRequest, DatabaseSpec,
    Endpoint, EndpointList, EndpointSpec, Operation, OperationEnvelope, Project, ProjectList,
    ProjectSpec, RoleSpec,
};

/// Provider name used in errors and logs.
pub const PROVIDER: &str = "neon";

/// Request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Database platform API client.
#[derive(Debug, Clone)]
pub struct NeonClient {
    api: ResourceClient,
}

impl NeonClient {
    /// Wraps an existing resource client.
    #[must_use]
    pub const fn new(api: ResourceClient) -> Self {
        Self { api }
    }

    /// Builds a client from settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `NEON_TOKEN` is unset or the HTTP client cannot be created.
    pub fn from_settings(settings: &DatabaseSettings, env: &EnvSource<'_>) -> Result<Self> {
        ResourceClient::from_credentials(
            PROVIDER,
            vars::NEON_TOKEN,
            settings.api_url.clone(),
            AuthScheme::Bearer,
            REQUEST_TIMEOUT,
            env,
        )
        .map(Self::new)
    }

    /// Lists projects.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let list: ProjectList = self.api.get("/projects").await?;
        Ok(list.projects)
    }

    /// Creates a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn create_project(&self, name: &str, region: Option<&str>) -> Result<CreateResponse> {
        let body = CreateProjectRequest {
            project: ProjectSpec {
                name: name.to_string(),
                region_id: region.map(str::to_string),
            },
        };
        self.api.post("/projects", &body).await
    }

    /// Lists branches of a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_branches(&self, project_id: &str) -> Result<Vec<Branch>> {
        let list: BranchList = self
            .api
            .get(&format!("/projects/{}/branches", path_segment(project_id)))
            .await?;
        Ok(list.branches)
    }

    /// Creates a branch.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn create_branch(&self, project_id: &str, name: &str) -> Result<CreateResponse> {
        let body = CreateBranchRequest {
            branch: BranchSpec {
                name: name.to_string(),
            },
        };
        self.api
            .post(&format!("/projects/{}/branches", path_segment(project_id)), &body)
            .await
    }

    /// Lists endpoints of a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_endpoints(&self, project_id: &str) -> Result<Vec<Endpoint>> {
        let list: EndpointList = self
            .api
            .get(&format!("/projects/{}/endpoints", path_segment(project_id)))
            .await?;
        Ok(list.endpoints)
    }

    /// Creates a read-write endpoint for a branch.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn create_endpoint(&self, project_id: &str, branch_id: &str) -> Result<CreateResponse> {
        let body = CreateEndpointRequest {
            endpoint: EndpointSpec {
                branch_id: branch_id.to_string(),
                endpoint_type: String::from("read_write"),
            },
        };
        self.api
            .post(&format!("/projects/{}/endpoints", path_segment(project_id)), &body)
            .await
    }

    /// Creates a role.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, including when the role exists.
    pub async fn create_role(
        &self,
        project_id: &str,
        branch_id: &str,
        name: &str,
        password: &str,
    ) -> Result<CreateResponse> {
        let body = CreateRoleRequest {
            role: RoleSpec {
                name: name.to_string(),
                password: password.to_string(),
            },
        };
        self.api
            .post(
                &format!(
                    "/projects/{}/branches/{}/roles",
                    path_segment(project_id),
                    path_segment(branch_id)
                ),
                &body,
            )
            .await
    }

    /// Creates a database owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, including when the database exists.
    pub async fn create_database(
        &self,
        project_id: &str,
        branch_id: &str,
        name: &str,
        owner: &str,
    ) -> Result<CreateResponse> {
        let body = CreateDatabaseRequest {
            database: DatabaseSpec {
                name: name.to_string(),
                owner_name: owner.to_string(),
            },
        };
        self.api
            .post(
                &format!(
                    "/projects/{}/branches/{}/databases",
                    path_segment(project_id),
                    path_segment(branch_id)
                ),
                &body,
            )
            .await
    }

    /// Reads an operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_operation(&self, operation_id: &str) -> Result<Operation> {
        let envelope: OperationEnvelope =
            self
            .api
            .get(&format!("/operations/{}", path_segment(operation_id)))
            .await?;
        Ok(envelope.operation)
    }

    /// Status source for one operation.
    #[must_use]
    pub fn operation_source(&self, operation_id: impl Into<String>) -> OperationSource<'_> {
        OperationSource {
            client: self,
            operation_id: operation_id.into(),
        }
    }
}

/// Polls a single operation by ID.
#[derive(Debug)]
pub struct OperationSource<'a> {
    client: &'a NeonClient,
    operation_id: String,
}

#[async_trait]
impl StatusSource for OperationSource<'_> {
    async fn fetch_status(&mut self) -> Result<PollStatus> {
        let operation = self.client.get_operation(&self.operation_id).await?;
        debug!("operation {} is {}", self.operation_id, operation.status);
        Ok(operation.parsed_status().into())
    }
}
