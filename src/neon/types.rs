//! Database platform API types.
//!
//! All response fields are optional with defaults; unknown fields are ignored.

use serde::{Deserialize, Serialize};

use crate::poller::PollStatus;

/// A project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Project {
    /// Project ID.
    pub id: String,
    /// Project name.
    pub name: String,
    /// Region ID.
    pub region_id: String,
}

/// A branch of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Branch {
    /// Branch ID.
    pub id: String,
    /// Branch name.
    pub name: String,
}

/// A compute endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    /// Endpoint ID.
    pub id: String,
    /// Connection host.
    pub host: String,
    /// Branch the endpoint serves.
    pub branch_id: String,
    /// Endpoint type (`read_write`, `read_only`).
    #[serde(rename = "type")]
    pub endpoint_type: String,
}

impl Endpoint {
    /// Returns true if the endpoint accepts writes.
    #[must_use]
    pub fn is_read_write(&self) -> bool {
        matches!(
            self.endpoint_type.to_ascii_lowercase().as_str(),
            "read_write" | "primary" | "rw"
        )
    }
}

/// Operation status as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    /// Scheduled or pending.
    Pending,
    /// Running.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Failed.
    Failed(String),
    /// Any other value.
    Unknown(String),
}

impl OperationStatus {
    /// Maps a platform status string.
    #[must_use]
    pub fn from_platform(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "finished" | "succeeded" | "ready" | "completed" => Self::Succeeded,
            "failed" | "error" => Self::Failed(status.to_string()),
            "scheduling" | "pending" => Self::Pending,
            "running" => Self::Running,
            _ => Self::Unknown(status.to_string()),
        }
    }
}

impl From<OperationStatus> for PollStatus {
    fn from(status: OperationStatus) -> Self {
        match status {
            OperationStatus::Pending => Self::Pending,
            OperationStatus::Running => Self::Running,
            OperationStatus::Succeeded => Self::Succeeded,
            OperationStatus::Failed(s) => Self::Failed(s),
            OperationStatus::Unknown(s) => Self::Unknown(s),
        }
    }
}

/// An asynchronous operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Operation {
    /// Operation ID.
    pub id: String,
    /// Action name (`create_branch`, `start_compute`).
    pub action: String,
    /// Raw status.
    pub status: String,
}

impl Operation {
    /// Parsed status.
    #[must_use]
    pub fn parsed_status(&self) -> OperationStatus {
        OperationStatus::from_platform(&self.status)
    }
}

/// `{"projects": [...]}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectList {
    /// Projects.
    pub projects: Vec<Project>,
}

/// `{"branches": [...]}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BranchList {
    /// Branches.
    pub branches: Vec<Branch>,
}

/// `{"endpoints": [...]}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EndpointList {
    /// Endpoints.
    pub endpoints: Vec<Endpoint>,
}

/// Envelope returned by create calls.
///
/// Project creation may also return the default branch and endpoint.
/// Operations may arrive as a list or as a single object.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateResponse {
    /// Created project.
    pub project: Option<Project>,
    /// Created or default branch.
    pub branch: Option<Branch>,
    /// Created endpoints.
    pub endpoints: Vec<Endpoint>,
    /// Single created endpoint.
    pub endpoint: Option<Endpoint>,
    /// Started operations.
    pub operations: Vec<Operation>,
    /// Single started operation.
    pub operation: Option<Operation>,
}

impl CreateResponse {
    /// All operations in the envelope, list first.
    #[must_use]
    pub fn all_operations(&self) -> Vec<Operation> {
        self.operations
            .iter()
            .chain(self.operation.iter())
            .filter(|op| !op.id.is_empty())
            .cloned()
            .collect()
    }

    /// First endpoint with a host, singular field first.
    #[must_use]
    pub fn first_endpoint(&self) -> Option<&Endpoint> {
        self.endpoint
            .iter()
            .chain(self.endpoints.iter())
            .find(|e| !e.host.is_empty())
    }
}

/// `{"operation": {...}}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OperationEnvelope {
    /// The operation.
    pub operation: Operation,
}

/// Body for project creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreateProjectRequest {
    /// Project spec.
    pub project: ProjectSpec,
}

/// Project creation fields.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSpec {
    /// Name.
    pub name: String,
    /// Region, omitted for the platform default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_id: Option<String>,
}

/// Body for branch creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreateBranchRequest {
    /// Branch spec.
    pub branch: BranchSpec,
}

/// Branch creation fields.
#[derive(Debug, Clone, Serialize)]
pub struct BranchSpec {
    /// Name.
    pub name: String,
}

/// Body for endpoint creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreateEndpointRequest {
    /// Endpoint spec.
    pub endpoint: EndpointSpec,
}

/// Endpoint creation fields.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSpec {
    /// Branch to serve.
    pub branch_id: String,
    /// Endpoint type.
    #[serde(rename = "type")]
    pub endpoint_type: String,
}

/// Body for role creation.
#[derive(Clone, Serialize)]
pub struct CreateRoleRequest {
    /// Role spec.
    pub role: RoleSpec,
}

/// Role creation fields.
#[derive(Clone, Serialize)]
pub struct RoleSpec {
    /// Role name.
    pub name: String,
    /// Password.
    pub password: String,
}

/// Body for database creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreateDatabaseRequest {
    /// Database spec.
    pub database: DatabaseSpec,
}

/// Database creation fields.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseSpec {
    /// Database name.
    pub name: String,
    /// Owning role.
    pub owner_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        for s in ["finished", "succeeded", "ready", "completed", "FINISHED"] {
            assert_eq!(OperationStatus::from_platform(s), OperationStatus::Succeeded);
        }
        assert!(matches!(OperationStatus::from_platform("failed"), OperationStatus::Failed(_)));
        assert!(matches!(OperationStatus::from_platform("error"), OperationStatus::Failed(_)));
        assert_eq!(OperationStatus::from_platform("scheduling"), OperationStatus::Pending);
        assert_eq!(OperationStatus::from_platform("pending"), OperationStatus::Pending);
        assert_eq!(OperationStatus::from_platform("running"), OperationStatus::Running);
        assert_eq!(
            OperationStatus::from_platform("cancelling"),
            OperationStatus::Unknown(String::from("cancelling"))
        );
    }

    #[test]
    fn test_create_response_accepts_singular_and_plural() {
        let plural: CreateResponse = serde_json::from_str(
            r#"{"project":{"id":"p1","name":"demo"},"branch":{"id":"b1","name":"main"},
                "endpoints":[{"id":"e1","host":"ep-1.neon.tech","type":"read_write","branch_id":"b1"}],
                "operations":[{"id":"op1","status":"running"}],"unknown":1}"#,
        )
        .expect("parse");
        let singular: CreateResponse = serde_json::from_str(
            r#"{"endpoint":{"id":"e2","host":"ep-2.neon.tech"},"operation":{"id":"op2","status":"finished"}}"#,
        )
        .expect("parse");

        assert_eq!(plural.all_operations().len(), 1);
        assert_eq!(plural.first_endpoint().map(|e| e.host.as_str()), Some("ep-1.neon.tech"));
        assert_eq!(singular.all_operations()[0].id, "op2");
        assert_eq!(singular.first_endpoint().map(|e| e.id.as_str()), Some("e2"));
    }

    #[test]
    fn test_read_write_types() {
        let mut endpoint = Endpoint {
            endpoint_type: String::from("read_write"),
            ..Endpoint::default()
        };
        assert!(endpoint.is_read_write());
        endpoint.endpoint_type = String::from("RW");
        assert!(endpoint.is_read_write());
        endpoint.endpoint_type = String::from("read_only");
        assert!(!endpoint.is_read_write());
    }

    #[test]
    fn test_project_request_omits_missing_region() {
        let body = CreateProjectRequest {
            project: ProjectSpec {
                name: String::from("demo"),
                region_id: None,
            },
        };

        assert_eq!(
            serde_json::to_value(&body).expect("serialize"),
            serde_json::json!({"project": {"name": "demo"}})
        );
    }
}
