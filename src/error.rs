//! Error types for the forge provisioning system.
//!
//! This module provides the error hierarchy for every stage of a deploy run:
//! configuration, provider API traffic, asynchronous operation tracking and
//! the external deploy CLI.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the forge provisioning system.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Provider API errors.
    #[error("Provider API error: {0}")]
    Api(#[from] ApiError),

    /// Provisioning errors (polling, missing connection data).
    #[error("Provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    /// Deploy CLI errors.
    #[error("Deploy error: {0}")]
    Deploy(#[from] DeployError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A provider token is not set.
    #[error("{name} is not set")]
    MissingToken {
        /// Name of the missing token variable.
        name: String,
    },

    /// A setting required by a provisioning target is not set.
    #[error("{name} is required for {target} provisioning")]
    MissingSetting {
        /// Name of the missing variable.
        name: String,
        /// Target that needs it.
        target: String,
    },

    /// A setting has an unusable value.
    #[error("Invalid value for {name}: {message}")]
    InvalidValue {
        /// Name of the variable.
        name: String,
        /// Description of the problem.
        message: String,
    },

    /// The credential file could not be read or written.
    #[error("Credential file {path}: {message}")]
    EnvFile {
        /// Path to the file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// Interactive input could not be read.
    #[error("Failed to read input: {message}")]
    Prompt {
        /// Description of the failure.
        message: String,
    },
}

/// Provider API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The HTTP client could not be built.
    #[error("{provider} client setup failed: {message}")]
    Client {
        /// Provider name.
        provider: String,
        /// Description of the failure.
        message: String,
    },

    /// The request never produced a response (connect failure, timeout).
    #[error("{provider} api {method} {path}: {message}")]
    Transport {
        /// Provider name.
        provider: String,
        /// HTTP method.
        method: String,
        /// Request path.
        path: String,
        /// Description of the failure.
        message: String,
    },

    /// The provider answered with a non-success status.
    #[error("{provider} api {method} {path}: {status} {status_text}: {body}")]
    Status {
        /// Provider name.
        provider: String,
        /// HTTP method.
        method: String,
        /// Request path.
        path: String,
        /// HTTP status code.
        status: u16,
        /// Canonical status text.
        status_text: String,
        /// Raw response body.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("{provider} api {method} {path}: invalid response: {message}")]
    Decode {
        /// Provider name.
        provider: String,
        /// HTTP method.
        method: String,
        /// Request path.
        path: String,
        /// Description of the decode failure.
        message: String,
    },
}

/// Provisioning errors.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A polled operation reached a terminal failure state.
    #[error("{label} failed: {status}")]
    OperationFailed {
        /// What was being waited on.
        label: String,
        /// Status string reported by the platform.
        status: String,
    },

    /// Polling ran past its deadline without a terminal state.
    #[error("Timed out after {waited_secs}s waiting for {label}; the resource may still be converging")]
    Timeout {
        /// What was being waited on.
        label: String,
        /// Seconds waited.
        waited_secs: u64,
    },

    /// A whole provisioning step ran past its budget.
    #[error("{step} did not finish within {secs}s")]
    StepDeadline {
        /// Step name.
        step: String,
        /// Budget in seconds.
        secs: u64,
    },

    /// The platform returned no host for the compute endpoint.
    #[error("Endpoint host is empty for project {project}")]
    MissingEndpointHost {
        /// Project identifier.
        project: String,
    },

    /// The cache service has no connection URI.
    #[error("Service {service} has an empty service_uri; cannot compose REDIS_URL")]
    EmptyServiceUri {
        /// Service name.
        service: String,
    },

    /// A manual paste-in prompt received no value.
    #[error("No {variable} provided")]
    NoInput {
        /// Variable that was requested.
        variable: String,
    },
}

/// Deploy CLI errors.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The deploy CLI is not installed and could not be installed.
    #[error("railway CLI not found\n{guidance}")]
    CliNotFound {
        /// Manual install instructions.
        guidance: String,
    },

    /// A subprocess could not be started.
    #[error("Failed to start `{command}`: {message}")]
    Spawn {
        /// Command line.
        command: String,
        /// Description of the failure.
        message: String,
    },

    /// A subprocess exited with a non-zero status.
    #[error("`{command}` failed (exit code {}){}", .code.map_or_else(|| String::from("none"), |c| c.to_string()), format_output(.output))]
    CommandFailed {
        /// Command line.
        command: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Combined output when it was captured.
        output: String,
    },

    /// A subprocess ran past its deadline.
    #[error("`{command}` did not finish within {secs}s")]
    CommandTimeout {
        /// Command line.
        command: String,
        /// Deadline in seconds.
        secs: u64,
    },

    /// Login could not be established for account-level actions.
    #[error("railway login failed: {message}")]
    LoginFailed {
        /// Description of the failure.
        message: String,
    },
}

fn format_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// Result type alias for forge operations.
pub type Result<T> = std::result::Result<T, ForgeError>;

impl ForgeError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error means a wait ran out of time rather than failed.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Provision(ProvisionError::Timeout { .. } | ProvisionError::StepDeadline { .. })
                | Self::Deploy(DeployError::CommandTimeout { .. })
        )
    }

    /// Returns the API error if this is one.
    #[must_use]
    pub const fn as_api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a missing-token error.
    #[must_use]
    pub fn missing_token(name: impl Into<String>) -> Self {
        Self::MissingToken { name: name.into() }
    }

    /// Creates a missing-setting error for a provisioning target.
    #[must_use]
    pub fn missing_setting(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::MissingSetting {
            name: name.into(),
            target: target.into(),
        }
    }

    /// Creates a credential file error.
    #[must_use]
    pub fn env_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::EnvFile {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl ApiError {
    /// Returns the HTTP status of a status error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the provider rejected the call because the resource is already there.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Status { status, body, .. } => {
                *status == 409 || body.to_ascii_lowercase().contains("already exists")
            }
            _ => false,
        }
    }

    /// Returns true if the provider reported the resource as missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}
