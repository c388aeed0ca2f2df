//! Configuration module for forge.
//!
//! This module handles all configuration-related functionality:
//! - Layered lookup over the credential file and process environment
//! - Provider settings with their defaults
//! - Required secrets, presence reporting and secret generation
//! - Provisioning targets and connection descriptors

mod env;
mod secrets;
mod settings;
mod target;

pub use env::{EnvSource, ProcessEnv, load_dotenv, load_process_env, should_override};
pub use secrets::{
    RequiredSecret, SecretKind, SecretReport, SecretStatus, generate_secret, required_secrets,
};
pub use settings::{
    CacheSettings, DEFAULT_AIVEN_API_URL, DEFAULT_NEON_API_URL, DatabaseSettings, DeploySettings,
    ProviderMode, WizardOptions, vars,
};
pub use target::{
    ConnectionDescriptor, ProvisionOutcome, ProvisionReport, ProvisionTarget, postgres_url,
    redact_uri,
};
