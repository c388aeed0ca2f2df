//! Managed Valkey provisioning on an Aiven-style platform.

mod client;
mod provisioner;
mod types;

pub use client::{AUTH_PREFIX, AivenClient, PROVIDER, REQUEST_TIMEOUT, ServiceStateSource};
pub use provisioner::CacheProvisioner;
pub use types::{CreateServiceRequest, Service, ServiceState};
