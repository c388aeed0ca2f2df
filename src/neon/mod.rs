//! Managed Postgres provisioning on a Neon-style platform.
//!
//! This module provides:
//! - Typed API records and request bodies
//! - An API client built on [`crate::api::ResourceClient`]
//! - The database provisioner that produces `DATABASE_URL`

mod client;
mod provisioner;
mod types;

pub use client::{NeonClient, OperationSource, PROVIDER, REQUEST_TIMEOUT};
pub use provisioner::DatabaseProvisioner;
pub use types::{
    Branch, CreateResponse, Endpoint, Operation, OperationStatus, Project,
};
