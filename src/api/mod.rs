//! Provider API plumbing.
//!
//! A single [`ResourceClient`] type serves every provider; each integration
//! builds its own instance from configuration and passes it where needed.

mod client;

pub use client::{ApiConfig, AuthScheme, ResourceClient, path_segment};
pub use reqwest::Method;
