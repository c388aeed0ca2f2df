// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Forge Deploy
//!
//! Idempotent provisioning of managed backing services and deployment of the
//! application with the Railway CLI.
//!
//! ## Overview
//!
//! Forge takes a project from an empty `.env` to a running deployment:
//!
//! - Generate or collect the secrets the application needs
//! - Provision a Postgres database on Neon and a Valkey cache on Aiven,
//!   reusing whatever already exists by name
//! - Persist connection strings into `.env` without disturbing other lines
//! - Install, link and run the Railway CLI to deploy
//!
//! Every run can be previewed as a dry run that produces the same plan
//! without side effects.
//!
//! ## Architecture
//!
//! 1. **Environment store**: the `.env` file, read once and overlay-written
//! 2. **Provisioners**: reconcile remote resources through typed API clients,
//!    waiting on asynchronous operations with a bounded poller
//! 3. **Deploy adapter**: drives the deploy CLI with scoped credentials
//! 4. **Wizard**: runs the steps in order and records a deploy plan
//!
//! ## Modules
//!
//! - [`envfile`]: Credential file loading, overlay writes and bootstrapping
//! - [`config`]: Layered settings, required secrets and connection descriptors
//! - [`api`]: Authenticated JSON client shared by the providers
//! - [`poller`]: Bounded polling of asynchronous operations
//! - [`neon`]: Postgres provisioning
//! - [`aiven`]: Valkey provisioning
//! - [`railway`]: Deploy CLI adapter
//! - [`wizard`]: End-to-end control flow
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```text
//! $ forge deploy                 # dry run: print the plan
//! $ forge deploy --run --init    # provision, then init and deploy
//! $ forge provision db --run     # database only
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod aiven;
pub mod api;
pub mod cli;
pub mod config;
pub mod envfile;
pub mod error;
pub mod neon;
pub mod poller;
pub mod railway;
pub mod wizard;

// ============================================================================
// Re-exports
// ============================================================================

pub use aiven::{AivenClient, CacheProvisioner};
pub use api::ResourceClient;
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConnectionDescriptor, EnvSource, ProcessEnv, ProvisionTarget, WizardOptions};
pub use envfile::CredentialSet;
pub use error::{ForgeError, Result};
pub use neon::{DatabaseProvisioner, NeonClient};
pub use poller::{PollStatus, Poller};
pub use railway::{CommandRunner, DeployAdapter, SystemRunner};
pub use wizard::{DeployPlan, Wizard, WizardReport};
