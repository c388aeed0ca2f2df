//! Railway deploy CLI adapter.
//!
//! This module provides:
//! - A mockable [`CommandRunner`] with a `tokio::process` implementation
//! - Scoped credentials that keep project tokens out of account-level actions
//! - CLI detection and per-OS installation
//! - The deploy state machine (install, link detection, init/link, up)

mod adapter;
mod install;
mod runner;
mod scope;

pub use adapter::{
    AdapterState, DeployAdapter, DeployOutcome, LINK_MARKER_DIR, LinkSignal, LinkState, LogOptions,
    LogsOutcome, link_guidance, status_reports_project,
};
pub use install::{CLI_NAME, InstallAttempt, RELEASES_URL, ensure_cli, install_attempts, install_guidance};
#[cfg(test)]
pub use runner::MockCommandRunner;
pub use runner::{
    CommandOutput, CommandRunner, CommandSpec, INTERACTIVE_TIMEOUT, PROBE_TIMEOUT, RunMode,
    SystemRunner, run_checked,
};
pub use scope::{AuthMode, CredentialContext, TokenSuppression};
