//! CLI module for the forge deploy tool.
//!
//! This module provides the command-line interface for provisioning
//! providers and deploying.

mod commands;
mod output;

pub use commands::{Cli, Commands, DeployArgs, OutputFormat, parse_assignment_arg};
pub use output::{OutputFormatter, StatusView};
