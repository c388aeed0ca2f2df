//! Provisioning wizard.
//!
//! This module provides:
//! - The [`Wizard`] control flow (load, secrets, prompts, build, provision, deploy)
//! - The [`DeployPlan`] record produced by every run, dry or live
//! - The [`Prompter`] seam for interactive questions

mod flow;
mod plan;
mod prompt;

pub use flow::{Wizard, WizardReport};
pub use plan::{DeployPlan, PlanStep, Stage, StepStatus};
pub use prompt::{Prompter, StdinPrompter};
