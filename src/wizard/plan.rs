//! Deploy plan types.
//!
//! A plan is built once per wizard run. In dry-run mode every step is
//! recorded as [`StepStatus::WouldExecute`]; otherwise steps are recorded
//! as they execute, including the step that failed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Wizard stage a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Loading or bootstrapping the credential file.
    Load,
    /// Checking required values.
    Secrets,
    /// Asking for missing values.
    Prompt,
    /// Building deployable artifacts.
    Build,
    /// Database provisioning.
    Database,
    /// Cache provisioning.
    Cache,
    /// Deploy CLI.
    Deploy,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Secrets => "secrets",
            Self::Prompt => "prompt",
            Self::Build => "build",
            Self::Database => "database",
            Self::Cache => "cache",
            Self::Deploy => "deploy",
        };
        f.write_str(name)
    }
}

/// What happened to a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum StepStatus {
    /// Dry run: the step would execute.
    WouldExecute,
    /// The step ran.
    Executed,
    /// The step was skipped, with the reason.
    Skipped(String),
    /// The step failed, with the error.
    Failed(String),
}

/// One step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    /// Stage.
    pub stage: Stage,
    /// What the step does.
    pub description: String,
    /// Outcome.
    pub status: StepStatus,
}

/// Ordered record of one wizard run.
#[derive(Debug, Clone, Serialize)]
pub struct DeployPlan {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// When the run started.
    pub created_at: DateTime<Utc>,
    /// Whether this is a dry run.
    pub dry_run: bool,
    /// Steps in execution order.
    pub steps: Vec<PlanStep>,
}

impl DeployPlan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            dry_run,
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    pub fn push(&mut self, stage: Stage, description: impl Into<String>, status: StepStatus) {
        self.steps.push(PlanStep {
            stage,
            description: description.into(),
            status,
        });
    }

    /// Appends a step that would execute, or executed, depending on the mode.
    pub fn record(&mut self, stage: Stage, description: impl Into<String>) {
        let status = if self.dry_run {
            StepStatus::WouldExecute
        } else {
            StepStatus::Executed
        };
        self.push(stage, description, status);
    }

    /// Appends a skipped step.
    pub fn skip(&mut self, stage: Stage, description: impl Into<String>, reason: impl Into<String>) {
        self.push(stage, description, StepStatus::Skipped(reason.into()));
    }

    /// Appends a failed step.
    pub fn fail(&mut self, stage: Stage, description: impl Into<String>, error: impl fmt::Display) {
        self.push(stage, description, StepStatus::Failed(error.to_string()));
    }

    /// Returns true if any step failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s.status, StepStatus::Failed(_)))
    }

    /// Steps of one stage.
    pub fn stage(&self, stage: Stage) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter().filter(move |s| s.stage == stage)
    }

    /// Returns true if the plan has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
