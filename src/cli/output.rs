//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats. Values of secrets are
//! never formatted; only their presence.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{ProvisionOutcome, ProvisionReport, SecretReport};
use crate::railway::{DeployOutcome, LinkState};
use crate::wizard::{DeployPlan, StepStatus, WizardReport};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan step row for table display.
#[derive(Tabled)]
struct PlanStepRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Step")]
    description: String,
    #[tabled(rename = "Status")]
    status: String,
}

/// Presence row for table display.
#[derive(Tabled)]
struct PresenceRow {
    #[tabled(rename = "Variable")]
    key: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Status")]
    status: String,
}

/// Presence report plus link state, as printed by `forge status`.
#[derive(Debug, Serialize)]
pub struct StatusView<'a> {
    /// Value presence.
    pub secrets: &'a SecretReport,
    /// Link state, if the CLI was probed.
    pub link: Option<LinkState>,
    /// Whether the deploy CLI is installed, or `None` if it was not checked.
    pub cli_installed: Option<bool>,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a deploy plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &DeployPlan) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    fn format_plan_text(plan: &DeployPlan) -> String {
        let mut output = String::new();
        let mode = if plan.dry_run {
            "dry run".yellow().to_string()
        } else {
            "live".green().to_string()
        };
        let _ = write!(
            output,
            "\nDeploy Plan ({mode})\n   Run: {}  Started: {}\n\n",
            plan.run_id,
            plan.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        if plan.is_empty() {
            output.push_str("   No steps.\n");
            return output;
        }

        let rows: Vec<PlanStepRow> = plan
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| PlanStepRow {
                index: i + 1,
                stage: s.stage.to_string(),
                description: Self::truncate(&s.description, 70),
                status: Self::format_step_status(&s.status),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if plan.dry_run {
            let _ = write!(output, "\nRe-run with {} to execute.\n", "--run".bold());
        }
        output
    }

    /// Formats the result of a wizard run.
    #[must_use]
    pub fn format_wizard_report(&self, report: &WizardReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = Self::format_plan_text(&report.plan);
                for provision in report.database.iter().chain(report.cache.iter()) {
                    output.push_str(&Self::format_provision_text(provision));
                }
                if let Some(DeployOutcome::NeedsLink { guidance }) = &report.deploy {
                    let _ = write!(output, "\n{} Project not linked.\n{guidance}\n", "⚠".yellow());
                }
                output
            }
        }
    }

    /// Formats the result of one provisioning step.
    #[must_use]
    pub fn format_provision(&self, report: &ProvisionReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_provision_text(report),
        }
    }

    fn format_provision_text(report: &ProvisionReport) -> String {
        let variable = report.target().variable();
        let headline = match report.outcome {
            ProvisionOutcome::AlreadyConfigured => {
                format!("{} {variable} already set", "✓".green())
            }
            ProvisionOutcome::Provisioned => format!("{} {variable} written", "✓".green()),
            ProvisionOutcome::Manual => format!("{} {variable} saved", "✓".green()),
        };

        let mut output = format!("\n{headline}\n");
        let _ = writeln!(output, "   Connection: {}", report.connection.redacted());
        if !report.created.is_empty() {
            let _ = writeln!(output, "   Created: {}", report.created.join(", "));
        }
        if !report.reused.is_empty() {
            let _ = writeln!(output, "   Reused: {}", report.reused.join(", "));
        }
        output
    }

    /// Formats a list of planned actions under a title.
    #[must_use]
    pub fn format_lines(&self, title: &str, lines: &[String]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "title": title,
                "steps": lines,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!("\n{}\n", title.bold());
                for line in lines {
                    let _ = writeln!(output, "   - {line}");
                }
                output
            }
        }
    }

    /// Formats a presence report with optional link state.
    #[must_use]
    pub fn format_status(&self, view: &StatusView<'_>) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(view).unwrap_or_default(),
            OutputFormat::Text => {
                let rows: Vec<PresenceRow> = view
                    .secrets
                    .entries
                    .iter()
                    .map(|e| PresenceRow {
                        key: e.key.clone(),
                        description: e.description.clone(),
                        status: if e.present {
                            "set".green().to_string()
                        } else {
                            "missing".red().to_string()
                        },
                    })
                    .collect();

                let mut output = String::from("\n");
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');

                let missing = view.secrets.missing().len();
                let _ = writeln!(
                    output,
                    "\nValues: {} set, {} missing",
                    (view.secrets.entries.len() - missing).to_string().green(),
                    missing.to_string().red()
                );

                let link = match (view.cli_installed, view.link) {
                    (None, _) => return output,
                    (Some(false), _) => "railway CLI not installed".yellow().to_string(),
                    (Some(true), Some(LinkState { reason: Some(reason) })) => {
                        format!("{} ({reason})", "linked".green())
                    }
                    (Some(true), Some(_)) => "not linked".yellow().to_string(),
                    (Some(true), None) => "link not checked".dimmed().to_string(),
                };
                let _ = writeln!(output, "Railway: {link}");
                output
            }
        }
    }

    fn format_step_status(status: &StepStatus) -> String {
        match status {
            StepStatus::WouldExecute => "would run".cyan().to_string(),
            StepStatus::Executed => "done".green().to_string(),
            StepStatus::Skipped(reason) => format!("{} ({reason})", "skipped".dimmed()),
            StepStatus::Failed(error) => format!("{}: {}", "failed".red(), Self::truncate(error, 60)),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }

    /// Prints formatted output to stderr.
    pub fn print(&self, output: &str) {
        eprintln!("{output}");
    }

    /// Prints a success message.
    pub fn success(&self, message: &str) {
        self.message("success", &format!("{} {message}", "✓".green()), message);
    }

    /// Prints a warning message.
    pub fn warning(&self, message: &str) {
        self.message("warning", &format!("{} {message}", "⚠".yellow()), message);
    }

    fn message(&self, status: &str, text: &str, message: &str) {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": status, "message": message });
                eprintln!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
            }
            OutputFormat::Text => eprintln!("{text}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionDescriptor, SecretStatus};
    use crate::wizard::Stage;

    #[test]
    fn test_plan_json_round_trips_steps() {
        let mut plan = DeployPlan::new(true);
        plan.record(Stage::Database, "Ensure branch 'main'");
        let formatter = OutputFormatter::new(OutputFormat::Json);

        let json: serde_json::Value =
            serde_json::from_str(&formatter.format_plan(&plan)).expect("json");

        assert_eq!(json["dry_run"], true);
        assert_eq!(json["steps"][0]["stage"], "database");
        assert_eq!(json["steps"][0]["status"]["state"], "would_execute");
    }

    #[test]
    fn test_provision_output_redacts_password() {
        let report = ProvisionReport {
            outcome: ProvisionOutcome::Provisioned,
            created: vec![String::from("project demo")],
            reused: Vec::new(),
            connection: ConnectionDescriptor::postgres("app", "hunter2", "ep.neon.tech", "appdb"),
        };

        for format in [OutputFormat::Text, OutputFormat::Json] {
            let output = OutputFormatter::new(format).format_provision(&report);
            assert!(!output.contains("hunter2"));
            assert!(output.contains("ep.neon.tech"));
        }
    }

    #[test]
    fn test_status_shows_presence_only() {
        let secrets = SecretReport {
            entries: vec![SecretStatus {
                key: String::from("JWT_SECRET"),
                description: String::from("token signing secret"),
                secret: true,
                present: true,
            }],
        };
        let view = StatusView {
            secrets: &secrets,
            link: None,
            cli_installed: Some(false),
        };

        let output = OutputFormatter::new(OutputFormat::Text).format_status(&view);

        assert!(output.contains("JWT_SECRET"));
        assert!(output.contains("not installed"));
    }

    #[test]
    fn test_status_without_probe_makes_no_link_claim() {
        let secrets = SecretReport {
            entries: Vec::new(),
        };
        let unchecked = StatusView {
            secrets: &secrets,
            link: None,
            cli_installed: None,
        };
        let linked = StatusView {
            secrets: &secrets,
            link: Some(LinkState::default()),
            cli_installed: Some(true),
        };
        let formatter = OutputFormatter::new(OutputFormat::Text);

        let output = formatter.format_status(&unchecked);
        assert!(!output.contains("Railway"));
        assert!(!output.contains("not linked"));
        assert!(formatter.format_status(&linked).contains("not linked"));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(OutputFormatter::truncate("héllo wörld", 8), "héllo...");
        assert_eq!(OutputFormatter::truncate("short", 8), "short");
    }
}
