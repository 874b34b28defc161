//! Output formatting for the CLI.
//!
//! This module renders pipeline events, the final deployment report and
//! failures in either human-readable text or JSON.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{CONTAINER_PORT, TargetHasher};
use crate::error::HalldyllError;
use crate::reconciler::{DeploymentReport, StageEvent};

use super::commands::OutputFormat;

/// Output formatter for the CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Key/value row for table display.
#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

impl FieldRow {
    const fn new(field: &'static str, value: String) -> Self {
        Self { field, value }
    }
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a pipeline event as a progress line.
    ///
    /// Returns `None` in JSON mode, where only the final document is printed.
    #[must_use]
    pub fn format_event(&self, event: &StageEvent) -> Option<String> {
        if self.format == OutputFormat::Json {
            return None;
        }

        Some(match event {
            StageEvent::Started(stage) => format!("{} {stage}...", "→".cyan()),
            StageEvent::Succeeded(stage, detail) => {
                format!("{} {stage}: {detail}", "✓".green())
            }
            StageEvent::Warned(stage, detail) => format!("{} {stage}: {detail}", "⚠".yellow()),
            StageEvent::Failed(stage, detail) => format!("{} {stage}: {detail}", "✗".red()),
        })
    }

    /// Formats a successful deployment report.
    #[must_use]
    pub fn format_report(&self, report: &DeploymentReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    fn format_report_text(report: &DeploymentReport) -> String {
        let mut output = String::new();

        let _ = write!(
            output,
            "\n{} Proxy '{}' deployed\n\n",
            "✓".green(),
            report.target.name
        );

        let mut rows = vec![
            FieldRow::new("Deployment", report.id.to_string()),
            FieldRow::new("Container", Self::truncate(&report.container_id, 12)),
            FieldRow::new("Image", report.target.image.clone()),
            FieldRow::new(
                "Listening",
                format!("0.0.0.0:{} -> :{CONTAINER_PORT}", report.target.host_port),
            ),
            FieldRow::new("Upstream", report.target.upstream()),
            FieldRow::new(
                "Target hash",
                TargetHasher::new().short_hash(&report.target_hash),
            ),
            FieldRow::new("Replaced", report.prior_state.to_string()),
            FieldRow::new("Templates", report.preflight.template_count.to_string()),
            FieldRow::new("Duration", format!("{}ms", report.duration_ms())),
        ];

        if let Some(probe) = &report.probe {
            let health = if probe.healthy {
                "healthy".green().to_string()
            } else {
                "unhealthy".yellow().to_string()
            };
            rows.push(FieldRow::new("Probe", format!("{health} ({})", probe.url)));
        }

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if !report.teardown_warnings.is_empty() {
            let _ = write!(output, "\n{} Teardown warnings:\n", "⚠".yellow());
            for warning in &report.teardown_warnings {
                let _ = writeln!(output, "   - {warning}");
            }
        }

        if !report.validation_output.is_empty() {
            let _ = write!(output, "\nConfiguration check:\n");
            for line in report.validation_output.lines() {
                let _ = writeln!(output, "   {line}");
            }
        }

        output
    }

    /// Formats a failed run, including any captured log tail.
    #[must_use]
    pub fn format_error(&self, err: &HalldyllError) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "status": "error",
                    "exit_code": err.exit_code(),
                    "message": err.to_string(),
                    "log_tail": err.log_tail(),
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!("{} {err}\n", "✗".red());

                if let Some(tail) = err.log_tail() {
                    let _ = write!(output, "\nRecent container logs:\n");
                    for line in tail.lines() {
                        let _ = writeln!(output, "   {}", line.dimmed());
                    }
                }

                if matches!(err, HalldyllError::Interrupted) {
                    let _ = write!(
                        output,
                        "\n{} The previous instance may already be removed and the new one not yet created. Re-run to converge.\n",
                        "⚠".yellow()
                    );
                }

                output
            }
        }
    }

    /// Truncates a string to a maximum length.
    fn truncate(s: &str, max_len: usize) -> String {
        s.chars().take(max_len).collect()
    }
}
