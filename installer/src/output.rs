//! Operator-facing output: the dry-run plan and the closing summary.

use crate::config::DeploymentConfig;
use crate::pipeline::DeploymentReport;
use crate::provisioner::{EntryPlan, plan_entries};
use std::fmt::Display;
use std::io::Write;
use std::path::Path;

/// Write one line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort; the transcript already holds the record.
    }
}

/// What a deployment would do, derived without touching the network or the
/// platform.
///
/// # Example
///
/// ```
/// use printdeploy_installer::config::DeploymentConfig;
/// use printdeploy_installer::output::DryRunPlan;
/// use std::path::Path;
///
/// let config = DeploymentConfig::from_toml_str(concat!(
///     "source = \"https://vendor.example/upd.zip\"\n",
///     "driver_name = \"HP Universal Printing PCL 6\"\n",
///     "name_template = \"Office {0}\"\n",
///     "[printers]\n",
///     "1 = \"10.20.30.41\"\n",
/// ))
/// .expect("valid configuration");
///
/// let plan = DryRunPlan::new(&config, Path::new("/tmp/printdeploy"));
/// let text = plan.display_text();
/// assert!(text.contains("Dry run"));
/// assert!(text.contains("IP_10.20.30.41"));
/// ```
#[derive(Debug)]
pub struct DryRunPlan<'a> {
    config: &'a DeploymentConfig,
    staging_dir: &'a Path,
    entries: Vec<EntryPlan>,
}

impl<'a> DryRunPlan<'a> {
    /// Derive the plan for `config`.
    #[must_use]
    pub fn new(config: &'a DeploymentConfig, staging_dir: &'a Path) -> Self {
        Self {
            config,
            staging_dir,
            entries: plan_entries(&config.printers, &config.template),
        }
    }

    /// Format the plan for display.
    #[must_use]
    pub fn display_text(&self) -> String {
        let config = self.config;
        let mut lines = vec![
            "Dry run - no downloads and no changes to printers".to_owned(),
            String::new(),
            format!("Source: {}", config.source),
            format!(
                "Expected SHA-256: {}",
                config
                    .expected_sha256
                    .as_ref()
                    .map_or_else(|| "(not checked)".to_owned(), ToString::to_string)
            ),
            format!("Staging directory: {}", self.staging_dir.display()),
            format!(
                "Driver: {} (or any driver matching \"{}\")",
                config.driver.name, config.driver.match_pattern
            ),
            format!(
                "Descriptor pattern: {}",
                config.descriptor_patterns.primary_pattern()
            ),
            format!("Execution policy: {}", config.commands.execution_policy),
            String::new(),
            "Printers:".to_owned(),
        ];

        for entry in &self.entries {
            lines.push(match entry {
                EntryPlan::Provision {
                    number,
                    port_name,
                    printer_name,
                    ..
                } => {
                    let default_marker = if config.default_printer == Some(*number) {
                        " [default]"
                    } else {
                        ""
                    };
                    format!("  {number}. {printer_name} on {port_name}{default_marker}")
                }
                EntryPlan::Skip(skipped) => format!(
                    "  {}. skipped: \"{}\" is {}",
                    skipped.number, skipped.address, skipped.reason
                ),
            });
        }

        lines.join("\n")
    }
}

/// Format the closing summary of a successful deployment.
#[must_use]
pub fn summary_text(report: &DeploymentReport) -> String {
    let provisioning = &report.provisioning;
    let mut lines = vec![format!(
        "Deployed driver \"{}\" from {}",
        report.driver.name,
        report.package.local_path.display()
    )];
    for printer in &provisioning.printers {
        let default_marker = if printer.is_default { " [default]" } else { "" };
        lines.push(format!(
            "  {}. {} on {}{default_marker}",
            printer.number, printer.printer_name, printer.port_name
        ));
    }
    for skipped in &provisioning.skipped {
        lines.push(format!(
            "  {}. skipped: \"{}\" is {}",
            skipped.number, skipped.address, skipped.reason
        ));
    }
    lines.push(format!(
        "Created {} port(s) and {} printer(s).",
        provisioning.ports_created, provisioning.printers_created
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn config() -> DeploymentConfig {
        DeploymentConfig::from_toml_str(concat!(
            "source = \"https://vendor.example/drivers/\"\n",
            "expected_sha256 = \"ABCDEF0123456789abcdef0123456789ABCDEF0123456789abcdef0123456789\"\n",
            "driver_name = \"HP Universal Printing PCL 6\"\n",
            "name_template = \"{1} - Office {0}\"\n",
            "default_printer = 2\n",
            "[printers]\n",
            "1 = \"not-an-ip\"\n",
            "2 = \"10.0.0.9\"\n",
        ))
        .expect("config")
    }

    #[rstest]
    fn plan_lists_derived_names(config: DeploymentConfig) {
        let text = DryRunPlan::new(&config, Path::new("/tmp/printdeploy")).display_text();

        assert!(text.contains("2. 10.0.0.9 - Office 2 on IP_10.0.0.9 [default]"));
        assert!(text.contains("1. skipped: \"not-an-ip\""));
        assert!(text.contains("abcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789"));
        assert!(text.contains("Execution policy: Bypass"));
    }

    #[test]
    fn write_stderr_line_appends_newline() {
        let mut stderr = Vec::new();
        write_stderr_line(&mut stderr, "hello");
        assert_eq!(stderr, b"hello\n");
    }
}
