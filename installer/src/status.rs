//! Status command implementation.
//!
//! Reports, without changing anything, how far the platform is from the
//! configured deployment: whether the driver is registered and whether each
//! derived port and printer exists.

use crate::config::DeploymentConfig;
use crate::error::{DeployError, Result};
use crate::print::PrintSubsystem;
use crate::provisioner::{EntryPlan, ProvisioningError, plan_entries};
use crate::status_output::{format_human, format_json};
use log::debug;
use std::io::Write;

/// Observed state of one device map entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    /// The entry has a valid address.
    Present {
        /// Printer number.
        number: u32,
        /// Derived port name.
        port_name: String,
        /// Whether the port exists.
        port_exists: bool,
        /// Derived printer name.
        printer_name: String,
        /// Whether the printer exists.
        printer_exists: bool,
        /// Whether this entry is the configured default.
        is_default: bool,
    },
    /// The entry would be skipped by a deployment.
    Invalid {
        /// Printer number.
        number: u32,
        /// Address as configured.
        address: String,
    },
}

/// Observed state of the whole deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentStatus {
    /// Configured driver name.
    pub driver_name: String,
    /// Registered driver satisfying the configuration, if any.
    pub registered_driver: Option<String>,
    /// Per-entry state in ascending number order.
    pub entries: Vec<EntryStatus>,
}

impl DeploymentStatus {
    /// Whether a deployment run would change nothing.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.registered_driver.is_some()
            && self.entries.iter().all(|entry| match entry {
                EntryStatus::Present {
                    port_exists,
                    printer_exists,
                    ..
                } => *port_exists && *printer_exists,
                EntryStatus::Invalid { .. } => true,
            })
    }
}

/// Query the print subsystem for the state of `config`.
///
/// A driver counts as registered when its name equals the configured name or
/// matches the configured wildcard.
///
/// # Errors
///
/// Returns [`ProvisioningError::Query`] when the platform cannot be queried.
pub fn collect_status(
    config: &DeploymentConfig,
    print: &dyn PrintSubsystem,
) -> std::result::Result<DeploymentStatus, ProvisioningError> {
    let drivers = print.drivers().map_err(ProvisioningError::Query)?;
    let registered_driver = drivers
        .iter()
        .find(|d| d.name == config.driver.name)
        .or_else(|| drivers.iter().find(|d| config.driver.matches(&d.name)))
        .map(|d| d.name.clone());
    debug!(
        target: "printdeploy_installer::status",
        "{} drivers registered; configured driver resolved to {registered_driver:?}",
        drivers.len()
    );

    let mut entries = Vec::with_capacity(config.printers.len());
    for plan in plan_entries(&config.printers, &config.template) {
        entries.push(match plan {
            EntryPlan::Provision {
                number,
                port_name,
                printer_name,
                ..
            } => EntryStatus::Present {
                number,
                port_exists: print.port_exists(&port_name).map_err(ProvisioningError::Query)?,
                printer_exists: print
                    .printer_exists(&printer_name)
                    .map_err(ProvisioningError::Query)?,
                is_default: config.default_printer == Some(number),
                port_name,
                printer_name,
            },
            EntryPlan::Skip(skipped) => EntryStatus::Invalid {
                number: skipped.number,
                address: skipped.address,
            },
        });
    }

    Ok(DeploymentStatus {
        driver_name: config.driver.name.clone(),
        registered_driver,
        entries,
    })
}

/// Collects status and writes it to `stdout` as text or JSON.
///
/// # Errors
///
/// Returns an error if the platform cannot be queried or writing fails.
pub fn run_status(
    config: &DeploymentConfig,
    print: &dyn PrintSubsystem,
    json: bool,
    stdout: &mut dyn Write,
) -> Result<()> {
    let status = collect_status(config, print)?;
    let output = if json {
        format_json(&status)
    } else {
        format_human(&status)
    };
    writeln!(stdout, "{output}").map_err(|e| DeployError::io("failed to write status", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeOperation, FakePrintSubsystem};
    use rstest::{fixture, rstest};

    #[fixture]
    fn config() -> DeploymentConfig {
        DeploymentConfig::from_toml_str(concat!(
            "source = \"https://vendor.example/upd.zip\"\n",
            "driver_name = \"HP Universal Printing PCL 6\"\n",
            "name_template = \"Floor {0}\"\n",
            "default_printer = 2\n",
            "[printers]\n",
            "1 = \"10.0.0.1\"\n",
            "2 = \"10.0.0.2\"\n",
            "3 = \"printer.local\"\n",
        ))
        .expect("config")
    }

    #[rstest]
    fn reports_missing_objects(config: DeploymentConfig) {
        let print = FakePrintSubsystem::new().with_port("IP_10.0.0.1");

        let status = collect_status(&config, &print).expect("status");

        assert!(status.registered_driver.is_none());
        assert!(!status.is_converged());
        assert_eq!(
            status.entries.first(),
            Some(&EntryStatus::Present {
                number: 1,
                port_name: "IP_10.0.0.1".to_owned(),
                port_exists: true,
                printer_name: "Floor 1".to_owned(),
                printer_exists: false,
                is_default: false,
            })
        );
        assert!(matches!(
            status.entries.get(2),
            Some(EntryStatus::Invalid { number: 3, .. })
        ));
    }

    #[rstest]
    fn converged_when_everything_exists(config: DeploymentConfig) {
        let print = FakePrintSubsystem::new()
            .with_driver("HP Universal Printing PCL 6 (v7.0.1)")
            .with_port("IP_10.0.0.1")
            .with_port("IP_10.0.0.2")
            .with_printer("Floor 1", "HP Universal Printing PCL 6 (v7.0.1)", "IP_10.0.0.1")
            .with_printer("Floor 2", "HP Universal Printing PCL 6 (v7.0.1)", "IP_10.0.0.2");

        let status = collect_status(&config, &print).expect("status");

        assert_eq!(
            status.registered_driver.as_deref(),
            Some("HP Universal Printing PCL 6 (v7.0.1)")
        );
        assert!(status.is_converged());
    }

    #[rstest]
    fn query_failure_is_reported(config: DeploymentConfig) {
        let print = FakePrintSubsystem::new();
        print.fail_on(FakeOperation::Query);

        let err = collect_status(&config, &print).expect_err("should fail");
        assert!(matches!(err, ProvisioningError::Query(_)));
    }

    #[rstest]
    #[case::human(false, "Floor 2")]
    #[case::json(true, "\"printer_name\": \"Floor 2\"")]
    fn run_status_writes_report(config: DeploymentConfig, #[case] json: bool, #[case] needle: &str) {
        let print = FakePrintSubsystem::new();
        let mut stdout = Vec::new();

        run_status(&config, &print, json, &mut stdout).expect("status");

        let text = String::from_utf8(stdout).expect("utf-8");
        assert!(text.contains(needle), "missing {needle:?} in {text}");
        assert_eq!(print.total_created(), 0);
    }
}
