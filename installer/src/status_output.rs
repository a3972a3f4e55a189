//! Output formatting for deployment status.

use serde::Serialize;

use crate::status::{DeploymentStatus, EntryStatus};

fn mark(present: bool) -> &'static str {
    if present { "present" } else { "missing" }
}

/// Format status for human-readable output.
///
/// # Examples
///
/// ```
/// use printdeploy_installer::status::DeploymentStatus;
/// use printdeploy_installer::status_output::format_human;
///
/// let status = DeploymentStatus {
///     driver_name: "HP Universal Printing PCL 6".to_owned(),
///     registered_driver: None,
///     entries: Vec::new(),
/// };
/// assert!(format_human(&status).contains("not registered"));
/// ```
#[must_use]
pub fn format_human(status: &DeploymentStatus) -> String {
    let mut lines = Vec::with_capacity(status.entries.len() + 3);
    lines.push(match &status.registered_driver {
        Some(name) if *name == status.driver_name => format!("Driver: {name} (registered)"),
        Some(name) => format!("Driver: {} (registered as {name})", status.driver_name),
        None => format!("Driver: {} (not registered)", status.driver_name),
    });
    lines.push("Printers:".to_owned());
    for entry in &status.entries {
        lines.push(match entry {
            EntryStatus::Present {
                number,
                port_name,
                port_exists,
                printer_name,
                printer_exists,
                is_default,
            } => {
                let default_marker = if *is_default { " [default]" } else { "" };
                format!(
                    "  {number}. {printer_name}{default_marker}: printer {}, port {port_name} {}",
                    mark(*printer_exists),
                    mark(*port_exists)
                )
            }
            EntryStatus::Invalid { number, address } => {
                format!("  {number}. skipped: \"{address}\" is not a valid IPv4 address")
            }
        });
    }
    lines.push(if status.is_converged() {
        "Up to date.".to_owned()
    } else {
        "Changes pending; run `printdeploy deploy` to apply.".to_owned()
    });
    lines.join("\n")
}

/// Format status as pretty-printed JSON.
#[must_use]
pub fn format_json(status: &DeploymentStatus) -> String {
    serde_json::to_string_pretty(&StatusJson::from(status)).unwrap_or_else(|_| "{}".to_owned())
}

/// JSON-serialisable status document.
#[derive(Debug, Serialize)]
pub struct StatusJson<'a> {
    /// Driver state.
    pub driver: DriverJson<'a>,
    /// Per-entry state.
    pub printers: Vec<EntryJson<'a>>,
    /// Whether a deployment would change nothing.
    pub converged: bool,
}

/// JSON entry for the driver.
#[derive(Debug, Serialize)]
pub struct DriverJson<'a> {
    /// Configured name.
    pub configured: &'a str,
    /// Registered name satisfying the configuration.
    pub registered: Option<&'a str>,
}

/// JSON entry for one printer number.
#[derive(Debug, Serialize)]
pub struct EntryJson<'a> {
    /// Printer number.
    pub number: u32,
    /// Whether the address is valid.
    pub valid: bool,
    /// Configured address, for invalid entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<&'a str>,
    /// Derived port name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_name: Option<&'a str>,
    /// Whether the port exists.
    pub port_exists: bool,
    /// Derived printer name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printer_name: Option<&'a str>,
    /// Whether the printer exists.
    pub printer_exists: bool,
    /// Whether this is the configured default.
    pub is_default: bool,
}

impl<'a> From<&'a DeploymentStatus> for StatusJson<'a> {
    fn from(status: &'a DeploymentStatus) -> Self {
        let printers = status
            .entries
            .iter()
            .map(|entry| match entry {
                EntryStatus::Present {
                    number,
                    port_name,
                    port_exists,
                    printer_name,
                    printer_exists,
                    is_default,
                } => EntryJson {
                    number: *number,
                    valid: true,
                    address: None,
                    port_name: Some(port_name),
                    port_exists: *port_exists,
                    printer_name: Some(printer_name),
                    printer_exists: *printer_exists,
                    is_default: *is_default,
                },
                EntryStatus::Invalid { number, address } => EntryJson {
                    number: *number,
                    valid: false,
                    address: Some(address),
                    port_name: None,
                    port_exists: false,
                    printer_name: None,
                    printer_exists: false,
                    is_default: false,
                },
            })
            .collect();
        Self {
            driver: DriverJson {
                configured: &status.driver_name,
                registered: status.registered_driver.as_deref(),
            },
            printers,
            converged: status.is_converged(),
        }
    }
}
