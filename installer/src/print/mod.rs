//! Print subsystem management.
//!
//! [`PrintSubsystem`] is the only way the pipeline inspects or mutates the
//! platform's drivers, ports, and printers. Objects are exchanged as typed
//! records deserialised from a single normalised JSON shape.

pub mod powershell;

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use thiserror::Error;

pub use powershell::{ExecutionPolicy, PowerShell, PowerShellPrintSubsystem};

/// A printer driver registered with the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverRecord {
    /// Driver display name.
    #[serde(rename = "Name")]
    pub name: String,
}

/// A printer port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRecord {
    /// Port name, e.g. `IP_10.0.0.9`.
    #[serde(rename = "Name")]
    pub name: String,
    /// Host address for TCP/IP ports.
    #[serde(rename = "PrinterHostAddress", default)]
    pub host_address: Option<String>,
}

/// An installed printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterRecord {
    /// Printer name.
    #[serde(rename = "Name")]
    pub name: String,
    /// Name of the driver the printer uses.
    #[serde(rename = "DriverName", default)]
    pub driver_name: String,
    /// Name of the port the printer is bound to.
    #[serde(rename = "PortName", default)]
    pub port_name: String,
}

/// Parameters for creating a printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewPrinter<'a> {
    /// Printer name.
    pub name: &'a str,
    /// Registered driver name.
    pub driver_name: &'a str,
    /// Existing port name.
    pub port_name: &'a str,
}

/// Errors raised by a print subsystem backend.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The management host process could not be started or timed out.
    #[error("failed to run {program}: {source}")]
    Launch {
        /// Program that failed to launch.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A management command exited unsuccessfully.
    #[error("{operation} failed ({}): {message}", crate::process::describe_exit(.exit_code))]
    CommandFailed {
        /// Operation being attempted.
        operation: String,
        /// Exit code, if any.
        exit_code: Option<i32>,
        /// Captured diagnostics.
        message: String,
    },

    /// Command output could not be parsed into records.
    #[error("unexpected output from {operation}: {source}")]
    Parse {
        /// Operation whose output was malformed.
        operation: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The backend refused the operation.
    #[error("{operation} was rejected: {message}")]
    Rejected {
        /// Operation being attempted.
        operation: String,
        /// Reason given by the backend.
        message: String,
    },
}

/// Driver, port, and printer management.
///
/// Name comparisons in the provided lookup helpers are case-insensitive, as
/// the platform's own object names are.
pub trait PrintSubsystem {
    /// Lists registered printer drivers.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when the query fails.
    fn drivers(&self) -> Result<Vec<DriverRecord>, PlatformError>;

    /// Registers a printer driver by name from the driver store.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when registration fails.
    fn add_driver(&self, name: &str) -> Result<(), PlatformError>;

    /// Lists printer ports.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when the query fails.
    fn ports(&self) -> Result<Vec<PortRecord>, PlatformError>;

    /// Creates a TCP/IP port named `name` for `address`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when creation fails.
    fn add_port(&self, name: &str, address: Ipv4Addr) -> Result<(), PlatformError>;

    /// Lists installed printers.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when the query fails.
    fn printers(&self) -> Result<Vec<PrinterRecord>, PlatformError>;

    /// Creates a printer.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when creation fails.
    fn add_printer(&self, printer: &NewPrinter<'_>) -> Result<(), PlatformError>;

    /// Designates `name` as the default printer.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when the designation fails.
    fn set_default_printer(&self, name: &str) -> Result<(), PlatformError>;

    /// Returns whether a driver named `name` is registered.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when the query fails.
    fn driver_exists(&self, name: &str) -> Result<bool, PlatformError> {
        Ok(self
            .drivers()?
            .iter()
            .any(|d| d.name.eq_ignore_ascii_case(name)))
    }

    /// Returns whether a port named `name` exists.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when the query fails.
    fn port_exists(&self, name: &str) -> Result<bool, PlatformError> {
        Ok(self
            .ports()?
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(name)))
    }

    /// Returns whether a printer named `name` exists.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when the query fails.
    fn printer_exists(&self, name: &str) -> Result<bool, PlatformError> {
        Ok(self
            .printers()?
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(name)))
    }
}
