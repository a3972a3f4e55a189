//! PowerShell-backed print subsystem.
//!
//! Each operation runs one short-lived `powershell.exe` child through the
//! [`CommandExecutor`]. The execution policy is passed per child with
//! `-ExecutionPolicy`, so no machine or user policy is modified. Queries pipe
//! the PrintManagement cmdlets through `Select-Object` and `ConvertTo-Json`
//! to produce the record shapes in [`super`].

use super::{DriverRecord, NewPrinter, PlatformError, PortRecord, PrintSubsystem, PrinterRecord};
use crate::process::{CommandExecutor, output_summary};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Host program for management scripts.
pub const POWERSHELL_PROGRAM: &str = "powershell.exe";

/// Execution policy applied to each PowerShell child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum ExecutionPolicy {
    /// Nothing is blocked and there are no prompts.
    #[default]
    Bypass,
    /// Downloaded scripts must be signed.
    RemoteSigned,
    /// All scripts must be signed.
    AllSigned,
}

impl ExecutionPolicy {
    /// The policy name as accepted by `-ExecutionPolicy`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bypass => "Bypass",
            Self::RemoteSigned => "RemoteSigned",
            Self::AllSigned => "AllSigned",
        }
    }
}

impl fmt::Display for ExecutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A PowerShell session capability: how and for how long scripts may run.
#[derive(Clone, Copy)]
pub struct PowerShell<'a> {
    executor: &'a dyn CommandExecutor,
    policy: ExecutionPolicy,
    timeout: Duration,
}

impl<'a> PowerShell<'a> {
    /// Creates a session that runs scripts through `executor`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, policy: ExecutionPolicy, timeout: Duration) -> Self {
        Self {
            executor,
            policy,
            timeout,
        }
    }

    /// The execution policy applied to each child.
    #[must_use]
    pub fn policy(&self) -> ExecutionPolicy {
        self.policy
    }

    /// Builds the argument list for running `script`.
    #[must_use]
    pub fn arguments(&self, script: &str) -> Vec<String> {
        vec![
            "-NoLogo".to_owned(),
            "-NoProfile".to_owned(),
            "-NonInteractive".to_owned(),
            "-ExecutionPolicy".to_owned(),
            self.policy.as_str().to_owned(),
            "-Command".to_owned(),
            format!("$ErrorActionPreference = 'Stop'; {script}"),
        ]
    }

    /// Runs `script` and returns its standard output.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Launch`] if PowerShell cannot be started or
    /// times out, and [`PlatformError::CommandFailed`] on a non-zero exit.
    pub fn invoke(&self, operation: &str, script: &str) -> Result<String, PlatformError> {
        debug!(target: "printdeploy_installer::print", "{operation}: {script}");
        let args = self.arguments(script);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self
            .executor
            .run(POWERSHELL_PROGRAM, &arg_refs, self.timeout)
            .map_err(|source| PlatformError::Launch {
                program: POWERSHELL_PROGRAM.to_owned(),
                source,
            })?;
        if !output.status.success() {
            return Err(PlatformError::CommandFailed {
                operation: operation.to_owned(),
                exit_code: output.status.code(),
                message: output_summary(&output),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Quotes `value` as a single-quoted PowerShell string literal.
#[must_use]
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Wraps a pipeline so its output is always a compressed JSON array.
fn json_array(pipeline: &str) -> String {
    format!("ConvertTo-Json -Compress -Depth 2 -InputObject @({pipeline})")
}

/// Parses `ConvertTo-Json` output that may be empty, one object, or an array.
fn parse_records<T: DeserializeOwned>(operation: &str, stdout: &str) -> Result<Vec<T>, PlatformError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let parse_error = |source| PlatformError::Parse {
        operation: operation.to_owned(),
        source,
    };
    if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(parse_error)
    } else {
        serde_json::from_str(trimmed)
            .map(|record| vec![record])
            .map_err(parse_error)
    }
}

/// Print subsystem driven by PrintManagement cmdlets.
pub struct PowerShellPrintSubsystem<'a> {
    shell: PowerShell<'a>,
}

impl<'a> PowerShellPrintSubsystem<'a> {
    /// Creates a subsystem that runs its scripts in `shell`.
    #[must_use]
    pub fn new(shell: PowerShell<'a>) -> Self {
        Self { shell }
    }

    fn query<T: DeserializeOwned>(&self, operation: &str, pipeline: &str) -> Result<Vec<T>, PlatformError> {
        let stdout = self.shell.invoke(operation, &json_array(pipeline))?;
        parse_records(operation, &stdout)
    }
}

impl PrintSubsystem for PowerShellPrintSubsystem<'_> {
    fn drivers(&self) -> Result<Vec<DriverRecord>, PlatformError> {
        self.query("list printer drivers", "Get-PrinterDriver | Select-Object Name")
    }

    fn add_driver(&self, name: &str) -> Result<(), PlatformError> {
        self.shell
            .invoke("add printer driver", &format!("Add-PrinterDriver -Name {}", quote(name)))
            .map(drop)
    }

    fn ports(&self) -> Result<Vec<PortRecord>, PlatformError> {
        self.query(
            "list printer ports",
            "Get-PrinterPort | Select-Object Name, PrinterHostAddress",
        )
    }

    fn add_port(&self, name: &str, address: Ipv4Addr) -> Result<(), PlatformError> {
        let script = format!(
            "Add-PrinterPort -Name {} -PrinterHostAddress {}",
            quote(name),
            quote(&address.to_string())
        );
        self.shell.invoke("add printer port", &script).map(drop)
    }

    fn printers(&self) -> Result<Vec<PrinterRecord>, PlatformError> {
        self.query(
            "list printers",
            "Get-Printer | Select-Object Name, \
             @{Name='DriverName';Expression={[string]$_.DriverName}}, \
             @{Name='PortName';Expression={[string]$_.PortName}}",
        )
    }

    fn add_printer(&self, printer: &NewPrinter<'_>) -> Result<(), PlatformError> {
        let script = format!(
            "Add-Printer -Name {} -DriverName {} -PortName {}",
            quote(printer.name),
            quote(printer.driver_name),
            quote(printer.port_name)
        );
        self.shell.invoke("add printer", &script).map(drop)
    }

    fn set_default_printer(&self, name: &str) -> Result<(), PlatformError> {
        let quoted = quote(name);
        let script = format!(
            "$printer = Get-CimInstance -ClassName Win32_Printer | Where-Object {{ $_.Name -eq {quoted} }}; \
             if (-not $printer) {{ throw \"printer {} not found\" }}; \
             Invoke-CimMethod -InputObject $printer -MethodName SetDefaultPrinter | Out-Null",
            name.replace(['"', '`', '$'], "")
        );
        self.shell.invoke("set default printer", &script).map(drop)
    }
}
