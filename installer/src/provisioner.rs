//! Idempotent printer provisioning from the device map.
//!
//! Each entry of the map yields one TCP/IP port and one printer bound to the
//! registered driver. Existing objects are left untouched, so running the
//! provisioner repeatedly converges on the same state without creating
//! duplicates.

use crate::naming::{NamingTemplate, port_name};
use crate::print::{NewPrinter, PlatformError, PrintSubsystem};
use crate::stager::RegisteredDriver;
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Printer numbers mapped to their configured IPv4 addresses.
///
/// Iteration is in ascending number order.
pub type DeviceMap = BTreeMap<u32, String>;

/// What provisioning would do with one device map entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPlan {
    /// The entry is valid and maps to a port and a printer.
    Provision {
        /// Printer number.
        number: u32,
        /// Parsed address.
        address: Ipv4Addr,
        /// Derived port name.
        port_name: String,
        /// Derived printer name.
        printer_name: String,
    },
    /// The entry is skipped.
    Skip(SkippedEntry),
}

/// An entry that was not provisioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    /// Printer number.
    pub number: u32,
    /// Address as configured.
    pub address: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Parses a dotted-quad IPv4 address: four decimal octets of one to three
/// digits each, surrounding whitespace ignored.
///
/// Zero-padded octets are read as decimal, so `010.000.000.001` is
/// `10.0.0.1`.
///
/// # Examples
///
/// ```
/// use printdeploy_installer::provisioner::parse_dotted_quad;
/// use std::net::Ipv4Addr;
///
/// assert_eq!(parse_dotted_quad(" 010.0.0.001 "), Some(Ipv4Addr::new(10, 0, 0, 1)));
/// assert_eq!(parse_dotted_quad("10.0.0.256"), None);
/// assert_eq!(parse_dotted_quad("printer-7"), None);
/// ```
#[must_use]
pub fn parse_dotted_quad(raw: &str) -> Option<Ipv4Addr> {
    let mut octets = [0_u8; 4];
    let mut parts = raw.trim().split('.');
    for octet in &mut octets {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *octet = part.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}

/// Derive the port and printer names for every entry without touching the
/// platform.
#[must_use]
pub fn plan_entries(map: &DeviceMap, template: &NamingTemplate) -> Vec<EntryPlan> {
    map.iter()
        .map(|(&number, raw)| match parse_dotted_quad(raw) {
            Some(address) => EntryPlan::Provision {
                number,
                address,
                port_name: port_name(address),
                printer_name: template.printer_name(number, address),
            },
            None => EntryPlan::Skip(SkippedEntry {
                number,
                address: raw.clone(),
                reason: "not a dotted-quad IPv4 address".to_owned(),
            }),
        })
        .collect()
}

/// A printer that exists after provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedPrinter {
    /// Printer number.
    pub number: u32,
    /// Port the printer is bound to.
    pub port_name: String,
    /// Printer name.
    pub printer_name: String,
    /// Whether it was designated default by this run.
    pub is_default: bool,
}

/// Outcome of a provisioning run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    /// Printers in ascending number order.
    pub printers: Vec<ProvisionedPrinter>,
    /// Entries skipped because of invalid addresses.
    pub skipped: Vec<SkippedEntry>,
    /// Ports created by this run.
    pub ports_created: usize,
    /// Printers created by this run.
    pub printers_created: usize,
    /// Name of the printer designated default, if any.
    pub default_printer: Option<String>,
}

/// A port or printer could not be inspected or created.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Existing objects could not be listed.
    #[error("cannot query the print subsystem: {0}")]
    Query(#[source] PlatformError),

    /// Port creation failed.
    #[error("cannot create port {port} for printer {number}: {source}")]
    CreatePort {
        /// Printer number.
        number: u32,
        /// Port name.
        port: String,
        /// Underlying platform error.
        #[source]
        source: PlatformError,
    },

    /// Printer creation failed.
    #[error("cannot create printer \"{printer}\" for entry {number}: {source}")]
    CreatePrinter {
        /// Printer number.
        number: u32,
        /// Printer name.
        printer: String,
        /// Underlying platform error.
        #[source]
        source: PlatformError,
    },

    /// The default printer could not be designated.
    #[error("cannot make \"{printer}\" the default printer: {source}")]
    SetDefault {
        /// Printer name.
        printer: String,
        /// Underlying platform error.
        #[source]
        source: PlatformError,
    },
}

/// The configured default printer does not exist.
#[derive(Debug, Error)]
#[error("default printer {number} (\"{}\") does not exist", .name.as_deref().unwrap_or("no valid address"))]
pub struct PrinterNotFoundError {
    /// Configured printer number.
    pub number: u32,
    /// Derived printer name, when the entry had a valid address.
    pub name: Option<String>,
}

/// Failures of [`PrinterProvisioner::provision`].
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Port or printer provisioning failed.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
    /// The default printer is missing.
    #[error(transparent)]
    PrinterNotFound(#[from] PrinterNotFoundError),
}

/// Creates ports and printers for a device map.
pub struct PrinterProvisioner<'a> {
    print: &'a dyn PrintSubsystem,
    template: &'a NamingTemplate,
}

impl<'a> PrinterProvisioner<'a> {
    /// Creates a provisioner.
    #[must_use]
    pub fn new(print: &'a dyn PrintSubsystem, template: &'a NamingTemplate) -> Self {
        Self { print, template }
    }

    /// Provision every entry of `map` with `driver`, then designate
    /// `default_number` as the default printer when given.
    ///
    /// Entries with invalid addresses are skipped with a warning. The first
    /// creation or query failure aborts the remaining entries.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Provisioning`] when a query or creation
    /// fails and [`ProvisionError::PrinterNotFound`] when the default
    /// printer does not exist after provisioning.
    pub fn provision(
        &self,
        map: &DeviceMap,
        driver: &RegisteredDriver,
        default_number: Option<u32>,
    ) -> Result<ProvisionReport, ProvisionError> {
        let mut report = ProvisionReport::default();
        for plan in plan_entries(map, self.template) {
            match plan {
                EntryPlan::Skip(skipped) => {
                    warn!(
                        target: "printdeploy_installer::provisioner",
                        "skipping printer {}: \"{}\" is {}",
                        skipped.number,
                        skipped.address,
                        skipped.reason
                    );
                    report.skipped.push(skipped);
                }
                EntryPlan::Provision {
                    number,
                    address,
                    port_name,
                    printer_name,
                } => {
                    self.ensure_port(number, &port_name, address, &mut report)?;
                    self.ensure_printer(number, &printer_name, &port_name, driver, &mut report)?;
                    report.printers.push(ProvisionedPrinter {
                        number,
                        port_name,
                        printer_name,
                        is_default: false,
                    });
                }
            }
        }

        if let Some(number) = default_number {
            self.designate_default(number, &mut report)?;
        }
        Ok(report)
    }

    fn ensure_port(
        &self,
        number: u32,
        port: &str,
        address: Ipv4Addr,
        report: &mut ProvisionReport,
    ) -> Result<(), ProvisioningError> {
        if self.print.port_exists(port).map_err(ProvisioningError::Query)? {
            info!(target: "printdeploy_installer::provisioner", "port {port} already exists");
            return Ok(());
        }
        self.print
            .add_port(port, address)
            .map_err(|source| ProvisioningError::CreatePort {
                number,
                port: port.to_owned(),
                source,
            })?;
        report.ports_created += 1;
        info!(target: "printdeploy_installer::provisioner", "created port {port}");
        Ok(())
    }

    fn ensure_printer(
        &self,
        number: u32,
        printer: &str,
        port: &str,
        driver: &RegisteredDriver,
        report: &mut ProvisionReport,
    ) -> Result<(), ProvisioningError> {
        if self
            .print
            .printer_exists(printer)
            .map_err(ProvisioningError::Query)?
        {
            info!(target: "printdeploy_installer::provisioner", "printer \"{printer}\" already exists");
            return Ok(());
        }
        let request = NewPrinter {
            name: printer,
            driver_name: &driver.name,
            port_name: port,
        };
        self.print
            .add_printer(&request)
            .map_err(|source| ProvisioningError::CreatePrinter {
                number,
                printer: printer.to_owned(),
                source,
            })?;
        report.printers_created += 1;
        info!(
            target: "printdeploy_installer::provisioner",
            "created printer \"{printer}\" on {port} with driver \"{}\"",
            driver.name
        );
        Ok(())
    }

    fn designate_default(&self, number: u32, report: &mut ProvisionReport) -> Result<(), ProvisionError> {
        let Some(entry) = report.printers.iter_mut().find(|p| p.number == number) else {
            return Err(PrinterNotFoundError { number, name: None }.into());
        };
        let name = entry.printer_name.clone();
        if !self
            .print
            .printer_exists(&name)
            .map_err(ProvisioningError::Query)?
        {
            return Err(PrinterNotFoundError {
                number,
                name: Some(name),
            }
            .into());
        }
        self.print
            .set_default_printer(&name)
            .map_err(|source| ProvisioningError::SetDefault {
                printer: name.clone(),
                source,
            })?;
        entry.is_default = true;
        info!(target: "printdeploy_installer::provisioner", "\"{name}\" is now the default printer");
        report.default_printer = Some(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stager::DriverOrigin;
    use crate::test_utils::{FakeOperation, FakePrintSubsystem};
    use rstest::{fixture, rstest};

    const DRIVER: &str = "HP Universal Printing PCL 6";

    #[fixture]
    fn template() -> NamingTemplate {
        NamingTemplate::parse("Printer {number} ({address})").expect("template")
    }

    #[fixture]
    fn driver() -> RegisteredDriver {
        RegisteredDriver {
            name: DRIVER.to_owned(),
            origin: DriverOrigin::AlreadyRegistered,
        }
    }

    fn device_map(entries: &[(u32, &str)]) -> DeviceMap {
        entries
            .iter()
            .map(|&(number, address)| (number, address.to_owned()))
            .collect()
    }

    #[rstest]
    fn creates_port_and_printer(template: NamingTemplate, driver: RegisteredDriver) {
        let print = FakePrintSubsystem::new();
        let map = device_map(&[(1, "10.20.30.41")]);

        let report = PrinterProvisioner::new(&print, &template)
            .provision(&map, &driver, None)
            .expect("provision");

        assert_eq!(print.port_names(), vec!["IP_10.20.30.41".to_owned()]);
        let printers = print.printer_records();
        assert_eq!(printers.len(), 1);
        let printer = printers.first().expect("printer");
        assert_eq!(printer.name, "Printer 1 (10.20.30.41)");
        assert_eq!(printer.driver_name, DRIVER);
        assert_eq!(printer.port_name, "IP_10.20.30.41");
        assert_eq!((report.ports_created, report.printers_created), (1, 1));
    }

    #[rstest]
    fn second_run_creates_nothing(template: NamingTemplate, driver: RegisteredDriver) {
        let print = FakePrintSubsystem::new();
        let map = device_map(&[(1, "10.20.30.41"), (2, "10.20.30.42")]);
        let provisioner = PrinterProvisioner::new(&print, &template);

        let first = provisioner.provision(&map, &driver, Some(2)).expect("first run");
        let second = provisioner.provision(&map, &driver, Some(2)).expect("second run");

        assert_eq!((second.ports_created, second.printers_created), (0, 0));
        assert_eq!(first.printers, second.printers);
        assert_eq!(print.port_names().len(), 2);
        assert_eq!(print.printer_records().len(), 2);
    }

    #[rstest]
    fn invalid_address_is_skipped(template: NamingTemplate, driver: RegisteredDriver) {
        let print = FakePrintSubsystem::new();
        let map = device_map(&[(1, "not-an-ip"), (2, "10.0.0.9")]);

        let report = PrinterProvisioner::new(&print, &template)
            .provision(&map, &driver, None)
            .expect("provision");

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped.first().map(|s| s.number), Some(1));
        assert_eq!(print.port_names(), vec!["IP_10.0.0.9".to_owned()]);
        assert_eq!(report.printers.len(), 1);
    }

    #[rstest]
    #[case("10.0.0.256")]
    #[case("10.0.0")]
    #[case("10.0.0.1.5")]
    #[case("10..0.1")]
    #[case("0010.0.0.1")]
    #[case("+10.0.0.1")]
    #[case("0x0a.0.0.1")]
    #[case("::1")]
    fn plan_rejects_malformed_addresses(template: NamingTemplate, #[case] address: &str) {
        let plans = plan_entries(&device_map(&[(3, address)]), &template);
        assert!(matches!(plans.as_slice(), [EntryPlan::Skip(s)] if s.number == 3));
    }

    #[rstest]
    fn zero_padded_octets_are_decimal(template: NamingTemplate) {
        let plans = plan_entries(&device_map(&[(4, " 010.020.030.041 ")]), &template);

        match plans.as_slice() {
            [EntryPlan::Provision { address, port_name, printer_name, .. }] => {
                assert_eq!(*address, Ipv4Addr::new(10, 20, 30, 41));
                assert_eq!(port_name, "IP_10.20.30.41");
                assert_eq!(printer_name, "Printer 4 (10.20.30.41)");
            }
            other => panic!("expected a provisioned entry, got {other:?}"),
        }
    }

    #[rstest]
    fn existing_port_is_reused(template: NamingTemplate, driver: RegisteredDriver) {
        let print = FakePrintSubsystem::new().with_port("ip_10.0.0.9");
        let map = device_map(&[(2, "10.0.0.9")]);

        let report = PrinterProvisioner::new(&print, &template)
            .provision(&map, &driver, None)
            .expect("provision");

        assert_eq!(report.ports_created, 0);
        assert_eq!(report.printers_created, 1);
    }

    #[rstest]
    fn default_printer_is_designated(template: NamingTemplate, driver: RegisteredDriver) {
        let print = FakePrintSubsystem::new();
        let map = device_map(&[(1, "10.0.0.1"), (2, "10.0.0.2")]);

        let report = PrinterProvisioner::new(&print, &template)
            .provision(&map, &driver, Some(2))
            .expect("provision");

        assert_eq!(print.default_printer().as_deref(), Some("Printer 2 (10.0.0.2)"));
        let defaults: Vec<u32> = report
            .printers
            .iter()
            .filter(|p| p.is_default)
            .map(|p| p.number)
            .collect();
        assert_eq!(defaults, vec![2]);
    }

    #[rstest]
    fn default_on_skipped_entry_is_not_found(template: NamingTemplate, driver: RegisteredDriver) {
        let print = FakePrintSubsystem::new();
        let map = device_map(&[(1, "bogus"), (2, "10.0.0.2")]);

        let err = PrinterProvisioner::new(&print, &template)
            .provision(&map, &driver, Some(1))
            .expect_err("should fail");

        assert!(matches!(
            err,
            ProvisionError::PrinterNotFound(PrinterNotFoundError { number: 1, name: None })
        ));
        assert!(print.default_printer().is_none());
    }

    #[rstest]
    #[case(FakeOperation::AddPort)]
    #[case(FakeOperation::AddPrinter)]
    #[case(FakeOperation::Query)]
    fn failure_aborts_remaining_entries(
        template: NamingTemplate,
        driver: RegisteredDriver,
        #[case] failing: FakeOperation,
    ) {
        let print = FakePrintSubsystem::new();
        print.fail_on(failing);
        let map = device_map(&[(1, "10.0.0.1"), (2, "10.0.0.2")]);

        let err = PrinterProvisioner::new(&print, &template)
            .provision(&map, &driver, None)
            .expect_err("should fail");

        assert!(matches!(err, ProvisionError::Provisioning(_)));
        assert!(print.printer_records().is_empty());
    }

    #[rstest]
    fn set_default_failure_is_provisioning_error(template: NamingTemplate, driver: RegisteredDriver) {
        let print = FakePrintSubsystem::new();
        print.fail_on(FakeOperation::SetDefault);
        let map = device_map(&[(1, "10.0.0.1")]);

        let err = PrinterProvisioner::new(&print, &template)
            .provision(&map, &driver, Some(1))
            .expect_err("should fail");

        assert!(matches!(
            err,
            ProvisionError::Provisioning(ProvisioningError::SetDefault { .. })
        ));
    }
}
