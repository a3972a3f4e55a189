//! Shared test utilities for the installer crate.
//!
//! The doubles here replace each platform boundary: [`StubExecutor`] for
//! subprocesses, [`StubHttpClient`] for HTTP, and [`FakePrintSubsystem`] for
//! the print subsystem.
#![allow(
    clippy::expect_used,
    clippy::panic,
    reason = "test doubles fail loudly on misuse"
)]

use crate::http::{DownloadReceipt, HttpClient, ResponseMeta, TextDocument, TransportError};
use crate::print::{
    DriverRecord, NewPrinter, PlatformError, PortRecord, PrintSubsystem, PrinterRecord,
};
use crate::process::CommandExecutor;
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Cursor, Write};
use std::net::Ipv4Addr;
use std::path::Path;
use std::process::{ExitStatus, Output};
use std::time::Duration;

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.cast_unsigned())
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a successful command `Output` whose stdout is `stdout`.
#[must_use]
pub fn stdout_output(stdout: &str) -> Output {
    Output {
        stdout: stdout.as_bytes().to_vec(),
        ..success_output()
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The command to execute (e.g., `pnputil.exe`).
    pub cmd: String,
    /// The arguments to pass to the command.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: io::Result<Output>,
}

impl ExpectedCall {
    /// Expect `cmd` with `args`, answering with `result`.
    pub fn new<S: AsRef<str>>(cmd: &str, args: &[S], result: io::Result<Output>) -> Self {
        Self {
            cmd: cmd.to_owned(),
            args: args.iter().map(|a| a.as_ref().to_owned()).collect(),
            result,
        }
    }
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results,
/// allowing tests to verify command execution without side effects.
/// Timeouts are accepted and ignored.
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
        }
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            self.expected.borrow().is_empty(),
            "expected no further command invocations"
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, cmd: &str, args: &[&str], _timeout: Duration) -> io::Result<Output> {
        let mut expected = self.expected.borrow_mut();
        let call = expected
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected command invocation: {cmd} {args:?}"));

        assert_eq!(call.cmd, cmd);
        assert_eq!(call.args, args);

        call.result
    }
}

/// A request observed by [`StubHttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpCall {
    /// Metadata-only request.
    Probe(String),
    /// Document fetch.
    FetchText(String),
    /// Body download.
    Download(String),
}

/// An `HttpClient` serving canned responses keyed by URL.
///
/// Unknown URLs answer with HTTP 404. Every request is recorded so tests can
/// assert which calls were (or were not) made.
#[derive(Debug, Default)]
pub struct StubHttpClient {
    probes: HashMap<String, Result<ResponseMeta, TransportError>>,
    pages: HashMap<String, TextDocument>,
    downloads: HashMap<String, Vec<u8>>,
    calls: RefCell<Vec<HttpCall>>,
}

impl StubHttpClient {
    /// Creates a client with no canned responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer metadata requests for `url` with `content_type`.
    #[must_use]
    pub fn with_content_type(mut self, url: &str, content_type: &str) -> Self {
        self.probes.insert(
            url.to_owned(),
            Ok(ResponseMeta {
                status: 200,
                content_type: Some(content_type.to_owned()),
                final_url: url.to_owned(),
            }),
        );
        self
    }

    /// Answer metadata requests for `url` with a transport failure.
    #[must_use]
    pub fn with_probe_error(mut self, url: &str, error: TransportError) -> Self {
        self.probes.insert(url.to_owned(), Err(error));
        self
    }

    /// Serve `html` for document fetches of `url`.
    #[must_use]
    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.with_redirected_page(url, url, html)
    }

    /// Serve `html` for document fetches of `url` as if redirected to
    /// `final_url`.
    #[must_use]
    pub fn with_redirected_page(mut self, url: &str, final_url: &str, html: &str) -> Self {
        self.pages.insert(
            url.to_owned(),
            TextDocument {
                final_url: final_url.to_owned(),
                body: html.to_owned(),
            },
        );
        self
    }

    /// Serve `bytes` for downloads of `url`.
    #[must_use]
    pub fn with_download(mut self, url: &str, bytes: &[u8]) -> Self {
        self.downloads.insert(url.to_owned(), bytes.to_vec());
        self
    }

    /// Returns every request made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<HttpCall> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: HttpCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl HttpClient for StubHttpClient {
    fn probe(&self, url: &str) -> Result<ResponseMeta, TransportError> {
        self.record(HttpCall::Probe(url.to_owned()));
        self.probes
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(TransportError::status(url, 404)))
    }

    fn fetch_text(&self, url: &str) -> Result<TextDocument, TransportError> {
        self.record(HttpCall::FetchText(url.to_owned()));
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::status(url, 404))
    }

    fn download_to(&self, url: &str, dest: &Path) -> Result<DownloadReceipt, TransportError> {
        self.record(HttpCall::Download(url.to_owned()));
        let bytes = self
            .downloads
            .get(url)
            .ok_or_else(|| TransportError::status(url, 404))?;
        std::fs::write(dest, bytes).map_err(|e| TransportError::new(url, e.to_string()))?;
        Ok(DownloadReceipt {
            bytes: bytes.len() as u64,
            final_url: url.to_owned(),
        })
    }
}

/// Operations of [`FakePrintSubsystem`] that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeOperation {
    /// Driver registration.
    AddDriver,
    /// Port creation.
    AddPort,
    /// Printer creation.
    AddPrinter,
    /// Any list query.
    Query,
    /// Default printer designation.
    SetDefault,
}

#[derive(Debug, Default)]
struct FakeState {
    drivers: Vec<DriverRecord>,
    ports: Vec<PortRecord>,
    printers: Vec<PrinterRecord>,
    default_printer: Option<String>,
    drivers_added: usize,
    ports_added: usize,
    printers_added: usize,
    failing: Option<FakeOperation>,
}

/// An in-memory print subsystem that counts the objects it creates.
#[derive(Debug, Default)]
pub struct FakePrintSubsystem {
    state: RefCell<FakeState>,
}

impl FakePrintSubsystem {
    /// Creates an empty subsystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a registered driver.
    #[must_use]
    pub fn with_driver(self, name: &str) -> Self {
        self.state.borrow_mut().drivers.push(DriverRecord {
            name: name.to_owned(),
        });
        self
    }

    /// Seed an existing port.
    #[must_use]
    pub fn with_port(self, name: &str) -> Self {
        self.state.borrow_mut().ports.push(PortRecord {
            name: name.to_owned(),
            host_address: None,
        });
        self
    }

    /// Seed an existing printer.
    #[must_use]
    pub fn with_printer(self, name: &str, driver_name: &str, port_name: &str) -> Self {
        self.state.borrow_mut().printers.push(PrinterRecord {
            name: name.to_owned(),
            driver_name: driver_name.to_owned(),
            port_name: port_name.to_owned(),
        });
        self
    }

    /// Make `operation` fail from now on.
    pub fn fail_on(&self, operation: FakeOperation) {
        self.state.borrow_mut().failing = Some(operation);
    }

    /// Number of drivers registered through this fake.
    #[must_use]
    pub fn drivers_added(&self) -> usize {
        self.state.borrow().drivers_added
    }

    /// Number of ports created through this fake.
    #[must_use]
    pub fn ports_added(&self) -> usize {
        self.state.borrow().ports_added
    }

    /// Number of printers created through this fake.
    #[must_use]
    pub fn printers_added(&self) -> usize {
        self.state.borrow().printers_added
    }

    /// Names of every port, in creation order.
    #[must_use]
    pub fn port_names(&self) -> Vec<String> {
        self.state.borrow().ports.iter().map(|p| p.name.clone()).collect()
    }

    /// Every printer, in creation order.
    #[must_use]
    pub fn printer_records(&self) -> Vec<PrinterRecord> {
        self.state.borrow().printers.clone()
    }

    /// The printer designated as default, if any.
    #[must_use]
    pub fn default_printer(&self) -> Option<String> {
        self.state.borrow().default_printer.clone()
    }

    /// Total number of objects created, across all kinds.
    #[must_use]
    pub fn total_created(&self) -> usize {
        let state = self.state.borrow();
        state.drivers_added + state.ports_added + state.printers_added
    }

    fn check(&self, operation: FakeOperation) -> Result<(), PlatformError> {
        if self.state.borrow().failing == Some(operation) {
            return Err(PlatformError::Rejected {
                operation: format!("{operation:?}"),
                message: "injected failure".to_owned(),
            });
        }
        Ok(())
    }
}

impl PrintSubsystem for FakePrintSubsystem {
    fn drivers(&self) -> Result<Vec<DriverRecord>, PlatformError> {
        self.check(FakeOperation::Query)?;
        Ok(self.state.borrow().drivers.clone())
    }

    fn add_driver(&self, name: &str) -> Result<(), PlatformError> {
        self.check(FakeOperation::AddDriver)?;
        let mut state = self.state.borrow_mut();
        state.drivers.push(DriverRecord {
            name: name.to_owned(),
        });
        state.drivers_added += 1;
        Ok(())
    }

    fn ports(&self) -> Result<Vec<PortRecord>, PlatformError> {
        self.check(FakeOperation::Query)?;
        Ok(self.state.borrow().ports.clone())
    }

    fn add_port(&self, name: &str, address: Ipv4Addr) -> Result<(), PlatformError> {
        self.check(FakeOperation::AddPort)?;
        let mut state = self.state.borrow_mut();
        state.ports.push(PortRecord {
            name: name.to_owned(),
            host_address: Some(address.to_string()),
        });
        state.ports_added += 1;
        Ok(())
    }

    fn printers(&self) -> Result<Vec<PrinterRecord>, PlatformError> {
        self.check(FakeOperation::Query)?;
        Ok(self.state.borrow().printers.clone())
    }

    fn add_printer(&self, printer: &NewPrinter<'_>) -> Result<(), PlatformError> {
        self.check(FakeOperation::AddPrinter)?;
        let mut state = self.state.borrow_mut();
        state.printers.push(PrinterRecord {
            name: printer.name.to_owned(),
            driver_name: printer.driver_name.to_owned(),
            port_name: printer.port_name.to_owned(),
        });
        state.printers_added += 1;
        Ok(())
    }

    fn set_default_printer(&self, name: &str) -> Result<(), PlatformError> {
        self.check(FakeOperation::SetDefault)?;
        self.state.borrow_mut().default_printer = Some(name.to_owned());
        Ok(())
    }
}

/// Builds an in-memory ZIP archive from `(name, contents)` entries.
///
/// Names ending in `/` become directory entries.
#[must_use]
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, contents) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).expect("add directory");
        } else {
            writer.start_file(*name, options).expect("start file");
            writer.write_all(contents.as_bytes()).expect("write entry");
        }
    }
    writer.finish().expect("finish archive").into_inner()
}

/// Builds an in-memory ZIP archive whose file entries carry the given
/// modification dates, as `(name, (year, month, day))`.
#[must_use]
pub fn dated_zip_bytes(entries: &[(&str, (u16, u8, u8))]) -> Vec<u8> {
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, DateTime, ZipWriter};

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, (year, month, day)) in entries {
        let stamp = DateTime::from_date_and_time(*year, *month, *day, 12, 0, 0)
            .expect("representable ZIP date");
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .last_modified_time(stamp);
        writer.start_file(*name, options).expect("start file");
        writer.write_all(b"[Version]").expect("write entry");
    }
    writer.finish().expect("finish archive").into_inner()
}

/// Computes the lowercase hex SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    use std::fmt::Write as _;

    Sha256::digest(data)
        .iter()
        .fold(String::with_capacity(64), |mut hex, byte| {
            let _ = write!(hex, "{byte:02x}");
            hex
        })
}
