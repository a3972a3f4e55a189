//! printdeploy installer library.
//!
//! This crate acquires a printer driver package, stages it into the platform
//! driver store, and provisions a declarative set of network printers with
//! it. It is used by the `printdeploy` binary and can be driven
//! programmatically with injected platform doubles for testing.
//!
//! # Modules
//!
//! - [`artefact`] - Source resolution, download, verification, extraction
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Deployment configuration loading and validation
//! - [`descriptor`] - Driver descriptor discovery in extracted bundles
//! - [`error`] - Top-level error taxonomy and exit codes
//! - [`http`] - HTTP client abstraction backed by `ureq`
//! - [`naming`] - Port and printer naming
//! - [`output`] - Operator-facing output helpers and dry-run plans
//! - [`pipeline`] - End-to-end deployment orchestration
//! - [`print`] - Print subsystem abstraction and the PowerShell backend
//! - [`process`] - Subprocess execution with timeouts
//! - [`provisioner`] - Idempotent port and printer provisioning
//! - [`stager`] - Driver store staging and driver registration
//! - [`status`] - Read-only deployment status reporting

pub mod artefact;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod http;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod print;
pub mod process;
pub mod provisioner;
pub mod stager;
pub mod status;
pub mod status_output;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
