//! Deployment pipeline orchestration.
//!
//! [`run_pipeline`] is the only place that knows the stage order. It
//! sequences resolution, download, verification, extraction, descriptor
//! discovery, driver staging, and provisioning, aborting on the first
//! failure. Nothing is rolled back: the platform converges towards the
//! configuration on every run.

use crate::artefact::download::{DownloadedPackage, PackageFetcher};
use crate::artefact::extraction::{ArchiveExtractor, ExtractionOutcome};
use crate::artefact::resolver::{AssetResolver, ResolvedAsset};
use crate::artefact::verification::{IntegrityVerifier, VerificationOutcome};
use crate::config::DeploymentConfig;
use crate::descriptor::{DescriptorLocator, DriverDescriptor};
use crate::error::Result;
use crate::http::HttpClient;
use crate::print::PrintSubsystem;
use crate::process::CommandExecutor;
use crate::provisioner::{PrinterProvisioner, ProvisionReport};
use crate::stager::{DriverStager, RegisteredDriver};
use log::info;
use std::path::{Path, PathBuf};

/// Number of stages reported in progress lines.
pub const STAGE_COUNT: u8 = 7;

/// Subdirectory of the staging directory receiving downloads.
pub const DOWNLOADS_DIR: &str = "downloads";

/// Subdirectory of the staging directory receiving expanded bundles.
pub const EXTRACTED_DIR: &str = "extracted";

/// Platform boundaries used by the pipeline.
#[derive(Clone, Copy)]
pub struct Platform<'a> {
    /// HTTP transport.
    pub http: &'a dyn HttpClient,
    /// Subprocess launcher.
    pub executor: &'a dyn CommandExecutor,
    /// Print subsystem management.
    pub print: &'a dyn PrintSubsystem,
}

/// Inputs for a pipeline run.
pub struct PipelineContext<'a> {
    /// Validated configuration.
    pub config: &'a DeploymentConfig,
    /// Root of the downloads and extraction directories.
    pub staging_dir: &'a Path,
}

impl PipelineContext<'_> {
    /// Directory receiving downloaded packages.
    #[must_use]
    pub fn downloads_dir(&self) -> PathBuf {
        self.staging_dir.join(DOWNLOADS_DIR)
    }

    /// Work directory for expanding `package`.
    #[must_use]
    pub fn work_dir_for(&self, package: &DownloadedPackage) -> PathBuf {
        let stem = package
            .local_path
            .file_stem()
            .map_or_else(|| "package".into(), |stem| stem.to_string_lossy());
        self.staging_dir.join(EXTRACTED_DIR).join(&*stem)
    }
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentReport {
    /// The concrete asset that was downloaded.
    pub asset: ResolvedAsset,
    /// The downloaded package.
    pub package: DownloadedPackage,
    /// Whether the digest was checked.
    pub verification: VerificationOutcome,
    /// How the package was expanded.
    pub extraction: ExtractionOutcome,
    /// The descriptor that was staged.
    pub descriptor: DriverDescriptor,
    /// The driver printers are bound to.
    pub driver: RegisteredDriver,
    /// Provisioning outcome.
    pub provisioning: ProvisionReport,
}

fn progress(stage: u8, message: &str) {
    info!(target: "printdeploy_installer::pipeline", "[{stage}/{STAGE_COUNT}] {message}");
}

/// Run every stage in order, stopping at the first failure.
///
/// # Errors
///
/// Returns the failing stage's error wrapped in
/// [`DeployError`](crate::error::DeployError).
pub fn run_pipeline(context: &PipelineContext<'_>, platform: Platform<'_>) -> Result<DeploymentReport> {
    let config = context.config;

    progress(1, &format!("Resolving driver source {}", config.source));
    let asset = AssetResolver::new(platform.http).resolve(&config.source)?;
    info!(target: "printdeploy_installer::pipeline", "resolved asset {}", asset.url);

    progress(2, "Downloading driver package");
    let package = PackageFetcher::new(platform.http).fetch(&asset, &context.downloads_dir())?;

    progress(3, "Verifying package integrity");
    let verification = IntegrityVerifier::new(config.expected_sha256.clone()).verify(&package)?;

    progress(4, "Extracting driver package");
    let extraction = ArchiveExtractor::new(platform.executor, &config.installer)
        .extract(&package, &context.work_dir_for(&package))?;

    progress(5, "Locating driver descriptor");
    let descriptor = DescriptorLocator::new(&config.descriptor_patterns).locate(&extraction)?;

    progress(6, "Staging printer driver");
    let driver = DriverStager::new(
        platform.executor,
        platform.print,
        &config.driver,
        config.commands.timeout(),
    )
    .stage(&descriptor)?;

    progress(7, &format!("Provisioning {} printer(s)", config.printers.len()));
    let provisioning = PrinterProvisioner::new(platform.print, &config.template).provision(
        &config.printers,
        &driver,
        config.default_printer,
    )?;

    info!(
        target: "printdeploy_installer::pipeline",
        "deployment complete: {} printer(s), {} port(s) and {} printer(s) created, {} skipped",
        provisioning.printers.len(),
        provisioning.ports_created,
        provisioning.printers_created,
        provisioning.skipped.len()
    );

    Ok(DeploymentReport {
        asset,
        package,
        verification,
        extraction,
        descriptor,
        driver,
        provisioning,
    })
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
