//! Top-level error taxonomy for the deployment CLI.
//!
//! Every stage owns its error type; [`DeployError`] gathers them so the
//! binary can log the failure with its taxonomy name and exit with a code
//! that identifies the failing stage.

use crate::artefact::download::DownloadError;
use crate::artefact::extraction::ExtractionError;
use crate::artefact::resolver::SourceResolutionError;
use crate::artefact::verification::IntegrityError;
use crate::config::ConfigError;
use crate::descriptor::DriverNotFoundError;
use crate::provisioner::{PrinterNotFoundError, ProvisionError, ProvisioningError};
use crate::stager::DriverStageError;
use std::io;
use thiserror::Error;

/// Errors that abort a deployment run.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The source reference did not lead to a downloadable asset.
    #[error(transparent)]
    Resolve(#[from] SourceResolutionError),

    /// The asset could not be downloaded.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// The downloaded bytes do not match the expected digest.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// The package could not be expanded.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// No driver descriptor was found.
    #[error(transparent)]
    DriverNotFound(#[from] DriverNotFoundError),

    /// The driver could not be staged or registered.
    #[error(transparent)]
    DriverStage(#[from] DriverStageError),

    /// A port or printer could not be provisioned.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    /// The configured default printer does not exist.
    #[error(transparent)]
    PrinterNotFound(#[from] PrinterNotFoundError),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Any other I/O failure, such as the transcript or output streams.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl DeployError {
    /// Wraps an I/O error with a short description of the operation.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Name of the error category, as used in the transcript.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Resolve(_) => "SourceResolutionError",
            Self::Download(_) => "DownloadError",
            Self::Integrity(_) => "IntegrityError",
            Self::Extraction(_) => "ExtractionError",
            Self::DriverNotFound(_) => "DriverNotFoundError",
            Self::DriverStage(_) => "DriverStageError",
            Self::Provisioning(_) => "ProvisioningError",
            Self::PrinterNotFound(_) => "PrinterNotFoundError",
            Self::Config(_) => "ConfigError",
            Self::Io { .. } => "IoError",
        }
    }

    /// Process exit code for this failure.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Resolve(_) => 10,
            Self::Download(_) => 11,
            Self::Integrity(_) => 12,
            Self::Extraction(_) => 13,
            Self::DriverNotFound(_) => 14,
            Self::DriverStage(_) => 15,
            Self::Provisioning(_) => 16,
            Self::PrinterNotFound(_) => 17,
            Self::Config(_) => 2,
            Self::Io { .. } => 1,
        }
    }
}

impl From<ProvisionError> for DeployError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::Provisioning(inner) => Self::Provisioning(inner),
            ProvisionError::PrinterNotFound(inner) => Self::PrinterNotFound(inner),
        }
    }
}

/// Result type alias using [`DeployError`].
pub type Result<T> = std::result::Result<T, DeployError>;
