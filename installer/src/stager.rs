//! Driver staging and registration.
//!
//! Staging copies the descriptor's package into the platform driver store
//! with `pnputil`. Registration then makes sure a printer driver object
//! exists: vendors often register the driver under a versioned display name,
//! so the configured name is treated as a hint and a wildcard match wins over
//! creating a second driver.

use crate::descriptor::DriverDescriptor;
use crate::print::{PlatformError, PrintSubsystem};
use crate::process::{CommandExecutor, describe_exit, output_summary};
use camino::Utf8Path;
use glob::{MatchOptions, Pattern, PatternError};
use log::info;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Utility that adds packages to the driver store.
pub const STAGING_UTILITY: &str = "pnputil.exe";

/// Default wildcard for the vendor's universal driver display names.
pub const DEFAULT_DRIVER_MATCH_PATTERN: &str = "HP Universal Printing PCL 6*";

const CASE_INSENSITIVE: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Driver naming hints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverSettings {
    /// Preferred driver name.
    pub name: String,
    /// Wildcard accepted in place of the preferred name.
    pub match_pattern: Pattern,
}

impl DriverSettings {
    /// Builds settings from a name and a glob pattern.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] when `pattern` is not a valid glob.
    pub fn new(name: &str, pattern: &str) -> Result<Self, PatternError> {
        Ok(Self {
            name: name.to_owned(),
            match_pattern: Pattern::new(pattern)?,
        })
    }

    /// Returns whether `candidate` matches the wildcard, ignoring case.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        self.match_pattern.matches_with(candidate, CASE_INSENSITIVE)
    }
}

/// How the registered driver was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverOrigin {
    /// A driver with the configured name existed before staging.
    AlreadyRegistered,
    /// Staging produced a driver with the configured name.
    ExactMatch,
    /// Staging produced a driver matching the wildcard.
    PatternMatch,
    /// The driver was registered explicitly under the configured name.
    Created,
}

/// The driver printers will be bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredDriver {
    /// Driver name as known to the platform.
    pub name: String,
    /// How it was obtained.
    pub origin: DriverOrigin,
}

/// Errors raised while staging or registering the driver.
#[derive(Debug, Error)]
pub enum DriverStageError {
    /// The staging utility could not be started or timed out.
    #[error("failed to run {STAGING_UTILITY}: {source}")]
    Launch {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The descriptor path cannot be passed on a command line.
    #[error("descriptor path is not valid UTF-8: {}", .path.display())]
    NonUtf8Path {
        /// The offending path.
        path: PathBuf,
    },

    /// The staging utility reported failure.
    #[error("{STAGING_UTILITY} failed ({}): {output}", describe_exit(.exit_code))]
    StagingUtility {
        /// Exit code, if any.
        exit_code: Option<i32>,
        /// Captured diagnostics.
        output: String,
    },

    /// Registered drivers could not be listed.
    #[error("cannot list registered drivers: {0}")]
    Query(#[source] PlatformError),

    /// The driver could not be registered.
    #[error("cannot register driver \"{name}\": {source}")]
    Registration {
        /// The name being registered.
        name: String,
        /// Underlying platform error.
        #[source]
        source: PlatformError,
    },
}

/// Stages descriptors and resolves the registered driver.
pub struct DriverStager<'a> {
    executor: &'a dyn CommandExecutor,
    print: &'a dyn PrintSubsystem,
    settings: &'a DriverSettings,
    timeout: Duration,
}

impl<'a> DriverStager<'a> {
    /// Creates a stager.
    #[must_use]
    pub fn new(
        executor: &'a dyn CommandExecutor,
        print: &'a dyn PrintSubsystem,
        settings: &'a DriverSettings,
        timeout: Duration,
    ) -> Self {
        Self {
            executor,
            print,
            settings,
            timeout,
        }
    }

    /// Stage `descriptor` and return the driver to bind printers to.
    ///
    /// When a driver with exactly the configured name is already registered,
    /// staging is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DriverStageError`] when the staging utility fails, the
    /// driver list cannot be queried, or registration fails.
    pub fn stage(&self, descriptor: &DriverDescriptor) -> Result<RegisteredDriver, DriverStageError> {
        let configured = self.settings.name.as_str();
        if self.registered_names()?.iter().any(|name| name == configured) {
            info!(
                target: "printdeploy_installer::stager",
                "driver \"{configured}\" is already registered; skipping staging"
            );
            return Ok(RegisteredDriver {
                name: configured.to_owned(),
                origin: DriverOrigin::AlreadyRegistered,
            });
        }

        self.run_staging_utility(descriptor)?;

        let names = self.registered_names()?;
        if names.iter().any(|name| name == configured) {
            return Ok(RegisteredDriver {
                name: configured.to_owned(),
                origin: DriverOrigin::ExactMatch,
            });
        }
        if let Some(name) = names.into_iter().find(|name| self.settings.matches(name)) {
            info!(
                target: "printdeploy_installer::stager",
                "using driver \"{name}\" matching \"{}\"",
                self.settings.match_pattern
            );
            return Ok(RegisteredDriver {
                name,
                origin: DriverOrigin::PatternMatch,
            });
        }

        self.print
            .add_driver(configured)
            .map_err(|source| DriverStageError::Registration {
                name: configured.to_owned(),
                source,
            })?;
        info!(target: "printdeploy_installer::stager", "registered driver \"{configured}\"");
        Ok(RegisteredDriver {
            name: configured.to_owned(),
            origin: DriverOrigin::Created,
        })
    }

    /// Arguments for adding `descriptor` to the driver store.
    #[must_use]
    pub fn staging_arguments(descriptor: &Utf8Path) -> [&str; 3] {
        ["/add-driver", descriptor.as_str(), "/install"]
    }

    fn run_staging_utility(&self, descriptor: &DriverDescriptor) -> Result<(), DriverStageError> {
        let path = Utf8Path::from_path(&descriptor.descriptor_path).ok_or_else(|| {
            DriverStageError::NonUtf8Path {
                path: descriptor.descriptor_path.clone(),
            }
        })?;
        let output = self
            .executor
            .run(STAGING_UTILITY, &Self::staging_arguments(path), self.timeout)
            .map_err(|source| DriverStageError::Launch { source })?;
        if !output.status.success() {
            return Err(DriverStageError::StagingUtility {
                exit_code: output.status.code(),
                output: output_summary(&output),
            });
        }
        info!(target: "printdeploy_installer::stager", "staged {path} into the driver store");
        Ok(())
    }

    fn registered_names(&self) -> Result<Vec<String>, DriverStageError> {
        self.print
            .drivers()
            .map(|drivers| drivers.into_iter().map(|d| d.name).collect())
            .map_err(DriverStageError::Query)
    }
}
