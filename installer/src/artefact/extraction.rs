//! Package expansion.
//!
//! ZIP packages are expanded directly with path traversal protection.
//! Self-extracting `.exe` packages are frequently plain ZIP containers, so
//! the extractor first renames the file to `.zip` and tries that (renaming it
//! back whatever happens). When the file is not a ZIP container it is run
//! silently as an installer; the result is then only
//! [`ExtractionOutcome::PossiblyInstalled`], because a real installer may
//! have unpacked somewhere else or installed the driver itself.

use super::download::DownloadedPackage;
use crate::config::InstallerSettings;
use crate::process::{CommandExecutor, describe_exit, output_summary};
use camino::Utf8Path;
use log::{info, warn};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use zip::ZipArchive;
use zip::result::ZipError;

/// Placeholder in silent installer arguments replaced by the work directory.
pub const DIR_PLACEHOLDER: &str = "{dir}";

/// Container formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    /// A ZIP archive.
    Zip,
    /// A self-extracting executable, possibly a ZIP container.
    SelfExtracting,
}

impl PackageFormat {
    /// Determines the format from the file extension (case-insensitive).
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        Self::from_extension(path.extension()?.to_str()?)
    }

    /// Maps a file extension (without the dot, case-insensitive) to a format.
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        if extension.eq_ignore_ascii_case("zip") {
            Some(Self::Zip)
        } else if extension.eq_ignore_ascii_case("exe") {
            Some(Self::SelfExtracting)
        } else {
            None
        }
    }

    /// Recognises a package from its leading bytes: `PK` for ZIP, `MZ` for a
    /// Windows executable.
    ///
    /// # Examples
    ///
    /// ```
    /// use printdeploy_installer::artefact::extraction::PackageFormat;
    ///
    /// assert_eq!(PackageFormat::from_magic(b"PK\x03\x04"), Some(PackageFormat::Zip));
    /// assert_eq!(PackageFormat::from_magic(b"MZ\x90\x00"), Some(PackageFormat::SelfExtracting));
    /// assert_eq!(PackageFormat::from_magic(b"<html>"), None);
    /// ```
    #[must_use]
    pub fn from_magic(header: &[u8]) -> Option<Self> {
        match header.get(..2)? {
            b"PK" => Some(Self::Zip),
            b"MZ" => Some(Self::SelfExtracting),
            _ => None,
        }
    }

    /// Reads the first bytes of `path` and recognises them with
    /// [`Self::from_magic`].
    ///
    /// # Errors
    ///
    /// Returns the I/O error if `path` cannot be opened or read.
    pub fn sniff(path: &Path) -> io::Result<Option<Self>> {
        let mut header = Vec::with_capacity(2);
        File::open(path)?.take(2).read_to_end(&mut header)?;
        Ok(Self::from_magic(&header))
    }

    /// The file extension the extractor expects for this format.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::SelfExtracting => "exe",
        }
    }
}

/// A directory holding expanded package contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBundle {
    /// Root of the expanded tree.
    pub root_dir: PathBuf,
}

/// Result of [`ArchiveExtractor::extract`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// The package was expanded into the bundle.
    Bundle(ExtractedBundle),
    /// The package was run as an installer; the bundle may be empty.
    PossiblyInstalled {
        /// The work directory handed to the installer.
        bundle: ExtractedBundle,
        /// The installer's exit code, if it reported one.
        exit_code: Option<i32>,
    },
}

impl ExtractionOutcome {
    /// The bundle directory, whichever way it was produced.
    #[must_use]
    pub fn bundle(&self) -> &ExtractedBundle {
        match self {
            Self::Bundle(bundle) | Self::PossiblyInstalled { bundle, .. } => bundle,
        }
    }
}

/// Errors arising from package expansion.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The package extension is neither `.zip` nor `.exe`.
    #[error("unsupported extension: {}", .path.display())]
    UnsupportedExtension {
        /// The package path.
        path: PathBuf,
    },

    /// The work directory could not be recreated.
    #[error("cannot prepare work directory {}: {source}", .path.display())]
    WorkDir {
        /// The work directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// I/O error while writing extracted files.
    #[error("extraction I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is not a readable ZIP archive.
    #[error("invalid ZIP archive: {0}")]
    Archive(#[from] ZipError),

    /// An entry attempts to escape the work directory.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending entry name.
        path: String,
    },

    /// The temporary `.zip` name could not be reverted.
    #[error("cannot restore {}: {source}", .path.display())]
    Restore {
        /// The original package path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The installer path cannot be passed on a command line.
    #[error("installer path is not valid UTF-8: {}", .path.display())]
    NonUtf8Path {
        /// The offending path.
        path: PathBuf,
    },

    /// The silent installer could not be started or timed out.
    #[error("failed to run installer {}: {source}", .path.display())]
    InstallerLaunch {
        /// The installer path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Expands downloaded packages into a work directory.
pub struct ArchiveExtractor<'a> {
    executor: &'a dyn CommandExecutor,
    settings: &'a InstallerSettings,
}

impl<'a> ArchiveExtractor<'a> {
    /// Creates an extractor that runs installers through `executor`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, settings: &'a InstallerSettings) -> Self {
        Self { executor, settings }
    }

    /// Expand `package` into a freshly recreated `work_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError`] for unsupported extensions, unreadable or
    /// malicious archives, file system failures, and installer launch
    /// failures. A non-zero installer exit is not an error.
    pub fn extract(
        &self,
        package: &DownloadedPackage,
        work_dir: &Path,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let path = &package.local_path;
        let format = PackageFormat::from_path(path)
            .ok_or_else(|| ExtractionError::UnsupportedExtension { path: path.clone() })?;
        prepare_work_dir(work_dir)?;
        let bundle = ExtractedBundle {
            root_dir: work_dir.to_path_buf(),
        };

        match format {
            PackageFormat::Zip => {
                let files = expand_zip(path, work_dir)?;
                info!(target: "printdeploy_installer::extraction", "expanded {files} files from {}", path.display());
                Ok(ExtractionOutcome::Bundle(bundle))
            }
            PackageFormat::SelfExtracting => match expand_as_zip(path, work_dir) {
                Ok(files) => {
                    info!(
                        target: "printdeploy_installer::extraction",
                        "{} is a ZIP container; expanded {files} files",
                        path.display()
                    );
                    Ok(ExtractionOutcome::Bundle(bundle))
                }
                Err(ExtractionError::Archive(err)) => {
                    info!(
                        target: "printdeploy_installer::extraction",
                        "{} is not a ZIP container ({err}); running it as a silent installer",
                        path.display()
                    );
                    prepare_work_dir(work_dir)?;
                    let exit_code = self.run_installer(path, work_dir)?;
                    Ok(ExtractionOutcome::PossiblyInstalled { bundle, exit_code })
                }
                Err(err) => Err(err),
            },
        }
    }

    /// Builds the installer arguments for `work_dir`.
    #[must_use]
    pub fn installer_arguments(&self, work_dir: &Utf8Path) -> Vec<String> {
        self.settings
            .silent_args
            .iter()
            .map(|arg| arg.replace(DIR_PLACEHOLDER, work_dir.as_str()))
            .collect()
    }

    fn run_installer(&self, path: &Path, work_dir: &Path) -> Result<Option<i32>, ExtractionError> {
        let program = Utf8Path::from_path(path)
            .ok_or_else(|| ExtractionError::NonUtf8Path { path: path.to_path_buf() })?;
        let dir = Utf8Path::from_path(work_dir).ok_or_else(|| ExtractionError::NonUtf8Path {
            path: work_dir.to_path_buf(),
        })?;
        let args = self.installer_arguments(dir);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        let output = self
            .executor
            .run(program.as_str(), &arg_refs, self.settings.timeout())
            .map_err(|source| ExtractionError::InstallerLaunch {
                path: path.to_path_buf(),
                source,
            })?;

        let exit_code = output.status.code();
        if output.status.success() {
            info!(target: "printdeploy_installer::extraction", "installer finished");
        } else {
            warn!(
                target: "printdeploy_installer::extraction",
                "installer finished with {}; continuing: {}",
                describe_exit(&exit_code),
                output_summary(&output)
            );
        }
        Ok(exit_code)
    }
}

fn prepare_work_dir(work_dir: &Path) -> Result<(), ExtractionError> {
    let work_dir_error = |source| ExtractionError::WorkDir {
        path: work_dir.to_path_buf(),
        source,
    };
    if work_dir.exists() {
        fs::remove_dir_all(work_dir).map_err(work_dir_error)?;
    }
    fs::create_dir_all(work_dir).map_err(work_dir_error)
}

/// Temporarily renames `exe` to `.zip`, expands it, and renames it back.
fn expand_as_zip(exe: &Path, work_dir: &Path) -> Result<usize, ExtractionError> {
    let zip_path = exe.with_extension("zip");
    if zip_path.exists() {
        fs::remove_file(&zip_path)?;
    }
    fs::rename(exe, &zip_path)?;
    let expanded = expand_zip(&zip_path, work_dir);
    fs::rename(&zip_path, exe).map_err(|source| ExtractionError::Restore {
        path: exe.to_path_buf(),
        source,
    })?;
    expanded
}

/// Expand the ZIP archive at `archive` into `dest`, returning the number of
/// files written.
///
/// # Errors
///
/// Returns [`ExtractionError::PathTraversal`] if any entry would land
/// outside `dest`, [`ExtractionError::Archive`] if the file is not a ZIP
/// archive, and [`ExtractionError::Io`] on write failures.
pub fn expand_zip(archive: &Path, dest: &Path) -> Result<usize, ExtractionError> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let mut files = 0;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        validate_entry_path(Path::new(entry.name()))?;
        let relative = entry.enclosed_name().ok_or_else(|| ExtractionError::PathTraversal {
            path: entry.name().to_owned(),
        })?;
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        if let Some(modified) = entry.last_modified().and_then(entry_time) {
            out.set_modified(modified)?;
        }
        files += 1;
    }

    Ok(files)
}

/// Converts a ZIP entry timestamp to a `SystemTime`, read as UTC.
///
/// Returns `None` for the out-of-range dates some archivers write.
fn entry_time(stamp: zip::DateTime) -> Option<SystemTime> {
    let month = time::Month::try_from(stamp.month()).ok()?;
    let date = time::Date::from_calendar_date(i32::from(stamp.year()), month, stamp.day()).ok()?;
    let clock = time::Time::from_hms(stamp.hour(), stamp.minute(), stamp.second()).ok()?;
    Some(time::PrimitiveDateTime::new(date, clock).assume_utc().into())
}

/// Validate that an entry path does not escape the destination directory
/// via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}
