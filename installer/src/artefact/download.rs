//! Package download into the staging area.
//!
//! [`PackageFetcher`] names the local file after the final path segment of
//! the asset URL and streams the body through the [`HttpClient`]. There is no
//! retry and no resume; a partial file left by a failed transfer is
//! overwritten by the next run.
//!
//! The extractor dispatches on the file extension, so a segment without a
//! `.zip` or `.exe` suffix gets one appended: from the resolved format when
//! known, otherwise from the leading bytes of the downloaded file.

use super::extraction::PackageFormat;
use super::resolver::ResolvedAsset;
use crate::http::{HttpClient, TransportError};
use log::{info, warn};
use std::io;
use std::path::{Path, PathBuf};
use url::Url;

/// A package file on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedPackage {
    /// Location of the downloaded file.
    pub local_path: PathBuf,
    /// Size of the file in bytes.
    pub byte_length: u64,
}

/// Errors arising from package download.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The asset URL has no usable final path segment.
    #[error("cannot derive file name from {url}")]
    NoFileName {
        /// The asset URL.
        url: String,
    },

    /// The destination directory could not be created.
    #[error("cannot create download directory {}: {source}", .path.display())]
    CreateDir {
        /// The directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The downloaded file could not be inspected or renamed.
    #[error("cannot name downloaded package {}: {source}", .path.display())]
    Rename {
        /// The downloaded file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The transfer failed.
    #[error("download failed: {0}")]
    Transport(#[from] TransportError),
}

impl DownloadError {
    /// The HTTP status reported by the server, if the failure carried one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(err) => err.status,
            Self::NoFileName { .. } | Self::CreateDir { .. } | Self::Rename { .. } => None,
        }
    }
}

/// Derive the local file name for `url`: its last non-empty path segment.
///
/// # Examples
///
/// ```
/// use printdeploy_installer::artefact::download::file_name_for;
/// use url::Url;
///
/// let url = Url::parse("https://vendor.example/files/upd-pcl6.zip?sig=1").expect("URL");
/// assert_eq!(file_name_for(&url).as_deref(), Some("upd-pcl6.zip"));
/// ```
#[must_use]
pub fn file_name_for(url: &Url) -> Option<String> {
    url.path_segments()?
        .rev()
        .find(|segment| !segment.is_empty())
        .filter(|segment| !matches!(*segment, "." | ".."))
        .filter(|segment| !segment.contains(['/', '\\']))
        .map(str::to_owned)
}

/// Downloads resolved assets.
pub struct PackageFetcher<'a> {
    http: &'a dyn HttpClient,
}

impl<'a> PackageFetcher<'a> {
    /// Creates a fetcher that downloads through `http`.
    #[must_use]
    pub fn new(http: &'a dyn HttpClient) -> Self {
        Self { http }
    }

    /// Download `asset` into `destination_dir`, creating it when absent.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] when no file name can be derived, the
    /// directory cannot be created, the transfer fails, or the downloaded
    /// file cannot be renamed to carry its format.
    pub fn fetch(
        &self,
        asset: &ResolvedAsset,
        destination_dir: &Path,
    ) -> Result<DownloadedPackage, DownloadError> {
        let file_name = file_name_for(&asset.url).ok_or_else(|| DownloadError::NoFileName {
            url: asset.url.to_string(),
        })?;
        std::fs::create_dir_all(destination_dir).map_err(|source| DownloadError::CreateDir {
            path: destination_dir.to_path_buf(),
            source,
        })?;

        let named = PackageFormat::from_path(Path::new(&file_name)).is_some();
        let local_path = match asset.format {
            Some(format) if !named => {
                destination_dir.join(format!("{file_name}.{}", format.extension()))
            }
            _ => destination_dir.join(&file_name),
        };
        let receipt = self.http.download_to(asset.url.as_str(), &local_path)?;
        let local_path = if named || asset.format.is_some() {
            local_path
        } else {
            name_by_content(local_path)?
        };
        info!(
            target: "printdeploy_installer::download",
            "downloaded {} bytes from {} to {}",
            receipt.bytes,
            receipt.final_url,
            local_path.display()
        );

        Ok(DownloadedPackage {
            local_path,
            byte_length: receipt.bytes,
        })
    }
}

/// Appends the extension matching the leading bytes of `path`, leaving the
/// file alone when they match no known package format.
fn name_by_content(path: PathBuf) -> Result<PathBuf, DownloadError> {
    let rename_error = |source| DownloadError::Rename {
        path: path.clone(),
        source,
    };
    let Some(format) = PackageFormat::sniff(&path).map_err(rename_error)? else {
        warn!(
            target: "printdeploy_installer::download",
            "{} is neither a ZIP archive nor an executable",
            path.display()
        );
        return Ok(path);
    };
    let mut renamed = path.clone().into_os_string();
    renamed.push(".");
    renamed.push(format.extension());
    let renamed = PathBuf::from(renamed);
    std::fs::rename(&path, &renamed).map_err(rename_error)?;
    info!(
        target: "printdeploy_installer::download",
        "recognised {} as {format:?}",
        renamed.display()
    );
    Ok(renamed)
}
