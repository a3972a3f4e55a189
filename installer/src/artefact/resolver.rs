//! Source reference resolution.
//!
//! A configured source may point straight at a package, at an endpoint that
//! serves one without a telling extension, or at a release page that links to
//! it. [`AssetResolver`] turns any of these into a concrete asset URL, trying
//! the cheapest interpretation first:
//!
//! 1. a `.zip` or `.exe` path is accepted without any request;
//! 2. otherwise a metadata-only request classifies the content type;
//! 3. markup (or a path that looks like a listing) is fetched and scanned for
//!    the first archive link.
//!
//! The resolved asset carries its [`PackageFormat`] when the extension or the
//! content type names one. A generic binary type leaves it open for the
//! fetcher to settle from the downloaded bytes.

use super::error::{ArtefactError, Result as ArtefactResult};
use super::extraction::PackageFormat;
use super::links::extract_links;
use crate::http::{HttpClient, TransportError};
use log::{debug, info, warn};
use std::fmt;
use thiserror::Error;
use url::Url;

/// File extensions accepted as driver packages, lowercase.
pub const ARCHIVE_EXTENSIONS: [&str; 2] = ["zip", "exe"];

/// Content types that identify a ZIP payload.
const ZIP_CONTENT_TYPES: &[&str] = &["application/zip", "application/x-zip-compressed"];

/// Content types that identify a Windows executable payload.
const EXECUTABLE_CONTENT_TYPES: &[&str] = &[
    "application/x-msdownload",
    "application/x-msdos-program",
    "application/x-dosexec",
    "application/vnd.microsoft.portable-executable",
];

/// Binary content types that say nothing about the container.
const OPAQUE_BINARY_CONTENT_TYPES: &[&str] = &["application/octet-stream", "binary/octet-stream"];

/// Content types treated as a document to scan for links.
const MARKUP_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// Path segments that mark a release or download listing.
const LISTING_SEGMENTS: &[&str] = &[
    "release",
    "releases",
    "download",
    "downloads",
    "driver",
    "drivers",
];

/// A validated HTTP(S) driver source reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReference(Url);

impl SourceReference {
    /// Parses and validates `value`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::InvalidSource`] when `value` is not an
    /// absolute `http` or `https` URL with a host.
    pub fn parse(value: &str) -> ArtefactResult<Self> {
        let invalid = |reason: String| ArtefactError::InvalidSource {
            value: value.to_owned(),
            reason,
        };
        let url = Url::parse(value.trim()).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme \"{}\"", url.scheme())));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host".to_owned()));
        }
        Ok(Self(url))
    }

    /// The underlying URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.0
    }
}

impl fmt::Display for SourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// A concrete, downloadable package URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    /// The asset URL.
    pub url: Url,
    /// The package format, when the URL or the content type revealed it.
    pub format: Option<PackageFormat>,
}

impl ResolvedAsset {
    /// An asset whose format follows from the extension of `url`.
    #[must_use]
    pub fn from_url(url: Url) -> Self {
        let format = archive_extension(&url).and_then(PackageFormat::from_extension);
        Self { url, format }
    }

    /// The package extension, when the format is known.
    #[must_use]
    pub fn extension(&self) -> Option<&'static str> {
        self.format.map(PackageFormat::extension)
    }
}

/// Errors raised while resolving a source reference.
#[derive(Debug, Error)]
pub enum SourceResolutionError {
    /// The page was fetched but linked to no package.
    #[error("no asset link found on {page}")]
    NoAssetLink {
        /// The scanned page.
        page: String,
    },

    /// The source serves neither a package nor a page.
    #[error("unsupported content type {} at {url}", .content_type.as_deref().unwrap_or("(none)"))]
    UnsupportedContentType {
        /// The probed URL.
        url: String,
        /// The reported content type.
        content_type: Option<String>,
    },

    /// The source could not be reached.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentKind {
    Binary(Option<PackageFormat>),
    Markup,
    Other,
}

fn classify_content_type(content_type: Option<&str>) -> ContentKind {
    let Some(value) = content_type else {
        return ContentKind::Other;
    };
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let essence = essence.as_str();
    if ZIP_CONTENT_TYPES.contains(&essence) {
        ContentKind::Binary(Some(PackageFormat::Zip))
    } else if EXECUTABLE_CONTENT_TYPES.contains(&essence) {
        ContentKind::Binary(Some(PackageFormat::SelfExtracting))
    } else if OPAQUE_BINARY_CONTENT_TYPES.contains(&essence) {
        ContentKind::Binary(None)
    } else if MARKUP_CONTENT_TYPES.contains(&essence) {
        ContentKind::Markup
    } else {
        ContentKind::Other
    }
}

/// Returns the archive extension of `url`'s final path segment, if any.
///
/// Query and fragment are ignored; matching is case-insensitive.
#[must_use]
pub fn archive_extension(url: &Url) -> Option<&'static str> {
    let segment = url.path_segments()?.next_back()?;
    let (_, extension) = segment.rsplit_once('.')?;
    ARCHIVE_EXTENSIONS
        .into_iter()
        .find(|known| known.eq_ignore_ascii_case(extension))
}

/// Returns whether `url` points directly at a package.
#[must_use]
pub fn has_archive_extension(url: &Url) -> bool {
    archive_extension(url).is_some()
}

/// Returns whether `url` looks like a release or download listing.
#[must_use]
pub fn looks_like_listing(url: &Url) -> bool {
    if url.path().ends_with('/') {
        return true;
    }
    url.path_segments().is_some_and(|mut segments| {
        segments.any(|segment| {
            LISTING_SEGMENTS
                .iter()
                .any(|marker| marker.eq_ignore_ascii_case(segment))
        })
    })
}

/// Resolves source references into concrete asset URLs.
pub struct AssetResolver<'a> {
    http: &'a dyn HttpClient,
}

impl<'a> AssetResolver<'a> {
    /// Creates a resolver that issues requests through `http`.
    #[must_use]
    pub fn new(http: &'a dyn HttpClient) -> Self {
        Self { http }
    }

    /// Resolve `source` into a downloadable asset.
    ///
    /// # Errors
    ///
    /// Returns [`SourceResolutionError`] when no package can be identified.
    pub fn resolve(&self, source: &SourceReference) -> Result<ResolvedAsset, SourceResolutionError> {
        let url = source.url();
        if has_archive_extension(url) {
            debug!(target: "printdeploy_installer::resolver", "{url} names a package directly");
            return Ok(ResolvedAsset::from_url(url.clone()));
        }

        match self.http.probe(url.as_str()) {
            Ok(meta) => match classify_content_type(meta.content_type.as_deref()) {
                ContentKind::Binary(format) => {
                    info!(
                        target: "printdeploy_installer::resolver",
                        "{url} serves a binary payload ({})",
                        meta.content_type.as_deref().unwrap_or_default()
                    );
                    Ok(ResolvedAsset {
                        url: url.clone(),
                        format,
                    })
                }
                ContentKind::Markup => self.scan_page(url),
                ContentKind::Other if looks_like_listing(url) => self.scan_page(url),
                ContentKind::Other => Err(SourceResolutionError::UnsupportedContentType {
                    url: url.to_string(),
                    content_type: meta.content_type,
                }),
            },
            Err(err) if looks_like_listing(url) => {
                warn!(
                    target: "printdeploy_installer::resolver",
                    "metadata request failed ({err}); scanning {url} as a listing page"
                );
                self.scan_page(url)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn scan_page(&self, page: &Url) -> Result<ResolvedAsset, SourceResolutionError> {
        let document = self.http.fetch_text(page.as_str())?;
        let base = match Url::parse(&document.final_url) {
            Ok(final_url) => final_url,
            Err(err) => {
                warn!(
                    target: "printdeploy_installer::resolver",
                    "ignoring unparsable final URL {} ({err}); resolving links against {page}",
                    document.final_url
                );
                page.clone()
            }
        };
        let links = extract_links(&base, &document.body);
        debug!(
            target: "printdeploy_installer::resolver",
            "found {} links on {page}",
            links.len()
        );
        let url = links
            .into_iter()
            .find(has_archive_extension)
            .ok_or_else(|| SourceResolutionError::NoAssetLink {
                page: page.to_string(),
            })?;
        info!(target: "printdeploy_installer::resolver", "resolved {page} to {url}");
        Ok(ResolvedAsset::from_url(url))
    }
}
