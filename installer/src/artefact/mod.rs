//! Driver package acquisition.
//!
//! Covers the stages that turn a source reference into files on disk:
//!
//! - [`resolver`] - Source reference to concrete asset URL (`AssetResolver`).
//! - [`links`] - Hyperlink harvesting from release pages.
//! - [`download`] - Streaming download into the staging area (`PackageFetcher`).
//! - [`sha256_digest`] - SHA-256 digest newtype (`Sha256Digest`).
//! - [`verification`] - Optional digest check (`IntegrityVerifier`).
//! - [`extraction`] - ZIP expansion and the self-extracting fallback
//!   (`ArchiveExtractor`).
//! - [`error`] - Validation errors for artefact inputs.

pub mod download;
pub mod error;
pub mod extraction;
pub mod links;
pub mod resolver;
pub mod sha256_digest;
pub mod verification;
