//! Integrity verification of downloaded packages.
//!
//! The verifier compares the SHA-256 of the whole package file against an
//! optional expectation. Without an expectation the check is skipped and a
//! warning is logged; with one, a mismatch stops the pipeline before any
//! extraction takes place.

use super::download::DownloadedPackage;
use super::sha256_digest::Sha256Digest;
use log::{info, warn};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by [`IntegrityVerifier::verify`].
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// The package digest differs from the expectation.
    #[error("SHA-256 mismatch for {}: expected {expected}, got {actual}", .path.display())]
    Mismatch {
        /// The configured digest.
        expected: Sha256Digest,
        /// The digest of the downloaded bytes.
        actual: Sha256Digest,
        /// The package that was hashed.
        path: PathBuf,
    },

    /// The package could not be read.
    #[error("failed to read {} for hashing: {source}", .path.display())]
    Io {
        /// The package that was being hashed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// What the verifier concluded about a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The digest matched the expectation.
    Verified(Sha256Digest),
    /// No expectation was configured.
    Skipped,
}

/// Checks a downloaded package against an optional SHA-256 expectation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityVerifier {
    expectation: Option<Sha256Digest>,
}

impl IntegrityVerifier {
    /// Creates a verifier; `None` disables the check.
    #[must_use]
    pub fn new(expectation: Option<Sha256Digest>) -> Self {
        Self { expectation }
    }

    /// Returns whether a digest will be enforced.
    #[must_use]
    pub fn is_enforcing(&self) -> bool {
        self.expectation.is_some()
    }

    /// Verify `package`.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError::Mismatch`] when the digest differs, or
    /// [`IntegrityError::Io`] when the file cannot be read.
    pub fn verify(&self, package: &DownloadedPackage) -> Result<VerificationOutcome, IntegrityError> {
        let Some(expected) = &self.expectation else {
            warn!(
                target: "printdeploy_installer::verification",
                "no SHA-256 expectation configured; skipping integrity check of {}",
                package.local_path.display()
            );
            return Ok(VerificationOutcome::Skipped);
        };

        let actual = compute_sha256(&package.local_path).map_err(|source| IntegrityError::Io {
            path: package.local_path.clone(),
            source,
        })?;
        if actual != *expected {
            return Err(IntegrityError::Mismatch {
                expected: expected.clone(),
                actual,
                path: package.local_path.clone(),
            });
        }
        info!(
            target: "printdeploy_installer::verification",
            "SHA-256 verified: {actual}"
        );
        Ok(VerificationOutcome::Verified(actual))
    }
}

/// Compute the SHA-256 digest of the file at `path`.
///
/// # Errors
///
/// Returns any I/O error raised while reading the file.
pub fn compute_sha256(path: &Path) -> io::Result<Sha256Digest> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(Sha256Digest::from_bytes(&hasher.finalize()))
}
