//! SHA-256 digest newtype for package verification.
//!
//! Accepts 64 hexadecimal characters in either case and stores them in
//! lowercase, so comparisons against computed digests are case-insensitive.

use super::error::{ArtefactError, Result};
use std::fmt;

/// Expected length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// A validated, lowercase hex-encoded SHA-256 digest.
///
/// # Examples
///
/// ```
/// use printdeploy_installer::artefact::sha256_digest::Sha256Digest;
///
/// let digest = Sha256Digest::try_from("AB".repeat(32).as_str())?;
/// assert_eq!(digest.as_str(), "ab".repeat(32));
/// # Ok::<(), printdeploy_installer::artefact::error::ArtefactError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Return the digest as a lowercase hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build a digest from raw hash output.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        use std::fmt::Write as _;

        let hex = bytes
            .iter()
            .fold(String::with_capacity(DIGEST_HEX_LEN), |mut hex, byte| {
                let _ = write!(hex, "{byte:02x}");
                hex
            });
        Self(hex)
    }
}

impl TryFrom<&str> for Sha256Digest {
    type Error = ArtefactError;

    fn try_from(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        validate_sha256(trimmed)?;
        Ok(Self(trimmed.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for Sha256Digest {
    type Error = ArtefactError;

    fn try_from(value: String) -> Result<Self> {
        Self::try_from(value.as_str())
    }
}

impl AsRef<str> for Sha256Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse an optional expectation. Blank values mean "no expectation".
///
/// # Errors
///
/// Returns [`ArtefactError::InvalidSha256Digest`] when a non-blank value is
/// not a well-formed digest.
pub fn parse_expectation(value: Option<&str>) -> Result<Option<Sha256Digest>> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(Sha256Digest::try_from)
        .transpose()
}

/// Validate that `value` is a well-formed hex-encoded SHA-256 digest.
fn validate_sha256(value: &str) -> Result<()> {
    if value.len() != DIGEST_HEX_LEN {
        return Err(ArtefactError::InvalidSha256Digest {
            reason: format!(
                "expected {DIGEST_HEX_LEN} hex characters, got {}",
                value.len()
            ),
        });
    }
    if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(ArtefactError::InvalidSha256Digest {
            reason: format!("non-hex character '{bad}'"),
        });
    }
    Ok(())
}
