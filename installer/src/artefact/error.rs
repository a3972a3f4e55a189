//! Error types for invalid artefact inputs.
//!
//! Each variant names the rejected input and the constraint it violated.
//! These errors surface while configuration is validated, before any stage
//! of the pipeline runs.

use thiserror::Error;

/// Errors arising from invalid artefact-related values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtefactError {
    /// A SHA-256 digest is not a valid 64-character hex string.
    #[error("invalid SHA-256 digest: {reason}")]
    InvalidSha256Digest {
        /// Description of the validation failure.
        reason: String,
    },

    /// A driver source reference is not a usable HTTP(S) URL.
    #[error("invalid driver source \"{value}\": {reason}")]
    InvalidSource {
        /// The rejected reference.
        value: String,
        /// Description of the validation failure.
        reason: String,
    },
}

/// Result type alias using [`ArtefactError`].
pub type Result<T> = std::result::Result<T, ArtefactError>;
