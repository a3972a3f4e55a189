//! Shared infrastructure for the printdeploy workspace: the append-only
//! transcript logger and the well-known filesystem locations it relies on.

pub mod paths;
pub mod transcript;

pub use paths::{default_staging_dir, default_transcript_path};
pub use transcript::{TranscriptError, TranscriptLogger, TranscriptOptions};
