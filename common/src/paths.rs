//! Well-known locations for the transcript log and the staging directory.
//!
//! On Windows the transcript lives under `%ProgramData%` so that every
//! operator account appends to the same history. Other platforms fall back to
//! the per-user local data directory reported by `directories-next`.

use directories_next::ProjectDirs;
use std::path::PathBuf;

/// Directory name used under every base location.
pub const APP_DIR: &str = "printdeploy";

/// File name of the append-only transcript log.
pub const TRANSCRIPT_FILENAME: &str = "transcript.log";

/// Return the fixed transcript path for this machine.
///
/// Returns `None` only when neither `%ProgramData%` nor a local data
/// directory can be determined.
#[must_use]
pub fn default_transcript_path() -> Option<PathBuf> {
    let program_data = if cfg!(windows) {
        std::env::var_os("ProgramData").map(PathBuf::from)
    } else {
        None
    };
    let data_local =
        ProjectDirs::from("", "", APP_DIR).map(|dirs| dirs.data_local_dir().to_path_buf());
    transcript_path_from(program_data, data_local)
}

/// Return the default staging directory for downloads and extraction.
#[must_use]
pub fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join(APP_DIR)
}

fn transcript_path_from(
    program_data: Option<PathBuf>,
    data_local: Option<PathBuf>,
) -> Option<PathBuf> {
    program_data
        .map(|base| base.join(APP_DIR))
        .or(data_local)
        .map(|dir| dir.join(TRANSCRIPT_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn program_data_takes_precedence() {
        let path = transcript_path_from(
            Some(PathBuf::from("C:/ProgramData")),
            Some(PathBuf::from("/home/op/.local/share/printdeploy")),
        )
        .expect("path");
        assert!(path.ends_with("printdeploy/transcript.log"));
        assert!(path.starts_with("C:/ProgramData"));
    }

    #[rstest]
    fn falls_back_to_local_data_dir() {
        let path = transcript_path_from(None, Some(PathBuf::from("/data/printdeploy")))
            .expect("path");
        assert_eq!(path, PathBuf::from("/data/printdeploy/transcript.log"));
    }

    #[rstest]
    fn none_without_any_base() {
        assert!(transcript_path_from(None, None).is_none());
    }

    #[rstest]
    fn staging_dir_is_under_temp() {
        assert!(default_staging_dir().ends_with(APP_DIR));
    }
}
