//! Append-only transcript logging.
//!
//! [`TranscriptLogger`] is the `log` backend installed by the printdeploy
//! binary. Every record becomes one line in a durable transcript file:
//!
//! ```text
//! 2026-10-19T08:15:02.113Z [INFO] [3/7] Verifying package integrity
//! ```
//!
//! The file is opened in append mode, so repeated runs accumulate history.
//! Records are mirrored to stderr for the operator; `quiet` restricts the
//! mirror to warnings and errors while the transcript still receives
//! everything enabled by the level filter.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Target prefix of records emitted by printdeploy crates.
const OWN_TARGET_PREFIX: &str = "printdeploy";

/// Errors raised while opening or installing the transcript.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    /// The transcript file or its directory could not be opened.
    #[error("cannot open transcript {path}: {source}")]
    Open {
        /// Transcript path that failed to open.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Another global logger was already installed.
    #[error("a logger is already installed for this process")]
    AlreadyInstalled,
}

/// Mirror and verbosity options for a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptOptions {
    /// Most verbose level written to the transcript.
    pub level: LevelFilter,
    /// Restrict the stderr mirror to warnings and errors.
    pub quiet: bool,
}

impl TranscriptOptions {
    /// Build options from the CLI verbosity count.
    ///
    /// `0` records info and above, `1` adds debug, anything higher adds trace.
    #[must_use]
    pub fn from_verbosity(verbosity: u8, quiet: bool) -> Self {
        let level = match verbosity {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };
        Self { level, quiet }
    }
}

impl Default for TranscriptOptions {
    fn default() -> Self {
        Self::from_verbosity(0, false)
    }
}

type SharedWriter = Mutex<Box<dyn Write + Send>>;

/// A `log::Log` implementation appending to a durable transcript.
pub struct TranscriptLogger {
    sink: SharedWriter,
    mirror: Option<SharedWriter>,
    options: TranscriptOptions,
}

impl TranscriptLogger {
    /// Open (or create) the transcript at `path` in append mode, mirroring to
    /// stderr.
    ///
    /// # Errors
    ///
    /// Returns [`TranscriptError::Open`] when the parent directory cannot be
    /// created or the file cannot be opened for appending.
    pub fn open(path: &Path, options: TranscriptOptions) -> Result<Self, TranscriptError> {
        let open_error = |source| TranscriptError::Open {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(open_error)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(open_error)?;
        Ok(Self::new(Box::new(file), Some(Box::new(io::stderr())), options))
    }

    /// Build a logger over arbitrary writers.
    #[must_use]
    pub fn new(
        sink: Box<dyn Write + Send>,
        mirror: Option<Box<dyn Write + Send>>,
        options: TranscriptOptions,
    ) -> Self {
        Self {
            sink: Mutex::new(sink),
            mirror: mirror.map(Mutex::new),
            options,
        }
    }

    /// Install this logger as the process-wide `log` backend.
    ///
    /// # Errors
    ///
    /// Returns [`TranscriptError::AlreadyInstalled`] if a logger is already set.
    pub fn install(self) -> Result<(), TranscriptError> {
        let level = self.options.level;
        log::set_boxed_logger(Box::new(self)).map_err(|_| TranscriptError::AlreadyInstalled)?;
        log::set_max_level(level);
        Ok(())
    }

    fn mirrors(&self, level: Level) -> bool {
        !self.options.quiet || level <= Level::Warn
    }
}

impl Log for TranscriptLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.options.level
            && (metadata.target().starts_with(OWN_TARGET_PREFIX) || metadata.level() <= Level::Warn)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        let line = format_line(OffsetDateTime::now_utc(), record.level(), &message);
        if let Ok(mut sink) = self.sink.lock() {
            // A failing transcript write must not abort the deployment.
            let _ = writeln!(sink, "{line}");
        }
        if let Some(mirror) = self.mirror.as_ref().filter(|_| self.mirrors(record.level())) {
            if let Ok(mut mirror) = mirror.lock() {
                let _ = writeln!(mirror, "{}", format_mirror_line(record.level(), &message));
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut sink) = self.sink.lock() {
            let _ = sink.flush();
        }
        if let Some(mirror) = &self.mirror {
            if let Ok(mut mirror) = mirror.lock() {
                let _ = mirror.flush();
            }
        }
    }
}

/// Format one transcript line.
///
/// Multi-line messages are folded onto a single line so that the transcript
/// keeps exactly one line per event.
#[must_use]
pub fn format_line(timestamp: OffsetDateTime, level: Level, message: &str) -> String {
    let stamp = timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| timestamp.unix_timestamp().to_string());
    let folded = message.lines().collect::<Vec<_>>().join(" | ");
    format!("{stamp} [{level}] {folded}")
}

fn format_mirror_line(level: Level, message: &str) -> String {
    match level {
        Level::Error => format!("error: {message}"),
        Level::Warn => format!("warning: {message}"),
        Level::Info => message.to_owned(),
        Level::Debug | Level::Trace => format!("debug: {message}"),
    }
}
