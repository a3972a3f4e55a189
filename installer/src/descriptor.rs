//! Driver descriptor discovery.
//!
//! A package may contain many `.inf` files (per-architecture variants, helper
//! components, older revisions). Files are ranked by name: the vendor's
//! naming convention first, any other `.inf` second. Within the best tier the
//! newest file wins, and equal modification times fall back to the
//! lexicographically greatest path so that the choice is deterministic.

use crate::artefact::extraction::ExtractionOutcome;
use crate::process::describe_exit;
use log::{debug, info};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use walkdir::WalkDir;

/// Default primary descriptor pattern: the vendor's universal driver naming.
pub const DEFAULT_DESCRIPTOR_PATTERN: &str = r"(?i)^hpcu\w*\.inf$";

/// Secondary descriptor pattern: any `.inf` file.
const SECONDARY_DESCRIPTOR_PATTERN: &str = r"(?i)\.inf$";

/// How well a file name matches the descriptor conventions.
///
/// Ordered best first, so the minimum of a set is its best tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DescriptorTier {
    /// Matches the vendor naming convention.
    Primary,
    /// Any other descriptor file.
    Secondary,
}

/// Compiled descriptor name patterns.
#[derive(Debug, Clone)]
pub struct DescriptorPatterns {
    primary: Regex,
    secondary: Regex,
}

impl DescriptorPatterns {
    /// Compiles `primary` alongside the fixed secondary pattern.
    ///
    /// # Errors
    ///
    /// Returns the regex compiler's error when `primary` is invalid.
    pub fn new(primary: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            primary: Regex::new(primary)?,
            secondary: Regex::new(SECONDARY_DESCRIPTOR_PATTERN)?,
        })
    }

    /// The primary pattern source.
    #[must_use]
    pub fn primary_pattern(&self) -> &str {
        self.primary.as_str()
    }

    /// Ranks `file_name`, or returns `None` for non-descriptors.
    ///
    /// # Examples
    ///
    /// ```
    /// use printdeploy_installer::descriptor::{DescriptorPatterns, DescriptorTier};
    ///
    /// let patterns = DescriptorPatterns::default();
    /// assert_eq!(patterns.classify("hpcu270u.inf"), Some(DescriptorTier::Primary));
    /// assert_eq!(patterns.classify("autorun.INF"), Some(DescriptorTier::Secondary));
    /// assert_eq!(patterns.classify("readme.txt"), None);
    /// ```
    #[must_use]
    pub fn classify(&self, file_name: &str) -> Option<DescriptorTier> {
        if self.primary.is_match(file_name) {
            Some(DescriptorTier::Primary)
        } else if self.secondary.is_match(file_name) {
            Some(DescriptorTier::Secondary)
        } else {
            None
        }
    }
}

impl Default for DescriptorPatterns {
    #[allow(clippy::expect_used, reason = "built-in patterns are constant")]
    fn default() -> Self {
        Self::new(DEFAULT_DESCRIPTOR_PATTERN).expect("default descriptor pattern compiles")
    }
}

/// A ranked descriptor file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorCandidate {
    /// File path.
    pub path: PathBuf,
    /// Name ranking.
    pub tier: DescriptorTier,
    /// Last modification time.
    pub modified: SystemTime,
}

/// Picks the winning candidate: best tier, then newest, then greatest path.
#[must_use]
pub fn choose_descriptor(candidates: Vec<DescriptorCandidate>) -> Option<DescriptorCandidate> {
    let best_tier = candidates.iter().map(|c| c.tier).min()?;
    candidates
        .into_iter()
        .filter(|c| c.tier == best_tier)
        .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)))
}

/// The chosen driver descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverDescriptor {
    /// Path of the `.inf` file.
    pub descriptor_path: PathBuf,
}

/// Errors raised when no descriptor can be located.
#[derive(Debug, Error)]
pub enum DriverNotFoundError {
    /// The bundle holds no descriptor.
    #[error("no driver descriptor (.inf) found under {}", .searched.display())]
    NoDescriptor {
        /// The directory that was searched.
        searched: PathBuf,
    },

    /// The package ran as an installer and left nothing to stage.
    #[error(
        "the package ran as an installer ({}) and left no driver descriptor in {}; \
         it may have installed the driver itself or unpacked to another location",
        describe_exit(.exit_code),
        .dir.display()
    )]
    InstallerLeftNoBundle {
        /// The work directory given to the installer.
        dir: PathBuf,
        /// The installer's exit code.
        exit_code: Option<i32>,
    },

    /// The bundle could not be traversed.
    #[error("cannot search {}: {source}", .path.display())]
    Walk {
        /// The directory being searched.
        path: PathBuf,
        /// Underlying traversal error.
        #[source]
        source: walkdir::Error,
    },
}

/// Finds the driver descriptor in an extraction outcome.
pub struct DescriptorLocator<'a> {
    patterns: &'a DescriptorPatterns,
}

impl<'a> DescriptorLocator<'a> {
    /// Creates a locator using `patterns`.
    #[must_use]
    pub fn new(patterns: &'a DescriptorPatterns) -> Self {
        Self { patterns }
    }

    /// Locate the descriptor inside `outcome`'s bundle.
    ///
    /// # Errors
    ///
    /// Returns [`DriverNotFoundError::InstallerLeftNoBundle`] when an
    /// installer run left no descriptor, [`DriverNotFoundError::NoDescriptor`]
    /// when an expanded archive holds none, and [`DriverNotFoundError::Walk`]
    /// when traversal fails.
    pub fn locate(&self, outcome: &ExtractionOutcome) -> Result<DriverDescriptor, DriverNotFoundError> {
        let root = &outcome.bundle().root_dir;
        let candidates = self.candidates(root)?;
        debug!(
            target: "printdeploy_installer::descriptor",
            "{} descriptor candidates under {}",
            candidates.len(),
            root.display()
        );

        let Some(chosen) = choose_descriptor(candidates) else {
            return Err(match outcome {
                ExtractionOutcome::PossiblyInstalled { exit_code, .. } => {
                    DriverNotFoundError::InstallerLeftNoBundle {
                        dir: root.clone(),
                        exit_code: *exit_code,
                    }
                }
                ExtractionOutcome::Bundle(_) => DriverNotFoundError::NoDescriptor {
                    searched: root.clone(),
                },
            });
        };
        info!(
            target: "printdeploy_installer::descriptor",
            "selected {:?} descriptor {}",
            chosen.tier,
            chosen.path.display()
        );
        Ok(DriverDescriptor {
            descriptor_path: chosen.path,
        })
    }

    fn candidates(&self, root: &Path) -> Result<Vec<DescriptorCandidate>, DriverNotFoundError> {
        let mut candidates = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|source| DriverNotFoundError::Walk {
                path: root.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(tier) = entry.file_name().to_str().and_then(|n| self.patterns.classify(n))
            else {
                continue;
            };
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            candidates.push(DescriptorCandidate {
                path: entry.into_path(),
                tier,
                modified,
            });
        }
        Ok(candidates)
    }
}
