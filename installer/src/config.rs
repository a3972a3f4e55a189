//! Deployment configuration.
//!
//! The operator describes a deployment in a TOML file (conventionally
//! `deploy.toml`):
//!
//! ```toml
//! source = "https://vendor.example/drivers/upd-pcl6-x64.zip"
//! expected_sha256 = "3f5c..."
//! driver_name = "HP Universal Printing PCL 6"
//! name_template = "Office Printer {0}"
//! default_printer = 1
//!
//! [printers]
//! 1 = "10.20.30.41"
//! 2 = "10.20.30.42"
//!
//! [network]
//! connect_timeout_secs = 15
//! request_timeout_secs = 600
//! ```
//!
//! The file is deserialised into a raw shape and then validated into a
//! [`DeploymentConfig`]; nothing in the pipeline runs until validation has
//! succeeded.

use crate::artefact::error::ArtefactError;
use crate::artefact::resolver::SourceReference;
use crate::artefact::sha256_digest::{Sha256Digest, parse_expectation};
use crate::descriptor::{DEFAULT_DESCRIPTOR_PATTERN, DescriptorPatterns};
use crate::naming::{NamingTemplate, NamingTemplateError};
use crate::print::ExecutionPolicy;
use crate::provisioner::DeviceMap;
use crate::stager::{DEFAULT_DRIVER_MATCH_PATTERN, DriverSettings};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read configuration {}: {source}", .path.display())]
    Read {
        /// The configuration path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The file is not valid TOML or has the wrong shape.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The source or digest is malformed.
    #[error(transparent)]
    Artefact(#[from] ArtefactError),

    /// A `[printers]` key is not a non-negative integer.
    #[error("printer number \"{key}\" is not a non-negative integer")]
    InvalidPrinterNumber {
        /// The rejected key.
        key: String,
    },

    /// `[printers]` is missing or empty.
    #[error("the [printers] table must list at least one printer")]
    EmptyDeviceMap,

    /// `default_printer` does not name an entry of `[printers]`.
    #[error("default_printer {number} is not listed in [printers]")]
    UnknownDefaultPrinter {
        /// The configured default number.
        number: u32,
    },

    /// `name_template` is malformed.
    #[error("invalid name_template: {0}")]
    InvalidTemplate(#[from] NamingTemplateError),

    /// A glob or regular expression does not compile.
    #[error("invalid {key}: {reason}")]
    InvalidPattern {
        /// The configuration key holding the pattern.
        key: &'static str,
        /// Compiler diagnostics.
        reason: String,
    },

    /// `driver_name` is blank.
    #[error("driver_name must not be empty")]
    EmptyDriverName,

    /// A timeout is zero.
    #[error("{key} must be greater than zero")]
    InvalidTimeout {
        /// The offending key.
        key: &'static str,
    },
}

/// Network timeouts (`[network]`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkSettings {
    /// Seconds allowed for establishing a connection.
    pub connect_timeout_secs: u64,
    /// Seconds allowed for a whole request, body included.
    pub request_timeout_secs: u64,
}

impl NetworkSettings {
    /// Connection timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Whole-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            request_timeout_secs: 600,
        }
    }
}

/// Silent installer fallback (`[installer]`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerSettings {
    /// Arguments passed to a self-extracting package run as an installer.
    /// `{dir}` is replaced by the extraction work directory.
    pub silent_args: Vec<String>,
    /// Seconds the installer may run before it is killed.
    pub timeout_secs: u64,
}

impl InstallerSettings {
    /// Installer timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            silent_args: vec!["/s".to_owned()],
            timeout_secs: 900,
        }
    }
}

/// Platform management commands (`[commands]`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandSettings {
    /// Seconds each `pnputil` or PowerShell invocation may run.
    pub timeout_secs: u64,
    /// Execution policy for PowerShell children.
    pub execution_policy: ExecutionPolicy,
}

impl CommandSettings {
    /// Command timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            execution_policy: ExecutionPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    source: String,
    #[serde(default)]
    expected_sha256: Option<String>,
    driver_name: String,
    #[serde(default)]
    driver_match_pattern: Option<String>,
    #[serde(default)]
    descriptor_pattern: Option<String>,
    name_template: String,
    #[serde(default)]
    default_printer: Option<u32>,
    #[serde(default)]
    staging_dir: Option<PathBuf>,
    #[serde(default)]
    printers: BTreeMap<String, String>,
    #[serde(default)]
    network: NetworkSettings,
    #[serde(default)]
    installer: InstallerSettings,
    #[serde(default)]
    commands: CommandSettings,
}

/// A validated deployment description.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    /// Where the driver package comes from.
    pub source: SourceReference,
    /// Optional digest the package must match.
    pub expected_sha256: Option<Sha256Digest>,
    /// Driver naming hints.
    pub driver: DriverSettings,
    /// Descriptor file name patterns.
    pub descriptor_patterns: DescriptorPatterns,
    /// Printer naming template.
    pub template: NamingTemplate,
    /// Printer number to IPv4 address (validated later, per entry).
    pub printers: DeviceMap,
    /// Printer number to designate as default.
    pub default_printer: Option<u32>,
    /// Explicit staging directory.
    pub staging_dir: Option<PathBuf>,
    /// Network timeouts.
    pub network: NetworkSettings,
    /// Silent installer fallback.
    pub installer: InstallerSettings,
    /// Management command settings.
    pub commands: CommandSettings,
}

impl DeploymentConfig {
    /// Read and validate the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the text is not valid TOML of the expected
    /// shape or fails validation.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text)?;
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        let source = SourceReference::parse(&raw.source)?;
        let expected_sha256 = parse_expectation(raw.expected_sha256.as_deref())?;

        let driver_name = raw.driver_name.trim();
        if driver_name.is_empty() {
            return Err(ConfigError::EmptyDriverName);
        }
        let driver = DriverSettings::new(
            driver_name,
            raw.driver_match_pattern
                .as_deref()
                .unwrap_or(DEFAULT_DRIVER_MATCH_PATTERN),
        )
        .map_err(|e| ConfigError::InvalidPattern {
            key: "driver_match_pattern",
            reason: e.to_string(),
        })?;
        let descriptor_patterns = DescriptorPatterns::new(
            raw.descriptor_pattern
                .as_deref()
                .unwrap_or(DEFAULT_DESCRIPTOR_PATTERN),
        )
        .map_err(|e| ConfigError::InvalidPattern {
            key: "descriptor_pattern",
            reason: e.to_string(),
        })?;
        let template = NamingTemplate::parse(&raw.name_template)?;

        let printers = parse_device_map(raw.printers)?;
        if let Some(number) = raw.default_printer {
            if !printers.contains_key(&number) {
                return Err(ConfigError::UnknownDefaultPrinter { number });
            }
        }

        check_timeout("network.connect_timeout_secs", raw.network.connect_timeout_secs)?;
        check_timeout("network.request_timeout_secs", raw.network.request_timeout_secs)?;
        check_timeout("installer.timeout_secs", raw.installer.timeout_secs)?;
        check_timeout("commands.timeout_secs", raw.commands.timeout_secs)?;

        Ok(Self {
            source,
            expected_sha256,
            driver,
            descriptor_patterns,
            template,
            printers,
            default_printer: raw.default_printer,
            staging_dir: raw.staging_dir,
            network: raw.network,
            installer: raw.installer,
            commands: raw.commands,
        })
    }

    /// Apply command-line overrides for the source and digest.
    ///
    /// An empty digest override disables the integrity check.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Artefact`] when an override is malformed.
    pub fn apply_overrides(
        &mut self,
        source: Option<&str>,
        sha256: Option<&str>,
    ) -> Result<(), ConfigError> {
        if let Some(source) = source {
            self.source = SourceReference::parse(source)?;
        }
        if sha256.is_some() {
            self.expected_sha256 = parse_expectation(sha256)?;
        }
        Ok(())
    }

    /// The staging directory: the configured one, or the default.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(printdeploy_common::default_staging_dir)
    }
}

fn parse_device_map(raw: BTreeMap<String, String>) -> Result<DeviceMap, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::EmptyDeviceMap);
    }
    raw.into_iter()
        .map(|(key, address)| {
            key.trim()
                .parse::<u32>()
                .map(|number| (number, address))
                .map_err(|_| ConfigError::InvalidPrinterNumber { key })
        })
        .collect()
}

fn check_timeout(key: &'static str, secs: u64) -> Result<(), ConfigError> {
    if secs == 0 {
        return Err(ConfigError::InvalidTimeout { key });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const MINIMAL: &str = r#"
source = "https://vendor.example/upd-pcl6.zip"
driver_name = "HP Universal Printing PCL 6"
name_template = "Printer {0}"

[printers]
1 = "10.20.30.41"
"#;

    fn with_extra(extra_top: &str, extra_tables: &str) -> String {
        let (head, tail) = MINIMAL.split_once("[printers]").expect("template");
        format!("{head}{extra_top}\n[printers]{tail}{extra_tables}")
    }

    #[rstest]
    fn minimal_configuration_uses_defaults() {
        let config = DeploymentConfig::from_toml_str(MINIMAL).expect("valid");

        assert_eq!(config.expected_sha256, None);
        assert_eq!(config.printers.get(&1).map(String::as_str), Some("10.20.30.41"));
        assert_eq!(config.network, NetworkSettings::default());
        assert_eq!(config.installer.silent_args, vec!["/s"]);
        assert_eq!(config.commands.timeout(), Duration::from_secs(300));
        assert_eq!(config.commands.execution_policy, ExecutionPolicy::Bypass);
        assert!(config.driver.match_pattern.matches("HP Universal Printing PCL 6 (v7.0.1)"));
    }

    #[rstest]
    fn tables_override_defaults() {
        let text = with_extra(
            "",
            "\n[network]\nconnect_timeout_secs = 5\n\n[installer]\nsilent_args = [\"/s\", \"/f\", \"{dir}\"]\ntimeout_secs = 60\n\n[commands]\nexecution_policy = \"RemoteSigned\"\n",
        );
        let config = DeploymentConfig::from_toml_str(&text).expect("valid");

        assert_eq!(config.network.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.network.request_timeout(), Duration::from_secs(600));
        assert_eq!(config.installer.silent_args, vec!["/s", "/f", "{dir}"]);
        assert_eq!(config.commands.execution_policy, ExecutionPolicy::RemoteSigned);
    }

    #[rstest]
    #[case::blank_digest("expected_sha256 = \"  \"")]
    #[case::absent_digest("")]
    fn blank_digest_disables_check(#[case] extra: &str) {
        let config = DeploymentConfig::from_toml_str(&with_extra(extra, "")).expect("valid");
        assert_eq!(config.expected_sha256, None);
    }

    #[rstest]
    #[case::bad_digest("expected_sha256 = \"abc\"", "invalid SHA-256 digest")]
    #[case::unknown_default("default_printer = 9", "default_printer 9")]
    #[case::bad_glob("driver_match_pattern = \"[\"", "driver_match_pattern")]
    #[case::bad_regex("descriptor_pattern = \"(\"", "descriptor_pattern")]
    #[case::unknown_key("colour = \"mono\"", "unknown field")]
    fn invalid_values_are_rejected(#[case] extra: &str, #[case] message: &str) {
        let err = DeploymentConfig::from_toml_str(&with_extra(extra, "")).expect_err("invalid");
        assert!(
            err.to_string().contains(message),
            "expected \"{message}\" in \"{err}\""
        );
    }

    #[test]
    fn non_numeric_printer_key_is_rejected() {
        let text = MINIMAL.replace("1 = ", "lobby = ");
        let err = DeploymentConfig::from_toml_str(&text).expect_err("invalid");
        assert!(matches!(err, ConfigError::InvalidPrinterNumber { ref key } if key == "lobby"));
    }

    #[test]
    fn empty_device_map_is_rejected() {
        let text = MINIMAL.replace("1 = \"10.20.30.41\"", "");
        let err = DeploymentConfig::from_toml_str(&text).expect_err("invalid");
        assert!(matches!(err, ConfigError::EmptyDeviceMap));
    }

    #[test]
    fn addresses_are_not_validated_at_load_time() {
        let text = MINIMAL.replace("10.20.30.41", "not-an-ip");
        assert!(DeploymentConfig::from_toml_str(&text).is_ok());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let text = with_extra("", "\n[commands]\ntimeout_secs = 0\n");
        let err = DeploymentConfig::from_toml_str(&text).expect_err("invalid");
        assert!(matches!(
            err,
            ConfigError::InvalidTimeout { key: "commands.timeout_secs" }
        ));
    }

    #[test]
    fn overrides_replace_source_and_digest() {
        let mut config = DeploymentConfig::from_toml_str(MINIMAL).expect("valid");
        let digest = "C".repeat(64);

        config
            .apply_overrides(Some("https://mirror.example/upd.exe"), Some(&digest))
            .expect("overrides");

        assert_eq!(config.source.url().as_str(), "https://mirror.example/upd.exe");
        assert_eq!(
            config.expected_sha256.map(|d| d.to_string()),
            Some("c".repeat(64))
        );
    }

    #[test]
    fn load_reports_missing_file() {
        let temp = tempfile::tempdir().expect("temp dir");
        let err = DeploymentConfig::load(&temp.path().join("deploy.toml")).expect_err("missing");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn staging_dir_falls_back_to_default() {
        let config = DeploymentConfig::from_toml_str(MINIMAL).expect("valid");
        assert_eq!(config.staging_dir(), printdeploy_common::default_staging_dir());
    }
}
