//! CLI argument definitions for printdeploy.
//!
//! The binary only parses these and dispatches; all behaviour lives in the
//! library modules.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Configuration file read when `-c/--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "deploy.toml";

/// Deploy a printer driver package and provision network printers.
#[derive(Parser, Debug)]
#[command(name = "printdeploy")]
#[command(version, about)]
#[command(long_about = concat!(
    "Deploy a printer driver package and provision network printers.\n\n",
    "printdeploy resolves the configured source to a driver package, downloads ",
    "and optionally verifies it, expands it, stages the driver into the driver ",
    "store, and creates one TCP/IP port and one printer per entry of the ",
    "[printers] table. Existing ports and printers are left alone, so repeated ",
    "runs converge on the configuration.\n\n",
    "Every run appends to a transcript log.",
))]
#[command(after_help = concat!(
    "EXIT CODES:\n",
    "  0   success\n",
    "  1   other failure (for example, the transcript cannot be opened)\n",
    "  2   invalid configuration\n",
    "  10  source resolution failed      14  no driver descriptor found\n",
    "  11  download failed               15  driver staging failed\n",
    "  12  integrity check failed        16  provisioning failed\n",
    "  13  extraction failed             17  default printer not found\n\n",
    "EXAMPLES:\n",
    "  Deploy using ./deploy.toml:\n",
    "    > printdeploy\n\n",
    "  Preview the ports and printers without changing anything:\n",
    "    > printdeploy --dry-run\n\n",
    "  Deploy a newer package with its digest:\n",
    "    > printdeploy --source https://vendor.example/upd-7.1.zip --sha256 3f5c...\n\n",
    "  Show what is already in place:\n",
    "    > printdeploy status --json",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Deploy arguments (used when no subcommand is given).
    #[command(flatten)]
    pub deploy: DeployArgs,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Deploy the driver and printers (default when no subcommand given).
    Deploy(DeployArgs),

    /// Report driver, port, and printer state without changing it.
    Status(StatusArgs),
}

/// Arguments for the deploy command.
#[derive(Parser, Debug, Clone, Default)]
pub struct DeployArgs {
    /// Deployment configuration file.
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config: Utf8PathBuf,

    /// Override the configured driver source URL.
    #[arg(long, value_name = "URL")]
    pub source: Option<String>,

    /// Override the expected SHA-256 digest (an empty value skips the check).
    #[arg(long, value_name = "HEX")]
    pub sha256: Option<String>,

    /// Directory for downloads and extraction [default: <temp>/printdeploy].
    #[arg(long, value_name = "DIR")]
    pub staging_dir: Option<Utf8PathBuf>,

    /// Transcript log file [default: platform-specific].
    #[arg(long, value_name = "FILE")]
    pub transcript: Option<Utf8PathBuf>,

    /// Print the derived plan and exit without downloading or changing
    /// anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Increase log verbosity (repeatable: -v, -vv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Only mirror warnings and errors to stderr; the transcript still
    /// records everything.
    #[arg(short, long, conflicts_with = "verbosity")]
    pub quiet: bool,
}

/// Arguments for the status command.
#[derive(Parser, Debug, Clone, Default)]
pub struct StatusArgs {
    /// Deployment configuration file.
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config: Utf8PathBuf,

    /// Output in JSON format for scripting.
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Returns the effective deploy arguments.
    ///
    /// An explicit `deploy` subcommand wins over the flattened top-level
    /// arguments. When `status` is active the flattened defaults are
    /// returned; callers check `self.command` first.
    #[must_use]
    pub fn deploy_args(&self) -> &DeployArgs {
        match &self.command {
            Some(Command::Deploy(args)) => args,
            Some(Command::Status(_)) | None => &self.deploy,
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
