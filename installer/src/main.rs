//! printdeploy CLI entrypoint.
//!
//! Installs the transcript logger, loads the deployment configuration, and
//! dispatches to the deploy pipeline or the status report. The process exit
//! code identifies the failing stage.

use clap::Parser;
use log::{error, info};
use printdeploy_common::{TranscriptLogger, TranscriptOptions, default_transcript_path};
use printdeploy_installer::cli::{Cli, Command, DeployArgs, StatusArgs};
use printdeploy_installer::config::DeploymentConfig;
use printdeploy_installer::error::{DeployError, Result};
use printdeploy_installer::http::UreqHttpClient;
use printdeploy_installer::output::{DryRunPlan, summary_text, write_stderr_line};
use printdeploy_installer::pipeline::{PipelineContext, Platform, run_pipeline};
use printdeploy_installer::print::{PowerShell, PowerShellPrintSubsystem};
use printdeploy_installer::process::SystemCommandExecutor;
use printdeploy_installer::status::run_status;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut stderr = io::stderr();
    let result = match &cli.command {
        Some(Command::Status(args)) => status(args, &mut io::stdout()),
        Some(Command::Deploy(_)) | None => deploy(cli.deploy_args(), &mut stderr),
    };
    ExitCode::from(exit_code_for_run_result(result, &mut stderr))
}

fn deploy(args: &DeployArgs, stderr: &mut dyn Write) -> Result<()> {
    install_transcript(args)?;
    info!(target: "printdeploy_installer", "printdeploy {} starting", env!("CARGO_PKG_VERSION"));

    let mut config = DeploymentConfig::load(args.config.as_std_path())?;
    config.apply_overrides(args.source.as_deref(), args.sha256.as_deref())?;
    let staging_dir = args
        .staging_dir
        .as_ref()
        .map_or_else(|| config.staging_dir(), |dir| dir.clone().into_std_path_buf());

    if args.dry_run {
        write_stderr_line(stderr, DryRunPlan::new(&config, &staging_dir).display_text());
        return Ok(());
    }

    let http = UreqHttpClient::new(&config.network);
    let executor = SystemCommandExecutor;
    let shell = PowerShell::new(
        &executor,
        config.commands.execution_policy,
        config.commands.timeout(),
    );
    let print = PowerShellPrintSubsystem::new(shell);
    let context = PipelineContext {
        config: &config,
        staging_dir: &staging_dir,
    };
    let report = run_pipeline(
        &context,
        Platform {
            http: &http,
            executor: &executor,
            print: &print,
        },
    )?;

    if !args.quiet {
        write_stderr_line(stderr, "");
        write_stderr_line(stderr, summary_text(&report));
    }
    Ok(())
}

fn status(args: &StatusArgs, stdout: &mut dyn Write) -> Result<()> {
    let config = DeploymentConfig::load(args.config.as_std_path())?;
    let executor = SystemCommandExecutor;
    let shell = PowerShell::new(
        &executor,
        config.commands.execution_policy,
        config.commands.timeout(),
    );
    let print = PowerShellPrintSubsystem::new(shell);
    run_status(&config, &print, args.json, stdout)
}

fn install_transcript(args: &DeployArgs) -> Result<()> {
    open_transcript(args)?
        .install()
        .map_err(|e| DeployError::io("cannot start the transcript", io::Error::other(e)))
}

fn open_transcript(args: &DeployArgs) -> Result<TranscriptLogger> {
    let path: PathBuf = match &args.transcript {
        Some(path) => path.clone().into_std_path_buf(),
        None => default_transcript_path().ok_or_else(|| {
            DeployError::io(
                "cannot determine the transcript location",
                io::Error::from(io::ErrorKind::NotFound),
            )
        })?,
    };
    let options = TranscriptOptions::from_verbosity(args.verbosity, args.quiet);
    TranscriptLogger::open(&path, options)
        .map_err(|e| DeployError::io("cannot open the transcript", io::Error::other(e)))
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> u8 {
    match result {
        Ok(()) => {
            info!(target: "printdeploy_installer", "finished: success");
            0
        }
        Err(err) => {
            if log::log_enabled!(target: "printdeploy_installer", log::Level::Error) {
                error!(target: "printdeploy_installer", "{}: {err}", err.kind());
                error!(
                    target: "printdeploy_installer",
                    "finished: failure (exit code {})",
                    err.exit_code()
                );
            } else {
                write_stderr_line(stderr, format!("error: {}: {err}", err.kind()));
            }
            err.exit_code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printdeploy_installer::config::ConfigError;

    #[test]
    fn success_maps_to_zero() {
        let mut stderr = Vec::new();
        assert_eq!(exit_code_for_run_result(Ok(()), &mut stderr), 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn failure_without_logger_is_written_to_stderr() {
        let mut stderr = Vec::new();
        let code = exit_code_for_run_result(
            Err(DeployError::Config(ConfigError::EmptyDeviceMap)),
            &mut stderr,
        );

        assert_eq!(code, 2);
        let text = String::from_utf8(stderr).expect("utf-8");
        assert!(text.starts_with("error: ConfigError:"));
    }

    #[test]
    fn transcript_is_created_at_explicit_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs").join("transcript.log");
        let args = DeployArgs {
            transcript: Some(camino::Utf8PathBuf::from_path_buf(path.clone()).expect("utf-8")),
            ..DeployArgs::default()
        };

        open_transcript(&args).expect("open transcript");
        assert!(path.exists());
    }
}
