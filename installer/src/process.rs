//! Subprocess execution for the staging utility, PowerShell, and
//! self-extracting installers.
//!
//! Every invocation is bounded by a timeout and runs without a console
//! window on Windows. A child that outlives its timeout is killed and
//! reported as [`std::io::ErrorKind::TimedOut`].

use std::io::{self, Read};
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs `cmd` with `args`, waiting at most `timeout`, and returns the
    /// captured output.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while spawning or waiting for the
    /// command, including [`io::ErrorKind::TimedOut`] when it is killed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use printdeploy_installer::process::{CommandExecutor, SystemCommandExecutor};
    /// use std::time::Duration;
    ///
    /// let executor = SystemCommandExecutor;
    /// let output = executor.run("pnputil.exe", &["/enum-drivers"], Duration::from_secs(60))?;
    /// assert!(output.status.success());
    /// # Ok::<(), std::io::Error>(())
    /// ```
    fn run(&self, cmd: &str, args: &[&str], timeout: Duration) -> io::Result<Output>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, cmd: &str, args: &[&str], timeout: Duration) -> io::Result<Output> {
        let mut command = Command::new(cmd);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        hide_console_window(&mut command);

        let mut child = command.spawn()?;
        // Drain both pipes while waiting so a chatty child cannot block on a
        // full pipe buffer.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let Some(status) = child.wait_timeout(timeout)? else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("{cmd} timed out after {} seconds", timeout.as_secs()),
            ));
        };

        Ok(Output {
            status,
            stdout: collect(stdout)?,
            stderr: collect(stderr)?,
        })
    }
}

type Drain = JoinHandle<io::Result<Vec<u8>>>;

fn drain(mut pipe: impl Read + Send + 'static) -> Drain {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        pipe.read_to_end(&mut buffer)?;
        Ok(buffer)
    })
}

fn collect(handle: Option<Drain>) -> io::Result<Vec<u8>> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| io::Error::other("output reader thread panicked"))?,
        None => Ok(Vec::new()),
    }
}

#[cfg(windows)]
fn hide_console_window(command: &mut Command) {
    use std::os::windows::process::CommandExt;

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    command.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_command: &mut Command) {}

/// Describe an optional exit code for diagnostics.
#[allow(
    clippy::ref_option,
    reason = "called from thiserror format arguments, which pass fields by reference"
)]
pub(crate) fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated without an exit code".to_owned(),
    }
}

/// Condense captured stdout and stderr into one diagnostic string.
pub(crate) fn output_summary(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        stdout.trim().to_owned()
    } else {
        stderr.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{exit_status, failure_output};
    use rstest::rstest;

    #[rstest]
    #[case::with_code(Some(3), "exit code 3")]
    #[case::without_code(None, "terminated without an exit code")]
    fn describe_exit_mentions_code(#[case] code: Option<i32>, #[case] expected: &str) {
        assert_eq!(describe_exit(&code), expected);
    }

    #[test]
    fn output_summary_prefers_stderr() {
        let output = failure_output("access denied");
        assert_eq!(output_summary(&output), "access denied");
    }

    #[test]
    fn output_summary_falls_back_to_stdout() {
        let output = Output {
            status: exit_status(1),
            stdout: b"  Failed to add driver package.  \n".to_vec(),
            stderr: Vec::new(),
        };
        assert_eq!(output_summary(&output), "Failed to add driver package.");
    }

    #[cfg(unix)]
    #[test]
    fn system_executor_reports_exit_code() {
        let output = SystemCommandExecutor
            .run("sh", &["-c", "exit 4"], Duration::from_secs(10))
            .expect("run sh");
        assert_eq!(output.status.code(), Some(4));
    }

    #[cfg(unix)]
    #[test]
    fn system_executor_kills_on_timeout() {
        let err = SystemCommandExecutor
            .run("sleep", &["5"], Duration::from_millis(100))
            .expect_err("expected timeout");
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
