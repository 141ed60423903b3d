//! Process execution with line-by-line output streaming.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::UtilError;
use crate::log::{LogSink, Severity};

/// How often a running child is polled for exit and cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A single external command: where to run it, what to run, and its argument string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInvocation {
    /// Directory the child starts in.
    pub working_directory: PathBuf,
    /// Executable path, or a bare name resolved through `PATH`.
    pub executable: PathBuf,
    /// The full argument string, quoted the way a shell would read it.
    pub arguments: String,
}

impl ProcessInvocation {
    pub fn new(
        working_directory: &Path,
        executable: impl Into<PathBuf>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            working_directory: working_directory.to_path_buf(),
            executable: executable.into(),
            arguments: arguments.into(),
        }
    }

    /// The executable and arguments as one printable line.
    pub fn command_line(&self) -> String {
        if self.arguments.is_empty() {
            self.executable.display().to_string()
        } else {
            format!("{} {}", self.executable.display(), self.arguments)
        }
    }
}

/// How a streamed command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Whether the command exited successfully.
    pub success: bool,
    /// The exit code, if the process was not killed by a signal.
    pub exit_code: Option<i32>,
}

/// Run a command, forwarding each stdout line to `sink` as [`Severity::Normal`]
/// and each stderr line as [`Severity::Error`] while the command runs.
///
/// Blocks until the command exits and its output streams close. If `cancel`
/// fires first, the child and every process it started are killed and the
/// call returns without waiting for their output.
///
/// # Errors
/// Returns an error if the argument string cannot be split, the command
/// cannot be spawned (e.g. binary not found), waiting fails, or the run is
/// interrupted. A non-zero exit code is **not** an error; check
/// `ProcessOutcome::success` instead.
pub fn run_streaming(
    invocation: &ProcessInvocation,
    sink: &dyn LogSink,
    cancel: &CancelToken,
) -> Result<ProcessOutcome, UtilError> {
    let program = invocation.executable.display().to_string();

    let mut cmd = Command::new(&invocation.executable);
    cmd.current_dir(&invocation.working_directory)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    apply_arguments(&mut cmd, invocation)?;
    isolate(&mut cmd);

    tracing::debug!(
        cwd = %invocation.working_directory.display(),
        command = %invocation.command_line(),
        "spawning"
    );
    let mut child = cmd.spawn().map_err(|source| UtilError::CommandExec {
        program: program.clone(),
        source,
    })?;

    // Readers are detached: a grandchild holding a pipe open must not
    // keep an interrupted call waiting.
    let (tx, lines) = mpsc::channel();
    if let Some(out) = child.stdout.take() {
        let tx = tx.clone();
        std::thread::spawn(move || forward_lines(out, Severity::Normal, &tx));
    }
    if let Some(err) = child.stderr.take() {
        let tx = tx.clone();
        std::thread::spawn(move || forward_lines(err, Severity::Error, &tx));
    }
    drop(tx);

    let mut exit = None;
    let mut streams_open = true;
    loop {
        if streams_open {
            match lines.recv_timeout(POLL_INTERVAL) {
                Ok((severity, line)) => sink.log(severity, &line),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => streams_open = false,
            }
        } else {
            std::thread::sleep(POLL_INTERVAL);
        }

        if exit.is_none() {
            match child.try_wait() {
                Ok(status) => exit = status,
                Err(source) => {
                    kill_tree(&mut child);
                    return Err(UtilError::CommandWait { program, source });
                }
            }
        }
        if let Some(status) = exit.filter(|_| !streams_open) {
            return Ok(ProcessOutcome {
                success: status.success(),
                exit_code: status.code(),
            });
        }
        if let Some(reason) = cancel.interruption() {
            kill_tree(&mut child);
            return Err(UtilError::Interrupted {
                program,
                reason: reason.to_owned(),
            });
        }
    }
}

/// Start the child in its own process group so the whole tree can be killed.
#[cfg(unix)]
fn isolate(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_cmd: &mut Command) {}

/// Kill the child and everything it started, then reap the child.
fn kill_tree(child: &mut Child) {
    let pid = child.id().to_string();
    #[cfg(unix)]
    let group = format!("-{pid}");
    #[cfg(unix)]
    let killer = Command::new("kill")
        .args(["-KILL", "--", group.as_str()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    #[cfg(not(unix))]
    let killer = Command::new("taskkill")
        .args(["/F", "/T", "/PID", pid.as_str()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if !killer.is_ok_and(|status| status.success()) {
        tracing::debug!(%pid, "process tree kill failed, killing the child only");
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(windows)]
fn apply_arguments(cmd: &mut Command, invocation: &ProcessInvocation) -> Result<(), UtilError> {
    use std::os::windows::process::CommandExt;

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
    // Windows tools parse their own command line; hand it over untouched.
    if !invocation.arguments.trim().is_empty() {
        cmd.raw_arg(&invocation.arguments);
    }
    Ok(())
}

#[cfg(not(windows))]
fn apply_arguments(cmd: &mut Command, invocation: &ProcessInvocation) -> Result<(), UtilError> {
    let words =
        shlex::split(&invocation.arguments).ok_or_else(|| UtilError::InvalidArguments {
            program: invocation.executable.display().to_string(),
            arguments: invocation.arguments.clone(),
        })?;
    cmd.args(words);
    Ok(())
}

fn forward_lines<R: Read>(stream: R, severity: Severity, lines: &Sender<(Severity, String)>) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_owned();
                if lines.send((severity, line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "output stream closed");
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::log::MemorySink;

    fn sh(dir: &Path, script: &str) -> ProcessInvocation {
        ProcessInvocation::new(dir, "sh", format!("-c '{script}'"))
    }

    #[test]
    fn streams_stdout_and_stderr_with_severity() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = MemorySink::new();
        let outcome = run_streaming(
            &sh(tmp.path(), "echo out1; echo err1 >&2; echo out2"),
            &sink,
            &CancelToken::new(),
        )
        .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(
            sink.messages(Severity::Normal),
            vec!["out1".to_owned(), "out2".to_owned()]
        );
        assert_eq!(sink.messages(Severity::Error), vec!["err1".to_owned()]);
    }

    #[test]
    fn non_zero_exit_is_an_outcome_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let outcome = run_streaming(
            &sh(tmp.path(), "exit 3"),
            &MemorySink::new(),
            &CancelToken::new(),
        )
        .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(3));
    }

    #[test]
    fn runs_in_the_working_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = MemorySink::new();
        run_streaming(
            &ProcessInvocation::new(tmp.path(), "pwd", ""),
            &sink,
            &CancelToken::new(),
        )
        .unwrap();
        let printed = sink.messages(Severity::Normal);
        let reported = std::fs::canonicalize(printed.first().unwrap()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(tmp.path()).unwrap());
    }

    #[test]
    fn quoted_arguments_stay_whole() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = MemorySink::new();
        run_streaming(
            &ProcessInvocation::new(tmp.path(), "printf", r#"'%s|' "a b" c"#),
            &sink,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(sink.messages(Severity::Normal), vec!["a b|c|".to_owned()]);
    }

    #[test]
    fn missing_binary_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = run_streaming(
            &ProcessInvocation::new(tmp.path(), "nonexistent_binary_xyz_123", ""),
            &MemorySink::new(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, UtilError::CommandExec { .. }));
        assert!(err.to_string().contains("nonexistent_binary_xyz_123"));
    }

    #[test]
    fn unbalanced_quotes_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = run_streaming(
            &ProcessInvocation::new(tmp.path(), "echo", "\"unterminated"),
            &MemorySink::new(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, UtilError::InvalidArguments { .. }));
    }

    #[test]
    fn deadline_kills_a_hung_child() {
        let tmp = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let err = run_streaming(
            &ProcessInvocation::new(tmp.path(), "sleep", "30"),
            &MemorySink::new(),
            &CancelToken::with_deadline_in(Duration::from_millis(100)),
        )
        .unwrap_err();
        assert!(matches!(err, UtilError::Interrupted { .. }));
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[test]
    fn deadline_kills_grandchildren_holding_the_pipes() {
        let tmp = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let err = run_streaming(
            &sh(tmp.path(), "sleep 6; echo done"),
            &MemorySink::new(),
            &CancelToken::with_deadline_in(Duration::from_millis(200)),
        )
        .unwrap_err();
        assert!(matches!(err, UtilError::Interrupted { .. }));
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn background_writer_is_drained_after_exit() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = MemorySink::new();
        let outcome = run_streaming(
            &sh(tmp.path(), "(sleep 0.3; echo late) & echo early"),
            &sink,
            &CancelToken::new(),
        )
        .unwrap();
        assert!(outcome.success);
        assert_eq!(
            sink.messages(Severity::Normal),
            vec!["early".to_owned(), "late".to_owned()]
        );
    }

    #[test]
    fn command_line_joins_executable_and_arguments() {
        let inv = ProcessInvocation::new(Path::new("/w"), "tool", "end");
        assert_eq!(inv.command_line(), "tool end");
        let bare = ProcessInvocation::new(Path::new("/w"), "tool", "");
        assert_eq!(bare.command_line(), "tool");
    }
}
