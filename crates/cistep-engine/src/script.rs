//! Standalone script execution through the configured interpreter.

use std::path::Path;

use cistep_util::{CancelToken, LogSink, ProcessOutcome, Severity};

use crate::commands;
use crate::error::EngineError;

/// Run `script` with `arguments` from the script's own directory, streaming
/// its output to `sink`.
///
/// # Errors
/// Returns an error if the script does not exist, the interpreter cannot be
/// launched, or `cancel` fires first. A non-zero exit is reported through
/// the returned outcome.
pub fn run_script(
    script: &Path,
    arguments: &str,
    interpreter: &Path,
    sink: &dyn LogSink,
    cancel: &CancelToken,
) -> Result<ProcessOutcome, EngineError> {
    if !script.is_file() {
        return Err(EngineError::Io {
            path: script.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "script not found"),
        });
    }

    // The child starts in the script's directory.
    let script = std::path::absolute(script).map_err(|source| EngineError::Io {
        path: script.display().to_string(),
        source,
    })?;
    let invocation = commands::script(&script, arguments, interpreter);
    sink.log(
        Severity::Info,
        &format!("Running Script: {}", invocation.command_line()),
    );
    let outcome = cistep_util::process::run_streaming(&invocation, sink, cancel)?;
    if !outcome.success {
        sink.log(
            Severity::Warning,
            &format!(
                "Script {} exited with {}",
                script.display(),
                outcome
                    .exit_code
                    .map_or_else(|| "no exit code".to_owned(), |c| format!("code {c}"))
            ),
        );
    }
    Ok(outcome)
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    use cistep_util::MemorySink;

    use super::*;

    fn interpreter(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("fake-pwsh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn script_runs_in_its_own_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let scripts = tmp.path().join("ops");
        fs::create_dir_all(&scripts).unwrap();
        let script = scripts.join("deploy.ps1");
        fs::write(&script, "Write-Host hi").unwrap();
        let pwsh = interpreter(tmp.path(), "pwd\necho \"args:$6 $7\"");

        let sink = MemorySink::new();
        let outcome = run_script(&script, "-Env prod", &pwsh, &sink, &CancelToken::new()).unwrap();

        assert!(outcome.success);
        let normal = sink.messages(Severity::Normal);
        let cwd = fs::canonicalize(&scripts).unwrap();
        assert!(
            normal.iter().any(|l| fs::canonicalize(l).is_ok_and(|p| p == cwd)),
            "{normal:?}"
        );
        assert!(normal.iter().any(|l| l == "args:-Env prod"), "{normal:?}");
    }

    #[test]
    fn failing_script_is_reported_not_raised() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("fail.ps1");
        fs::write(&script, "exit 4").unwrap();
        let pwsh = interpreter(tmp.path(), "exit 4");

        let sink = MemorySink::new();
        let outcome = run_script(&script, "", &pwsh, &sink, &CancelToken::new()).unwrap();

        assert_eq!(outcome.exit_code, Some(4));
        assert!(sink.contains("exited with code 4"));
    }

    #[test]
    fn missing_script_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = MemorySink::new();
        let err = run_script(
            &tmp.path().join("nope.ps1"),
            "",
            Path::new("/bin/sh"),
            &sink,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }
}
