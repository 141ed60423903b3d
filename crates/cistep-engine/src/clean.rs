//! Removal of previous test results, build outputs, and analysis artifacts.

use std::path::{Path, PathBuf};

use cistep_util::Severity;

use crate::error::EngineError;
use crate::workers::Workers;

/// One independent cleanup pass: the directory names it removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sweep {
    pub label: &'static str,
    pub dir_names: &'static [&'static str],
}

/// The three sweeps the clean stage runs side by side.
pub const SWEEPS: [Sweep; 3] = [
    Sweep {
        label: "test results",
        dir_names: &["TestResults"],
    },
    Sweep {
        label: "build outputs",
        dir_names: &["bin", "obj"],
    },
    Sweep {
        label: "analysis artifacts",
        dir_names: &[".sonarqube"],
    },
];

/// What a clean pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanSummary {
    pub removed: Vec<PathBuf>,
}

/// Run every sweep concurrently under `root`, deleting matched directories concurrently.
///
/// The tree is walked once for every sweep's names together, pruning at the
/// first match, so no two deletions ever touch nested paths. Every deletion
/// is attempted even when some fail; failures are reported together once
/// all sweeps finish.
///
/// # Errors
/// Returns `CleanFailed` listing the scan failure, or every directory that
/// could not be removed.
pub fn clean(root: &Path, workers: &Workers<'_>) -> Result<CleanSummary, EngineError> {
    workers.check("clean")?;
    let names: Vec<&str> = SWEEPS
        .iter()
        .flat_map(|sweep| sweep.dir_names.iter().copied())
        .collect();
    let matched = cistep_util::fs::collect_dirs_named(root, &names).map_err(|e| {
        EngineError::CleanFailed {
            failures: vec![format!("cannot scan {}: {e}", root.display())],
        }
    })?;

    let batches: Vec<(&Sweep, Vec<PathBuf>)> = SWEEPS
        .iter()
        .map(|sweep| (sweep, sweep.select(&matched)))
        .collect();
    let results = workers.map_all(&batches, |(sweep, dirs)| run_sweep(sweep, dirs, workers));

    let mut summary = CleanSummary::default();
    let mut failures = Vec::new();
    for (removed, errors) in results {
        summary.removed.extend(removed);
        failures.extend(errors);
    }
    summary.removed.sort();

    if failures.is_empty() {
        Ok(summary)
    } else {
        Err(EngineError::CleanFailed { failures })
    }
}

impl Sweep {
    /// The directories in `matched` whose name belongs to this sweep.
    fn select(&self, matched: &[PathBuf]) -> Vec<PathBuf> {
        matched
            .iter()
            .filter(|dir| {
                dir.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| self.dir_names.contains(&n))
            })
            .cloned()
            .collect()
    }
}

fn run_sweep(sweep: &Sweep, dirs: &[PathBuf], workers: &Workers<'_>) -> (Vec<PathBuf>, Vec<String>) {
    let sink = workers.sink();
    let outcomes = workers.map_all(dirs, |dir| {
        workers.check("clean")?;
        sink.log(
            Severity::Info,
            &format!("Removing Directory: {}", dir.display()),
        );
        cistep_util::fs::remove_dir_all_if_exists(dir)?;
        Ok::<_, EngineError>(dir.clone())
    });

    let mut removed = Vec::new();
    let mut errors = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(dir) => removed.push(dir),
            Err(e) => {
                let message = format!("{} sweep: {e}", sweep.label);
                sink.log(Severity::Error, &message);
                errors.push(message);
            }
        }
    }
    (removed, errors)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::fs;

    use cistep_util::{CancelToken, MemorySink};

    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn removes_every_swept_directory_and_keeps_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("App").join("bin").join("Release").join("App.dll"));
        touch(&root.join("App").join("obj").join("project.assets.json"));
        touch(&root.join("App").join("Program.cs"));
        touch(&root.join("Tests").join("TestResults").join("r1").join("a.coverage"));
        touch(&root.join(".sonarqube").join("conf").join("SonarQubeAnalysisConfig.xml"));

        let sink = MemorySink::new();
        let workers = Workers::new(Some(4), &sink, CancelToken::new()).unwrap();
        let summary = clean(root, &workers).unwrap();

        assert_eq!(summary.removed.len(), 4);
        assert!(!root.join("App").join("bin").exists());
        assert!(!root.join("App").join("obj").exists());
        assert!(!root.join("Tests").join("TestResults").exists());
        assert!(!root.join(".sonarqube").exists());
        assert!(root.join("App").join("Program.cs").exists());
        assert_eq!(sink.messages(Severity::Info).len(), 4);
    }

    #[test]
    fn clean_tree_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("src").join("main.cs"));
        let sink = MemorySink::new();
        let workers = Workers::new(Some(2), &sink, CancelToken::new()).unwrap();
        let summary = clean(tmp.path(), &workers).unwrap();
        assert!(summary.removed.is_empty());
    }

    #[test]
    fn scan_failure_is_one_clean_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("gone");
        let sink = MemorySink::new();
        let workers = Workers::new(Some(2), &sink, CancelToken::new()).unwrap();

        let err = clean(&missing, &workers).unwrap_err();
        assert!(
            matches!(&err, EngineError::CleanFailed { failures } if failures.len() == 1),
            "error was: {err}"
        );
    }

    #[test]
    fn deep_and_nested_matches_never_race() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        for round in 0..10 {
            let mut expected = Vec::new();
            for project in 0..12 {
                let dir = root.join(format!("P{project}"));
                for run in 0..4 {
                    let mut deep = dir.join("TestResults").join(format!("run{run}"));
                    for level in 0..5 {
                        deep = deep.join(format!("d{level}"));
                    }
                    touch(&deep.join("bin").join("a.coverage"));
                }
                touch(&dir.join("bin").join("Debug").join("obj").join("x.dll"));
                touch(&dir.join("obj").join("project.assets.json"));
                expected.extend([dir.join("TestResults"), dir.join("bin"), dir.join("obj")]);
            }
            touch(&root.join(".sonarqube").join("bin").join("SonarScanner.dll"));
            touch(&root.join(".sonarqube").join("out").join("obj").join("0.xml"));
            expected.push(root.join(".sonarqube"));
            expected.sort();

            let sink = MemorySink::new();
            let workers = Workers::new(Some(8), &sink, CancelToken::new()).unwrap();
            let summary = clean(root, &workers)
                .unwrap_or_else(|e| panic!("round {round}: {e}"));
            assert_eq!(summary.removed, expected, "round {round}");
            assert!(!root.join(".sonarqube").exists());
            assert!(!root.join("P0").join("TestResults").exists());
        }
    }

    #[cfg(unix)]
    #[test]
    fn one_failed_removal_does_not_stop_the_others() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("Locked").join("bin").join("App.dll"));
        touch(&root.join("App").join("bin").join("App.dll"));
        touch(&root.join("App").join("obj").join("App.json"));
        touch(&root.join("Tests").join("TestResults").join("r").join("a.trx"));
        touch(&root.join(".sonarqube").join("conf").join("a.xml"));

        let locked = root.join("Locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();
        // Privileged users ignore directory permissions.
        if fs::write(locked.join("write-check"), b"").is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let sink = MemorySink::new();
        let workers = Workers::new(Some(4), &sink, CancelToken::new()).unwrap();
        let result = clean(root, &workers);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        match result {
            Err(EngineError::CleanFailed { failures }) => {
                assert_eq!(failures.len(), 1, "{failures:?}");
                let failure = failures.first().unwrap();
                assert!(failure.starts_with("build outputs sweep:"), "{failure}");
                assert!(failure.contains("Locked"), "{failure}");
            }
            other => panic!("expected CleanFailed, got {other:?}"),
        }
        assert!(!root.join("App").join("bin").exists());
        assert!(!root.join("App").join("obj").exists());
        assert!(!root.join("Tests").join("TestResults").exists());
        assert!(!root.join(".sonarqube").exists());
        assert!(root.join("Locked").join("bin").exists());
        assert_eq!(sink.messages(Severity::Error).len(), 1);
    }
}
