//! The prerequisite checks. Every check runs on every pass; none stops the others.

use std::path::{Path, PathBuf};

use cistep_config::manifest::Verify;

use crate::error::InstallationError;
use crate::host::HostEnvironment;

/// What must be installed before a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prerequisites {
    /// Labelled tool executables that must exist at their configured path.
    pub tools: Vec<(String, PathBuf)>,
    /// Variable naming the Java installation.
    pub java_home_var: String,
    /// Java executable, relative to the Java installation.
    pub java_executable: String,
    /// Executable that must be present in some search-path directory.
    pub path_executable: String,
    /// Libraries that must each be present in some search-path directory.
    pub driver_libraries: Vec<String>,
}

impl Prerequisites {
    /// Combine the manifest's `[verify]` section with the tool list.
    pub fn new<I, L, P>(verify: &Verify, tools: I) -> Self
    where
        I: IntoIterator<Item = (L, P)>,
        L: Into<String>,
        P: AsRef<Path>,
    {
        Self {
            tools: tools
                .into_iter()
                .map(|(label, path)| (label.into(), path.as_ref().to_path_buf()))
                .collect(),
            java_home_var: verify.java_home_var.clone(),
            java_executable: verify.java_executable.clone(),
            path_executable: verify.path_executable.clone(),
            driver_libraries: verify.driver_libraries.clone(),
        }
    }
}

/// Every failure found in one verification pass, in check order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    failures: Vec<String>,
}

impl VerificationReport {
    /// Record the outcome of one check.
    pub fn record(&mut self, failure: Option<String>) {
        if let Some(message) = failure {
            self.failures.push(message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    /// # Errors
    /// Returns every recorded failure when there is at least one.
    pub fn into_result(self) -> Result<(), InstallationError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(InstallationError {
                failures: self.failures,
            })
        }
    }
}

/// Run every check against `host`.
pub fn check_all(prerequisites: &Prerequisites, host: &HostEnvironment) -> VerificationReport {
    let mut report = VerificationReport::default();

    for (label, path) in &prerequisites.tools {
        report.record(check_tool(label, path));
    }
    report.record(check_java_home(
        host,
        &prerequisites.java_home_var,
        &prerequisites.java_executable,
    ));
    report.record(check_in_path(host, &prerequisites.path_executable, "Scanner"));
    for library in &prerequisites.driver_libraries {
        report.record(check_in_path(host, library, "Driver Library"));
    }

    tracing::debug!(
        checks = prerequisites.tools.len() + prerequisites.driver_libraries.len() + 2,
        failures = report.failures.len(),
        "installation verified"
    );
    report
}

/// Run every check and fail with all of them at once.
///
/// # Errors
/// Returns an [`InstallationError`] listing every failed check.
pub fn verify(prerequisites: &Prerequisites, host: &HostEnvironment) -> Result<(), InstallationError> {
    check_all(prerequisites, host).into_result()
}

fn check_tool(label: &str, path: &Path) -> Option<String> {
    if path.is_file() {
        None
    } else {
        Some(format!(
            "{label} Path Verification: The {label} was not found at: {}",
            path.display()
        ))
    }
}

fn check_java_home(host: &HostEnvironment, var: &str, executable: &str) -> Option<String> {
    let Some(home) = host.var(var).filter(|v| !v.trim().is_empty()) else {
        return Some(format!(
            "Java Home Path Verification: The {var} environment variable has not been set"
        ));
    };
    let home = Path::new(home);
    if !home.is_dir() {
        return Some(format!(
            "Java Home Path Verification: The directory {} named by {var} does not exist",
            home.display()
        ));
    }
    if !home.join(executable).is_file() {
        return Some(format!(
            "Java Home Path Verification: {executable} was not found in {}",
            home.display()
        ));
    }
    None
}

fn check_in_path(host: &HostEnvironment, file_name: &str, kind: &str) -> Option<String> {
    match host.find_in_path(file_name) {
        Some(found) => {
            tracing::debug!(path = %found.display(), "found {file_name}");
            None
        }
        None => Some(format!(
            "{kind} Verification: Could not find {file_name} in any of the locations in the \"PATH\" variable"
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::fs;

    use super::*;

    struct Install {
        _tmp: tempfile::TempDir,
        prerequisites: Prerequisites,
        java_home: PathBuf,
        path_dir: PathBuf,
    }

    impl Install {
        fn host(&self) -> HostEnvironment {
            HostEnvironment::from_vars([
                ("JAVA_HOME", self.java_home.to_str().unwrap()),
                ("PATH", self.path_dir.to_str().unwrap()),
            ])
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    /// A complete installation: two tools, a Java home, and every `PATH` entry.
    fn install() -> Install {
        let tmp = tempfile::tempdir().unwrap();
        let tools_dir = tmp.path().join("tools");
        let java_home = tmp.path().join("jdk");
        let path_dir = tmp.path().join("bin");

        touch(&tools_dir.join("msbuild"));
        touch(&tools_dir.join("vstest"));
        touch(&java_home.join("bin").join("java"));
        touch(&path_dir.join("scanner"));
        touch(&path_dir.join("driver7.jar"));
        touch(&path_dir.join("driver8.jar"));

        let verify = Verify {
            java_home_var: "JAVA_HOME".to_owned(),
            java_executable: "bin/java".to_owned(),
            path_executable: "scanner".to_owned(),
            driver_libraries: vec!["driver7.jar".to_owned(), "driver8.jar".to_owned()],
        };
        let msbuild = tools_dir.join("msbuild");
        let vstest = tools_dir.join("vstest");
        let prerequisites = Prerequisites::new(
            &verify,
            [
                ("MS Build Executable", msbuild.as_path()),
                ("Vs Test Console Executable", vstest.as_path()),
            ],
        );

        Install {
            _tmp: tmp,
            prerequisites,
            java_home,
            path_dir,
        }
    }

    #[test]
    fn complete_installation_passes() {
        let install = install();
        assert!(verify(&install.prerequisites, &install.host()).is_ok());
    }

    #[test]
    fn each_missing_item_is_one_line() {
        let install = install();
        fs::remove_file(install.prerequisites.tools[1].1.clone()).unwrap();
        fs::remove_file(install.path_dir.join("scanner")).unwrap();
        fs::remove_file(install.path_dir.join("driver8.jar")).unwrap();

        let report = check_all(&install.prerequisites, &install.host());
        assert_eq!(report.failures().len(), 3, "{:?}", report.failures());
        assert!(report.failures()[0].contains("Vs Test Console Executable"));
        assert!(report.failures()[1].contains("scanner"));
        assert!(report.failures()[2].contains("driver8.jar"));

        let err = report.into_result().unwrap_err();
        let rendered = err.to_string();
        assert_eq!(rendered.lines().count(), 4, "{rendered}");
        assert!(rendered.starts_with("installation verification failed with 3 problem(s):"));
    }

    #[test]
    fn unset_java_home_is_one_failure() {
        let install = install();
        let host = HostEnvironment::from_vars([("PATH", install.path_dir.to_str().unwrap())]);
        let report = check_all(&install.prerequisites, &host);
        assert_eq!(report.failures().len(), 1);
        assert!(report.failures()[0].contains("has not been set"));
    }

    #[test]
    fn missing_java_home_directory_is_one_failure() {
        let install = install();
        fs::remove_dir_all(&install.java_home).unwrap();
        let report = check_all(&install.prerequisites, &install.host());
        assert_eq!(report.failures().len(), 1);
        assert!(report.failures()[0].contains("does not exist"));
    }

    #[test]
    fn missing_java_executable_is_one_failure() {
        let install = install();
        fs::remove_file(install.java_home.join("bin").join("java")).unwrap();
        let report = check_all(&install.prerequisites, &install.host());
        assert_eq!(report.failures().len(), 1);
        assert!(report.failures()[0].contains("bin/java was not found"));
    }

    #[test]
    fn empty_search_path_fails_every_path_check() {
        let install = install();
        let host = HostEnvironment::from_vars([("JAVA_HOME", install.java_home.to_str().unwrap())]);
        let report = check_all(&install.prerequisites, &host);
        assert_eq!(report.failures().len(), 3);
    }
}
