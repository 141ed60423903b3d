//! Per-run context: the solution being driven and the tools that drive it.

use std::path::{Path, PathBuf};

use cistep_config::manifest::Tools;

use crate::error::EngineError;

/// Coverage converter location inside the NuGet package cache, relative to the user's home.
const CODE_COVERAGE_PACKAGE_PATH: &str =
    ".nuget/packages/microsoft.codecoverage/15.9.0/build/netstandard1.0/CodeCoverage/CodeCoverage.exe";

/// The solution a pipeline run operates on. Derived once, then only read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionContext {
    /// Path to the solution file.
    pub solution_path: PathBuf,
    /// Directory containing the solution file; every stage runs here.
    pub project_directory: PathBuf,
    /// Solution file name without extension.
    pub solution_name: String,
}

impl SolutionContext {
    /// Derive the context from a solution file path.
    ///
    /// # Errors
    /// Returns an error if the path has no parent directory or no file stem.
    pub fn from_solution(solution_path: &Path) -> Result<Self, EngineError> {
        let invalid = || EngineError::InvalidSolutionPath {
            path: solution_path.display().to_string(),
        };

        let solution_name = solution_path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(invalid)?
            .to_owned();

        let parent = solution_path.parent().ok_or_else(invalid)?;
        // A bare file name has an empty parent: the current directory.
        let project_directory = if parent.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            parent.to_path_buf()
        };

        Ok(Self {
            solution_path: solution_path.to_path_buf(),
            project_directory,
            solution_name,
        })
    }
}

/// Resolved executable paths for every tool a stage can launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub msbuild: PathBuf,
    pub dotnet: PathBuf,
    pub vstest: PathBuf,
    pub code_coverage: PathBuf,
    pub scanner: PathBuf,
    pub script_interpreter: PathBuf,
}

impl ToolPaths {
    /// Resolve tool paths from the manifest.
    ///
    /// The coverage converter defaults to the NuGet package cache under the
    /// user's home directory.
    ///
    /// # Errors
    /// Returns an error if the coverage converter is not configured and the
    /// home directory cannot be determined.
    pub fn resolve(tools: &Tools) -> Result<Self, EngineError> {
        let code_coverage = match &tools.code_coverage {
            Some(path) => PathBuf::from(path),
            None => cistep_util::fs::user_home()?.join(CODE_COVERAGE_PACKAGE_PATH),
        };

        Ok(Self {
            msbuild: PathBuf::from(&tools.msbuild),
            dotnet: PathBuf::from(&tools.dotnet),
            vstest: PathBuf::from(&tools.vstest),
            code_coverage,
            scanner: PathBuf::from(&tools.scanner),
            script_interpreter: PathBuf::from(&tools.script_interpreter),
        })
    }

    /// The tools whose configured path must exist before a run, with labels.
    pub fn required(&self) -> Vec<(&'static str, &Path)> {
        vec![
            ("MS Build Executable", self.msbuild.as_path()),
            ("Dot Net Executable", self.dotnet.as_path()),
            ("Vs Test Console Executable", self.vstest.as_path()),
            ("Code Coverage Executable", self.code_coverage.as_path()),
        ]
    }
}
