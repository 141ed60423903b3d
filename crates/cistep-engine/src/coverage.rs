//! Coverage file discovery and conversion.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cistep_util::ProcessInvocation;

use crate::error::EngineError;

/// File name pattern of binary coverage results.
pub const COVERAGE_FILE_PATTERN: &str = "*.coverage";

/// One coverage file chosen to represent a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageArtifact {
    pub project_name: String,
    pub coverage_file_path: PathBuf,
}

impl CoverageArtifact {
    /// Where the converted XML report is written: next to the input, with `xml` appended.
    pub fn output_path(&self) -> PathBuf {
        let mut output = self.coverage_file_path.clone().into_os_string();
        output.push("xml");
        PathBuf::from(output)
    }

    /// The converter invocation for this artifact.
    pub fn conversion(&self, working_directory: &Path, converter: &Path) -> ProcessInvocation {
        ProcessInvocation::new(
            working_directory,
            converter,
            format!(
                "analyze /output:\"{}\" \"{}\"",
                self.output_path().display(),
                self.coverage_file_path.display()
            ),
        )
    }
}

/// Name of the project a coverage file belongs to.
///
/// Test runs write `<Project>/TestResults/<run>/<name>.coverage`, so the
/// project is three directories up. Shallower paths fall back to the
/// nearest ancestor.
pub fn project_name_of(coverage_file: &Path) -> String {
    coverage_file
        .ancestors()
        .skip(1)
        .take(3)
        .filter_map(|a| a.file_name())
        .last()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Keep the first file (in path order) for each project.
pub fn dedupe_by_project(coverage_files: &[PathBuf]) -> Vec<CoverageArtifact> {
    let mut by_project: BTreeMap<String, PathBuf> = BTreeMap::new();
    for file in coverage_files {
        by_project
            .entry(project_name_of(file))
            .or_insert_with(|| file.clone());
    }
    by_project
        .into_iter()
        .map(|(project_name, coverage_file_path)| CoverageArtifact {
            project_name,
            coverage_file_path,
        })
        .collect()
}

/// Find every coverage file under `root` and pick one per project.
///
/// # Errors
/// Returns an error if the tree cannot be scanned.
pub fn discover_coverage(root: &Path) -> Result<Vec<CoverageArtifact>, EngineError> {
    let files = cistep_util::fs::collect_files_matching(root, COVERAGE_FILE_PATTERN)?;
    Ok(dedupe_by_project(&files))
}
