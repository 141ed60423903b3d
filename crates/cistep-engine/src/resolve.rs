//! Test project discovery: find project files, classify them, and map each
//! test project to exactly one built assembly.
//!
//! Classification and assembly lookup both fan out over the worker pool.
//! The result is an unordered set: the test runner accepts assemblies in any
//! order.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use cistep_util::Severity;

use crate::classify::{classify, ProjectDescriptor};
use crate::error::EngineError;
use crate::workers::Workers;

/// File name pattern of project files.
pub const PROJECT_FILE_PATTERN: &str = "*.csproj";

/// Directory under each project that holds its build outputs.
pub const BUILD_OUTPUT_DIR: &str = "bin";

/// Assembly extensions, in order of preference.
pub const ASSEMBLY_EXTENSIONS: &[&str] = &["dll", "exe"];

/// Classify every project file under `root`.
///
/// # Errors
/// Returns an error if the tree cannot be scanned or any project file cannot
/// be read or parsed.
pub fn discover_projects(
    root: &Path,
    workers: &Workers<'_>,
) -> Result<Vec<ProjectDescriptor>, EngineError> {
    let project_files = cistep_util::fs::collect_files_matching(root, PROJECT_FILE_PATTERN)?;
    workers.try_map("project classification", &project_files, |path| classify(path))
}

/// Classify every project file under `root` and keep the test projects.
///
/// # Errors
/// See [`discover_projects`].
pub fn discover_test_projects(
    root: &Path,
    workers: &Workers<'_>,
) -> Result<Vec<ProjectDescriptor>, EngineError> {
    let mut projects = discover_projects(root, workers)?;
    projects.retain(|p| p.is_test_project);
    Ok(projects)
}

/// Find the single built assembly of `project` under its `bin` directory.
///
/// An assembly matches when its file stem equals the assembly name (ignoring
/// case). Extensions are tried in [`ASSEMBLY_EXTENSIONS`] order and the first
/// one with any match decides.
///
/// # Errors
/// Returns `AssemblyNotFound` when nothing matches and `AmbiguousAssembly`
/// when more than one file matches.
pub fn find_test_assembly(project: &ProjectDescriptor) -> Result<PathBuf, EngineError> {
    let search_dir = project.project_dir().join(BUILD_OUTPUT_DIR);

    let mut candidates = Vec::new();
    if search_dir.is_dir() {
        for extension in ASSEMBLY_EXTENSIONS {
            candidates = cistep_util::fs::collect_files(&search_dir, extension)?
                .into_iter()
                .filter(|path| stem_matches(path, &project.assembly_name))
                .collect();
            if !candidates.is_empty() {
                break;
            }
        }
    }

    let mut matches = candidates.into_iter();
    match (matches.next(), matches.next()) {
        (Some(only), None) => Ok(only),
        (None, _) => Err(EngineError::AssemblyNotFound {
            project: project.file_path.display().to_string(),
            assembly: project.assembly_name.clone(),
            search_dir: search_dir.display().to_string(),
        }),
        (Some(first), Some(second)) => {
            Err(EngineError::AmbiguousAssembly {
                project: project.file_path.display().to_string(),
                assembly: project.assembly_name.clone(),
                candidates: [first, second]
                    .into_iter()
                    .chain(matches)
                    .map(|p| p.display().to_string())
                    .collect(),
            })
        }
    }
}

/// Resolve the quoted paths of every test assembly under `root`.
///
/// # Errors
/// Returns an error if discovery fails or any test project does not resolve
/// to exactly one assembly.
pub fn resolve_test_assemblies(
    root: &Path,
    workers: &Workers<'_>,
) -> Result<BTreeSet<String>, EngineError> {
    let sink = workers.sink();
    sink.log(Severity::Normal, "");
    sink.log(Severity::Info, "Starting - Discovering Test Projects");

    let test_projects = discover_test_projects(root, workers)?;
    let assemblies = workers.try_map("test assembly lookup", &test_projects, |project| {
        let assembly = find_test_assembly(project)?;
        sink.log(
            Severity::Info,
            &format!("Found Test Project: {}", assembly.display()),
        );
        Ok(quote(&assembly))
    })?;
    let resolved: BTreeSet<String> = assemblies.into_iter().collect();

    sink.log(Severity::Normal, "");
    sink.log(
        Severity::Info,
        &format!("{} Test Project(s) Found", resolved.len()),
    );
    sink.log(Severity::Info, "Finished - Discovering Test Projects");
    sink.log(Severity::Normal, "");
    Ok(resolved)
}

/// Wrap a path in double quotes so embedded spaces survive the command line.
pub fn quote(path: &Path) -> String {
    format!("\"{}\"", path.display())
}

fn stem_matches(path: &Path, assembly_name: &str) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.eq_ignore_ascii_case(assembly_name))
}
