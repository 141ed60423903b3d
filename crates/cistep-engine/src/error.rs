//! Error types for cistep-engine.

/// Errors produced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A filesystem operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A utility operation failed.
    #[error("{0}")]
    Util(#[from] cistep_util::error::UtilError),

    /// The solution path has no parent directory or no file stem.
    #[error("invalid solution path {path} — expected a path to a solution file")]
    InvalidSolutionPath { path: String },

    /// A project file is not well-formed XML.
    #[error("cannot parse project file {path}: {message}")]
    ProjectFile { path: String, message: String },

    /// A test project has no built assembly.
    #[error("no built assembly named `{assembly}` for test project {project} under {search_dir} — build the solution first")]
    AssemblyNotFound {
        project: String,
        assembly: String,
        search_dir: String,
    },

    /// A test project matches more than one built assembly.
    #[error("test project {project} matches {} assemblies named `{assembly}`: {}", candidates.len(), candidates.join(", "))]
    AmbiguousAssembly {
        project: String,
        assembly: String,
        candidates: Vec<String>,
    },

    /// The manifest names a stage that does not exist.
    #[error("unknown stage `{name}` in cistep.toml — expected one of: {expected}")]
    UnknownStage { name: String, expected: String },

    /// A stage's tool exited unsuccessfully under the `stop` policy.
    #[error("stage `{stage}` failed{} — set `pipeline.stages.{stage} = \"continue\"` to keep going", exit_code.map(|c| format!(" with exit code {c}")).unwrap_or_default())]
    StageFailed {
        stage: String,
        exit_code: Option<i32>,
    },

    /// One or more directories could not be removed.
    #[error("cannot clean {} director{}:\n{}", failures.len(), if failures.len() == 1 { "y" } else { "ies" }, failures.join("\n"))]
    CleanFailed { failures: Vec<String> },

    /// The run was cancelled or passed its deadline.
    #[error("{operation} was interrupted: {reason}")]
    Interrupted { operation: String, reason: String },

    /// The worker pool could not be created.
    #[error("cannot start worker pool: {message}")]
    WorkerPool { message: String },
}
