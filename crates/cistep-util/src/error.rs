//! Error types for cistep-util.

/// Errors produced by utility functions.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// An I/O operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A glob pattern was invalid.
    #[error("invalid glob pattern `{pattern}`: {message}")]
    GlobPattern { pattern: String, message: String },

    /// A command failed to start.
    #[error("cannot execute {program}: {source}")]
    CommandExec {
        program: String,
        source: std::io::Error,
    },

    /// An argument string could not be split into words.
    #[error("cannot split arguments for {program}: unbalanced quotes in `{arguments}`")]
    InvalidArguments { program: String, arguments: String },

    /// Waiting on a running command failed.
    #[error("cannot wait for {program}: {source}")]
    CommandWait {
        program: String,
        source: std::io::Error,
    },

    /// A command was killed because the run was cancelled or timed out.
    #[error("{program} was interrupted: {reason}")]
    Interrupted { program: String, reason: String },

    /// Cannot determine the user's home directory.
    #[error("cannot determine home directory — set the HOME environment variable")]
    NoHomeDir,
}
