//! Error types for cistep-verify.

/// Every prerequisite that failed one verification pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("installation verification failed with {} problem(s):\n{}", failures.len(), failures.iter().map(|f| format!("  - {f}")).collect::<Vec<_>>().join("\n"))]
pub struct InstallationError {
    pub failures: Vec<String>,
}
