//! Installation prerequisites for a pipeline run: tool executables, the Java
//! runtime, and the scanner and driver libraries reachable through `PATH`.

pub mod check;
pub mod error;
pub mod host;

pub use check::{check_all, verify, Prerequisites, VerificationReport};
pub use error::InstallationError;
pub use host::HostEnvironment;
