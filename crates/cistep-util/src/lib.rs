#![forbid(unsafe_code)]
//! Filesystem scanning, process streaming, logging sinks, and cancellation for cistep.

pub mod cancel;
pub mod error;
pub mod fs;
pub mod log;
pub mod process;

pub use cancel::CancelToken;
pub use error::UtilError;
pub use log::{LogSink, MemorySink, Severity, TracingSink};
pub use process::{ProcessInvocation, ProcessOutcome};
