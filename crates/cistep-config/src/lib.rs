//! Parse and validate `cistep.toml`.

pub mod manifest;

pub use manifest::{FailurePolicy, Manifest, ManifestError, TestRunner};
