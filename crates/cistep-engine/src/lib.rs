//! Pipeline orchestration for a .NET solution: cleaning, test discovery,
//! coverage conversion, and the stage table that drives external tools.

pub mod classify;
pub mod clean;
pub mod commands;
pub mod context;
pub mod coverage;
pub mod error;
pub mod pipeline;
pub mod resolve;
pub mod script;
pub mod workers;

pub use classify::{classify, ProjectDescriptor};
pub use clean::{clean, CleanSummary};
pub use context::{SolutionContext, ToolPaths};
pub use coverage::{discover_coverage, CoverageArtifact};
pub use error::EngineError;
pub use pipeline::{Pipeline, PipelineReport, Stage, StageRecord, StageStatus};
pub use resolve::{discover_test_projects, resolve_test_assemblies};
pub use script::run_script;
pub use workers::Workers;
