//! The stage table and the orchestrator that walks it.
//!
//! A run visits every stage in table order. Each stage either succeeds,
//! fails, or is skipped; what a failure does next is decided by the stage's
//! [`FailurePolicy`].

use std::fmt;
use std::time::{Duration, Instant};

use cistep_config::manifest::TestRunner;
use cistep_config::{FailurePolicy, Manifest};
use cistep_util::{CancelToken, LogSink, ProcessInvocation, ProcessOutcome, Severity};

use crate::clean::clean;
use crate::commands;
use crate::context::{SolutionContext, ToolPaths};
use crate::coverage::discover_coverage;
use crate::error::EngineError;
use crate::resolve::resolve_test_assemblies;
use crate::workers::Workers;

/// One step of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Clean,
    ScanBegin,
    Build,
    RunTests,
    ConvertCoverage,
    ScanEnd,
}

/// Each stage and the stage that follows it.
const TRANSITIONS: [(Stage, Option<Stage>); 6] = [
    (Stage::Clean, Some(Stage::ScanBegin)),
    (Stage::ScanBegin, Some(Stage::Build)),
    (Stage::Build, Some(Stage::RunTests)),
    (Stage::RunTests, Some(Stage::ConvertCoverage)),
    (Stage::ConvertCoverage, Some(Stage::ScanEnd)),
    (Stage::ScanEnd, None),
];

impl Stage {
    pub const FIRST: Stage = Stage::Clean;

    /// The stage after this one, or `None` at the end of the run.
    pub fn next(self) -> Option<Stage> {
        TRANSITIONS
            .iter()
            .find(|(from, _)| *from == self)
            .and_then(|(_, to)| *to)
    }

    /// Every stage, in run order.
    pub fn iter() -> impl Iterator<Item = Stage> {
        std::iter::successors(Some(Self::FIRST), |stage| stage.next())
    }

    /// Name used in `cistep.toml` and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Clean => "clean",
            Stage::ScanBegin => "scan_begin",
            Stage::Build => "build",
            Stage::RunTests => "run_tests",
            Stage::ConvertCoverage => "convert_coverage",
            Stage::ScanEnd => "scan_end",
        }
    }

    /// Human-readable title used in log markers.
    pub fn title(self) -> &'static str {
        match self {
            Stage::Clean => "Cleaning Project Folders",
            Stage::ScanBegin => "Sonar Scanner Begin",
            Stage::Build => "Building Solution",
            Stage::RunTests => "Running Tests",
            Stage::ConvertCoverage => "Converting Coverage Files",
            Stage::ScanEnd => "Sonar Scanner End",
        }
    }

    /// Look a stage up by its name.
    ///
    /// # Errors
    /// Returns `UnknownStage` listing the valid names.
    pub fn from_name(name: &str) -> Result<Stage, EngineError> {
        Self::iter()
            .find(|stage| stage.name() == name)
            .ok_or_else(|| EngineError::UnknownStage {
                name: name.to_owned(),
                expected: Self::iter().map(Stage::name).collect::<Vec<_>>().join(", "),
            })
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Succeeded,
    /// A tool exited unsuccessfully and the stage policy allowed the run to go on.
    Failed { exit_code: Option<i32> },
    /// Listed in `pipeline.skip`, or nothing to do.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    pub elapsed: Duration,
}

/// Outcome of every stage a run visited, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub stages: Vec<StageRecord>,
}

impl PipelineReport {
    /// Whether no stage failed.
    pub fn succeeded(&self) -> bool {
        self.failed().next().is_none()
    }

    /// Stages that failed under the `continue` policy.
    pub fn failed(&self) -> impl Iterator<Item = &StageRecord> {
        self.stages
            .iter()
            .filter(|r| matches!(r.status, StageStatus::Failed { .. }))
    }

    pub fn status_of(&self, stage: Stage) -> Option<StageStatus> {
        self.stages
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| r.status)
    }
}

/// Drives one solution through the stage table.
pub struct Pipeline<'a> {
    context: SolutionContext,
    manifest: Manifest,
    tools: ToolPaths,
    workers: Workers<'a>,
    stage_timeout: Option<Duration>,
}

impl<'a> Pipeline<'a> {
    /// Prepare a run of `context` configured by `manifest`.
    ///
    /// `cancel` is tightened by `pipeline.timeout_secs` when set.
    ///
    /// # Errors
    /// Returns an error if the manifest names an unknown stage, a tool path
    /// cannot be resolved, or the worker pool cannot start.
    pub fn new(
        context: SolutionContext,
        manifest: Manifest,
        sink: &'a dyn LogSink,
        cancel: CancelToken,
    ) -> Result<Self, EngineError> {
        for name in manifest.pipeline.referenced_stages() {
            Stage::from_name(name)?;
        }

        let tools = ToolPaths::resolve(&manifest.tools)?;
        let cancel = match manifest.pipeline.timeout_secs {
            Some(secs) => cancel.with_timeout(Duration::from_secs(secs)),
            None => cancel,
        };
        let workers = Workers::new(manifest.pipeline.max_parallelism, sink, cancel)?;
        let stage_timeout = manifest.pipeline.stage_timeout_secs.map(Duration::from_secs);

        Ok(Self {
            context,
            manifest,
            tools,
            workers,
            stage_timeout,
        })
    }

    /// Replace the resolved tool paths.
    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }

    pub fn context(&self) -> &SolutionContext {
        &self.context
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    /// Run every stage in order.
    ///
    /// # Errors
    /// Returns `StageFailed` when a stage under the `stop` policy fails, or
    /// the first filesystem, resolution, launch, or interruption error.
    pub fn run(&self) -> Result<PipelineReport, EngineError> {
        let mut report = PipelineReport::default();
        for stage in Stage::iter() {
            if self.manifest.pipeline.is_skipped(stage.name()) {
                self.sink()
                    .log(Severity::Info, &format!("Skipping - {}", stage.title()));
                report.stages.push(StageRecord {
                    stage,
                    status: StageStatus::Skipped,
                    elapsed: Duration::ZERO,
                });
                continue;
            }
            report.stages.push(self.run_stage(stage)?);
        }

        tracing::debug!(
            stages = report.stages.len(),
            failed = report.failed().count(),
            "pipeline finished"
        );
        Ok(report)
    }

    /// Run a single stage, applying its failure policy.
    ///
    /// # Errors
    /// See [`Pipeline::run`].
    pub fn run_stage(&self, stage: Stage) -> Result<StageRecord, EngineError> {
        self.workers.check(stage.name())?;

        let sink = self.sink();
        sink.log(Severity::Normal, "");
        sink.log(Severity::Info, &format!("Starting - {}", stage.title()));
        let started = Instant::now();

        let status = match stage {
            Stage::Clean => {
                clean(&self.context.project_directory, &self.workers)?;
                StageStatus::Succeeded
            }
            Stage::ScanBegin => {
                self.launch_one(&commands::scan_begin(&self.context, &self.tools))?
            }
            Stage::Build => self.launch_one(&commands::build(
                &self.context,
                &self.tools,
                &self.manifest.build,
            ))?,
            Stage::RunTests => self.run_tests()?,
            Stage::ConvertCoverage => self.convert_coverage()?,
            Stage::ScanEnd => self.launch_one(&commands::scan_end(&self.context, &self.tools))?,
        };

        if let StageStatus::Failed { exit_code } = status {
            match self.manifest.pipeline.policy_for(stage.name()) {
                FailurePolicy::Stop => {
                    sink.log(
                        Severity::Error,
                        &format!("{} failed{}", stage.title(), describe_exit(exit_code)),
                    );
                    return Err(EngineError::StageFailed {
                        stage: stage.name().to_owned(),
                        exit_code,
                    });
                }
                FailurePolicy::Continue => sink.log(
                    Severity::Warning,
                    &format!(
                        "{} failed{}, continuing",
                        stage.title(),
                        describe_exit(exit_code)
                    ),
                ),
            }
        }

        sink.log(Severity::Info, &format!("Finished - {}", stage.title()));
        sink.log(Severity::Normal, "");

        Ok(StageRecord {
            stage,
            status,
            elapsed: started.elapsed(),
        })
    }

    fn sink(&self) -> &'a dyn LogSink {
        self.workers.sink()
    }

    fn run_tests(&self) -> Result<StageStatus, EngineError> {
        let test = &self.manifest.test;
        let assemblies = match test.runner {
            TestRunner::VsTest => {
                let assemblies =
                    resolve_test_assemblies(&self.context.project_directory, &self.workers)?;
                if assemblies.is_empty() {
                    self.sink().log(
                        Severity::Warning,
                        "No test assemblies found, skipping test run",
                    );
                    return Ok(StageStatus::Skipped);
                }
                assemblies
            }
            TestRunner::DotNet => Default::default(),
        };

        self.launch_one(&commands::run_tests(
            &self.context,
            &self.tools,
            test,
            &self.manifest.build,
            &assemblies,
        ))
    }

    fn convert_coverage(&self) -> Result<StageStatus, EngineError> {
        let artifacts = discover_coverage(&self.context.project_directory)?;
        if artifacts.is_empty() {
            self.sink()
                .log(Severity::Warning, "No coverage files found, nothing to convert");
            return Ok(StageStatus::Skipped);
        }

        let mut status = StageStatus::Succeeded;
        for artifact in &artifacts {
            self.sink().log(
                Severity::Info,
                &format!("Converting coverage for {}", artifact.project_name),
            );
            let invocation =
                artifact.conversion(&self.context.project_directory, &self.tools.code_coverage);
            let outcome = self.launch(&invocation)?;
            if !outcome.success && status == StageStatus::Succeeded {
                status = StageStatus::Failed {
                    exit_code: outcome.exit_code,
                };
            }
        }
        Ok(status)
    }

    fn launch_one(&self, invocation: &ProcessInvocation) -> Result<StageStatus, EngineError> {
        let outcome = self.launch(invocation)?;
        Ok(if outcome.success {
            StageStatus::Succeeded
        } else {
            StageStatus::Failed {
                exit_code: outcome.exit_code,
            }
        })
    }

    fn launch(&self, invocation: &ProcessInvocation) -> Result<ProcessOutcome, EngineError> {
        let sink = self.sink();
        sink.log(
            Severity::Info,
            &format!(
                "Working Directory: {}",
                invocation.working_directory.display()
            ),
        );
        sink.log(
            Severity::Info,
            &format!("Executable: {}", invocation.executable.display()),
        );
        sink.log(
            Severity::Info,
            &format!("Arguments: {}", invocation.arguments),
        );

        let cancel = match self.stage_timeout {
            Some(timeout) => self.workers.cancel().with_timeout(timeout),
            None => self.workers.cancel().clone(),
        };
        let outcome = cistep_util::process::run_streaming(invocation, sink, &cancel)?;
        tracing::debug!(
            executable = %invocation.executable.display(),
            exit_code = ?outcome.exit_code,
            "process exited"
        );
        Ok(outcome)
    }
}

fn describe_exit(exit_code: Option<i32>) -> String {
    match exit_code {
        Some(code) => format!(" with exit code {code}"),
        None => " without an exit code".to_owned(),
    }
}
