//! Command lines for each external tool the pipeline launches.

use std::collections::BTreeSet;
use std::path::Path;

use cistep_config::manifest::{Build, Test, TestRunner};
use cistep_util::ProcessInvocation;

use crate::context::{SolutionContext, ToolPaths};

/// Scanner `begin`: registers the solution and where test and coverage reports will land.
pub fn scan_begin(ctx: &SolutionContext, tools: &ToolPaths) -> ProcessInvocation {
    let dir = ctx.project_directory.display();
    ProcessInvocation::new(
        &ctx.project_directory,
        &tools.scanner,
        format!(
            "begin /k:\"{name}\" \
             /d:sonar.cs.vstest.reportsPaths=\"{dir}/**/TestResults/**/*.trx\" \
             /d:sonar.cs.vscoveragexml.reportsPaths=\"{dir}/**/TestResults/**/*.coveragexml\"",
            name = ctx.solution_name,
        ),
    )
}

/// Scanner `end`: uploads the analysis.
pub fn scan_end(ctx: &SolutionContext, tools: &ToolPaths) -> ProcessInvocation {
    ProcessInvocation::new(&ctx.project_directory, &tools.scanner, "end")
}

/// Clean rebuild of the whole solution.
pub fn build(ctx: &SolutionContext, tools: &ToolPaths, settings: &Build) -> ProcessInvocation {
    ProcessInvocation::new(
        &ctx.project_directory,
        &tools.msbuild,
        format!(
            "\"{}\" /m:{} /nr:false /r /t:Clean;Rebuild /p:Configuration={}",
            ctx.solution_path.display(),
            settings.max_cpu,
            settings.configuration
        ),
    )
}

/// Test run with code coverage collection.
///
/// `vstest` runs the given quoted assemblies; `dotnet` runs the solution and
/// ignores them.
pub fn run_tests(
    ctx: &SolutionContext,
    tools: &ToolPaths,
    settings: &Test,
    build: &Build,
    assemblies: &BTreeSet<String>,
) -> ProcessInvocation {
    let runsettings = settings
        .runsettings
        .as_deref()
        .map(|file| ctx.project_directory.join(file));

    match settings.runner {
        TestRunner::VsTest => {
            let mut args: Vec<String> = assemblies.iter().cloned().collect();
            args.push(
                "--inIsolation --enablecodecoverage --parallel --collect:\"Code Coverage\" --logger:\"trx\""
                    .to_owned(),
            );
            if let Some(path) = &runsettings {
                args.push(format!("--settings:\"{}\"", path.display()));
            }
            if let Some(filter) = &settings.filter {
                args.push(format!("--testCaseFilter:\"{filter}\""));
            }
            ProcessInvocation::new(&ctx.project_directory, &tools.vstest, args.join(" "))
        }
        TestRunner::DotNet => {
            let mut args = format!(
                "test \"{}\" --configuration {}",
                ctx.solution_path.display(),
                build.configuration
            );
            if let Some(path) = &runsettings {
                args.push_str(&format!(" --settings \"{}\"", path.display()));
            }
            if let Some(filter) = &settings.filter {
                args.push_str(&format!(" --filter \"{filter}\""));
            }
            args.push_str(" --no-build --collect \"Code Coverage\" --logger \"trx\"");
            ProcessInvocation::new(&ctx.project_directory, &tools.dotnet, args)
        }
    }
}

/// Run a script through the configured interpreter, from the script's own directory.
pub fn script(script: &Path, arguments: &str, interpreter: &Path) -> ProcessInvocation {
    let working_directory = script
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut args = format!(
        "-NoProfile -ExecutionPolicy unrestricted -file \"{}\"",
        script.display()
    );
    if !arguments.trim().is_empty() {
        args.push(' ');
        args.push_str(arguments.trim());
    }
    ProcessInvocation::new(working_directory, interpreter, args)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn ctx() -> SolutionContext {
        SolutionContext::from_solution(Path::new("/repos/Movies/Movies.sln")).unwrap()
    }

    fn tools() -> ToolPaths {
        ToolPaths {
            msbuild: PathBuf::from("/t/msbuild"),
            dotnet: PathBuf::from("/t/dotnet"),
            vstest: PathBuf::from("/t/vstest"),
            code_coverage: PathBuf::from("/t/cc"),
            scanner: PathBuf::from("/t/scanner"),
            script_interpreter: PathBuf::from("/t/pwsh"),
        }
    }

    #[test]
    fn scan_begin_names_the_solution_and_report_paths() {
        let inv = scan_begin(&ctx(), &tools());
        assert_eq!(inv.executable, Path::new("/t/scanner"));
        assert_eq!(inv.working_directory, Path::new("/repos/Movies"));
        assert!(inv.arguments.starts_with("begin /k:\"Movies\" "), "{}", inv.arguments);
        assert!(inv
            .arguments
            .contains("/d:sonar.cs.vstest.reportsPaths=\"/repos/Movies/**/TestResults/**/*.trx\""));
        assert!(inv.arguments.ends_with("*.coveragexml\""), "{}", inv.arguments);
    }

    #[test]
    fn build_rebuilds_with_configuration() {
        let inv = build(&ctx(), &tools(), &Build::default());
        assert_eq!(
            inv.arguments,
            "\"/repos/Movies/Movies.sln\" /m:4 /nr:false /r /t:Clean;Rebuild /p:Configuration=Release"
        );
    }

    #[test]
    fn vstest_lists_assemblies_then_options() {
        let assemblies: BTreeSet<String> =
            ["\"/a/A.dll\"".to_owned(), "\"/b/B.dll\"".to_owned()].into_iter().collect();
        let settings = Test {
            runner: TestRunner::VsTest,
            runsettings: Some("CodeCoverage.runsettings".to_owned()),
            filter: Some("Priority != -1".to_owned()),
        };
        let inv = run_tests(&ctx(), &tools(), &settings, &Build::default(), &assemblies);
        assert_eq!(inv.executable, Path::new("/t/vstest"));
        assert_eq!(
            inv.arguments,
            "\"/a/A.dll\" \"/b/B.dll\" --inIsolation --enablecodecoverage --parallel \
             --collect:\"Code Coverage\" --logger:\"trx\" \
             --settings:\"/repos/Movies/CodeCoverage.runsettings\" \
             --testCaseFilter:\"Priority != -1\""
        );
    }

    #[test]
    fn vstest_without_optional_settings() {
        let assemblies: BTreeSet<String> = ["\"/a/A.dll\"".to_owned()].into_iter().collect();
        let inv = run_tests(&ctx(), &tools(), &Test::default(), &Build::default(), &assemblies);
        assert!(!inv.arguments.contains("--settings"));
        assert!(!inv.arguments.contains("--testCaseFilter"));
    }

    #[test]
    fn dotnet_runs_the_solution() {
        let settings = Test {
            runner: TestRunner::DotNet,
            runsettings: Some("CodeCoverage.runsettings".to_owned()),
            filter: None,
        };
        let inv = run_tests(&ctx(), &tools(), &settings, &Build::default(), &BTreeSet::new());
        assert_eq!(inv.executable, Path::new("/t/dotnet"));
        assert_eq!(
            inv.arguments,
            "test \"/repos/Movies/Movies.sln\" --configuration Release \
             --settings \"/repos/Movies/CodeCoverage.runsettings\" \
             --no-build --collect \"Code Coverage\" --logger \"trx\""
        );
    }

    #[test]
    fn scan_end_is_bare() {
        assert_eq!(scan_end(&ctx(), &tools()).arguments, "end");
    }

    #[test]
    fn script_runs_from_its_directory() {
        let inv = script(Path::new("/ops/deploy.ps1"), " -Env prod ", Path::new("/t/pwsh"));
        assert_eq!(inv.working_directory, Path::new("/ops"));
        assert_eq!(
            inv.arguments,
            "-NoProfile -ExecutionPolicy unrestricted -file \"/ops/deploy.ps1\" -Env prod"
        );
    }
}
