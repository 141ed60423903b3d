#![forbid(unsafe_code)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cistep_config::manifest::MANIFEST_FILE;
use cistep_config::Manifest;
use cistep_engine::{Pipeline, SolutionContext, Stage, StageStatus, ToolPaths, Workers};
use cistep_util::{CancelToken, TracingSink};
use cistep_verify::{HostEnvironment, Prerequisites};

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(
    name = "cistep",
    about = "Clean, build, test, and analyze a .NET solution in one pass"
)]
#[command(version)]
struct Cli {
    /// Path to cistep.toml (defaults to the one next to the solution)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a cistep.toml with every default spelled out
    Init {
        /// Directory to write into
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Check that every required tool and library is installed
    Verify,
    /// Run the full pipeline against a solution
    Run {
        /// Path to the solution file
        solution: PathBuf,
        /// Skip the installation check before running
        #[arg(long)]
        skip_verify: bool,
    },
    /// Remove test results, build outputs, and analysis artifacts
    Clean {
        /// Path to the solution file
        solution: PathBuf,
    },
    /// List the test assemblies the test stage would run
    Discover {
        /// Path to the solution file
        solution: PathBuf,
    },
    /// Run a script through the configured interpreter
    Script {
        /// Path to the script
        script: PathBuf,
        /// Arguments passed to the script
        #[arg(last = true)]
        args: Vec<String>,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let result = match cli.command {
        Command::Init { dir, force } => cmd_init(&dir, force),
        Command::Verify => cmd_verify(config),
        Command::Run {
            solution,
            skip_verify,
        } => cmd_run(&solution, config, skip_verify),
        Command::Clean { solution } => cmd_clean(&solution, config),
        Command::Discover { solution } => cmd_discover(&solution, config),
        Command::Script { script, args } => cmd_script(&script, &args, config),
    };

    if let Err(msg) = result {
        eprintln!("error: {msg}");
        process::exit(1);
    }
}

/// Log to stderr; `RUST_LOG` overrides the default `info` level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

/// Load `--config` if given, else `cistep.toml` in `dir`, else defaults.
fn load_manifest(config: Option<&Path>, dir: &Path) -> Result<Manifest, Box<dyn Error>> {
    let manifest = match config {
        Some(path) => Manifest::from_path(path)?,
        None => Manifest::from_path_or_default(&dir.join(MANIFEST_FILE))?,
    };
    Ok(manifest)
}

fn solution_context(solution: &Path) -> Result<SolutionContext, Box<dyn Error>> {
    if !solution.is_file() {
        return Err(format!("solution file {} does not exist", solution.display()).into());
    }
    Ok(SolutionContext::from_solution(solution)?)
}

fn cmd_init(dir: &Path, force: bool) -> CliResult {
    let path = dir.join(MANIFEST_FILE);
    if path.exists() && !force {
        return Err(format!(
            "{} already exists — pass --force to overwrite it",
            path.display()
        )
        .into());
    }
    let content = Manifest::default().to_toml()?;
    std::fs::write(&path, content)
        .map_err(|e| format!("cannot write {}: {e}", path.display()))?;
    eprintln!("    Created {}", path.display());
    Ok(())
}

fn cmd_verify(config: Option<&Path>) -> CliResult {
    let cwd = std::env::current_dir()?;
    let manifest = load_manifest(config, &cwd)?;
    verify_installation(&manifest)
}

/// Run every installation check and fail with all missing items at once.
fn verify_installation(manifest: &Manifest) -> CliResult {
    let tools = ToolPaths::resolve(&manifest.tools)?;
    let prerequisites = Prerequisites::new(&manifest.verify, tools.required());
    match cistep_verify::verify(&prerequisites, &HostEnvironment::from_process()) {
        Ok(()) => {
            eprintln!("  [ok] All prerequisites found");
            Ok(())
        }
        Err(err) => {
            eprintln!("  [!!] Installation incomplete; pass --skip-verify to run anyway");
            Err(err.into())
        }
    }
}

fn cmd_run(solution: &Path, config: Option<&Path>, skip_verify: bool) -> CliResult {
    let context = solution_context(solution)?;
    let manifest = load_manifest(config, &context.project_directory)?;
    if !skip_verify {
        verify_installation(&manifest)?;
    }

    let sink = TracingSink;
    let pipeline = Pipeline::new(context, manifest, &sink, CancelToken::new())?;
    let report = pipeline.run()?;

    eprintln!();
    for record in &report.stages {
        let status = match record.status {
            StageStatus::Succeeded => "ok".to_owned(),
            StageStatus::Skipped => "skipped".to_owned(),
            StageStatus::Failed { exit_code } => match exit_code {
                Some(code) => format!("failed (exit code {code})"),
                None => "failed".to_owned(),
            },
        };
        eprintln!(
            "  {:<18} {status} in {:.2}s",
            record.stage.name(),
            record.elapsed.as_secs_f64()
        );
    }

    let failed = report.failed().count();
    if failed > 0 {
        return Err(format!("{failed} stage(s) failed").into());
    }
    eprintln!("    Finished {}", pipeline.context().solution_name);
    Ok(())
}

fn cmd_clean(solution: &Path, config: Option<&Path>) -> CliResult {
    let context = solution_context(solution)?;
    let manifest = load_manifest(config, &context.project_directory)?;
    let sink = TracingSink;
    let pipeline = Pipeline::new(context, manifest, &sink, CancelToken::new())?;
    pipeline.run_stage(Stage::Clean)?;
    eprintln!("    Cleaned {}", pipeline.context().project_directory.display());
    Ok(())
}

fn cmd_discover(solution: &Path, config: Option<&Path>) -> CliResult {
    let context = solution_context(solution)?;
    let manifest = load_manifest(config, &context.project_directory)?;
    let sink = TracingSink;
    let workers = Workers::new(manifest.pipeline.max_parallelism, &sink, CancelToken::new())?;
    let assemblies =
        cistep_engine::resolve_test_assemblies(&context.project_directory, &workers)?;
    for assembly in &assemblies {
        println!("{assembly}");
    }
    Ok(())
}

fn cmd_script(script: &Path, args: &[String], config: Option<&Path>) -> CliResult {
    let cwd = std::env::current_dir()?;
    let manifest = load_manifest(config, &cwd)?;
    let tools = ToolPaths::resolve(&manifest.tools)?;
    let arguments = script_arguments(args)?;
    let sink = TracingSink;
    let outcome = cistep_engine::run_script(
        script,
        &arguments,
        &tools.script_interpreter,
        &sink,
        &CancelToken::new(),
    )?;
    if !outcome.success {
        let code = outcome
            .exit_code
            .map_or_else(|| "no exit code".to_owned(), |c| format!("exit code {c}"));
        return Err(format!("script {} failed with {code}", script.display()).into());
    }
    Ok(())
}

/// Join script arguments into one string, quoting each so its boundaries survive.
fn script_arguments(args: &[String]) -> Result<String, Box<dyn Error>> {
    shlex::try_join(args.iter().map(String::as_str))
        .map_err(|e| format!("cannot pass script arguments {args:?}: {e}").into())
}
