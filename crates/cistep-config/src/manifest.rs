use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// File name looked up next to the solution when no `--config` is given.
pub const MANIFEST_FILE: &str = "cistep.toml";

/// The `cistep.toml` pipeline manifest. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub tools: Tools,
    #[serde(default)]
    pub build: Build,
    #[serde(default)]
    pub test: Test,
    #[serde(default)]
    pub pipeline: Pipeline,
    #[serde(default)]
    pub verify: Verify,
}

/// Locations of the external tools the pipeline shells out to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tools {
    #[serde(default = "default_msbuild")]
    pub msbuild: String,
    #[serde(default = "default_dotnet")]
    pub dotnet: String,
    #[serde(default = "default_vstest")]
    pub vstest: String,
    /// Coverage converter. When absent, the NuGet package cache under the
    /// user's home directory is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_coverage: Option<String>,
    /// Static-analysis scanner, resolved through `PATH` unless absolute.
    #[serde(default = "default_scanner")]
    pub scanner: String,
    #[serde(default = "default_script_interpreter")]
    pub script_interpreter: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            msbuild: default_msbuild(),
            dotnet: default_dotnet(),
            vstest: default_vstest(),
            code_coverage: None,
            scanner: default_scanner(),
            script_interpreter: default_script_interpreter(),
        }
    }
}

fn default_msbuild() -> String {
    r"C:\Program Files (x86)\Microsoft Visual Studio\2019\Enterprise\MSBuild\Current\Bin\MSBuild.exe"
        .to_owned()
}

fn default_dotnet() -> String {
    r"C:\Program Files\dotnet\dotnet.exe".to_owned()
}

fn default_vstest() -> String {
    r"C:\Program Files (x86)\Microsoft Visual Studio\2019\Enterprise\Common7\IDE\CommonExtensions\Microsoft\TestWindow\vstest.console.exe"
        .to_owned()
}

fn default_scanner() -> String {
    "SonarScanner.MSBuild.exe".to_owned()
}

fn default_script_interpreter() -> String {
    "powershell.exe".to_owned()
}

/// Settings for the build stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    #[serde(default = "default_configuration")]
    pub configuration: String,
    /// Value of the build tool's `/m:` switch.
    #[serde(default = "default_max_cpu")]
    pub max_cpu: u32,
}

impl Default for Build {
    fn default() -> Self {
        Self {
            configuration: default_configuration(),
            max_cpu: default_max_cpu(),
        }
    }
}

fn default_configuration() -> String {
    "Release".to_owned()
}

fn default_max_cpu() -> u32 {
    4
}

/// Which test runner the test stage drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestRunner {
    /// `vstest.console` over the discovered test assemblies.
    #[default]
    VsTest,
    /// `dotnet test` over the whole solution.
    DotNet,
}

/// Settings for the test stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    #[serde(default)]
    pub runner: TestRunner,
    /// Run-settings file, relative to the solution directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runsettings: Option<String>,
    /// Test case filter expression, e.g. `Priority != -1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// What to do when a stage's tool exits with a non-zero code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Stop,
    Continue,
}

/// Stage sequencing, failure policy, parallelism, and deadlines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Policy for every stage without an entry in `stages`.
    #[serde(default)]
    pub on_failure: FailurePolicy,
    /// Stage names to pass over without running.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip: Vec<String>,
    /// Upper bound on worker threads for filesystem fan-out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallelism: Option<usize>,
    /// Deadline for the whole run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Deadline for any single external process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_timeout_secs: Option<u64>,
    /// Per-stage policy overrides, keyed by stage name (e.g. `scan_end`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stages: BTreeMap<String, FailurePolicy>,
}

impl Pipeline {
    /// The policy that applies to `stage`.
    pub fn policy_for(&self, stage: &str) -> FailurePolicy {
        self.stages.get(stage).copied().unwrap_or(self.on_failure)
    }

    /// Whether `stage` is listed in `skip`.
    pub fn is_skipped(&self, stage: &str) -> bool {
        self.skip.iter().any(|s| s == stage)
    }

    /// Every stage name the manifest refers to, for validation.
    pub fn referenced_stages(&self) -> impl Iterator<Item = &str> {
        self.stages
            .keys()
            .map(String::as_str)
            .chain(self.skip.iter().map(String::as_str))
    }
}

/// Prerequisites checked before the pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verify {
    /// Environment variable naming the Java installation.
    #[serde(default = "default_java_home_var")]
    pub java_home_var: String,
    /// Java executable, relative to the Java home directory.
    #[serde(default = "default_java_executable")]
    pub java_executable: String,
    /// Executable that must be present in some `PATH` directory.
    #[serde(default = "default_path_executable")]
    pub path_executable: String,
    /// Driver libraries that must each be present in some `PATH` directory.
    #[serde(default = "default_driver_libraries")]
    pub driver_libraries: Vec<String>,
}

impl Default for Verify {
    fn default() -> Self {
        Self {
            java_home_var: default_java_home_var(),
            java_executable: default_java_executable(),
            path_executable: default_path_executable(),
            driver_libraries: default_driver_libraries(),
        }
    }
}

fn default_java_home_var() -> String {
    "JAVA_HOME".to_owned()
}

fn default_java_executable() -> String {
    if cfg!(windows) {
        "bin/java.exe".to_owned()
    } else {
        "bin/java".to_owned()
    }
}

fn default_path_executable() -> String {
    default_scanner()
}

fn default_driver_libraries() -> Vec<String> {
    vec![
        "mssql-jdbc-6.2.2.jre7.jar".to_owned(),
        "mssql-jdbc-6.2.2.jre8.jar".to_owned(),
    ]
}

impl Manifest {
    /// Read and parse a `cistep.toml` from the given path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or contains invalid TOML.
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let manifest: Manifest = toml::from_str(&content).map_err(|e| ManifestError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(manifest)
    }

    /// Read `path` if it exists, otherwise return the defaults.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_path_or_default(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_path(path)
    }

    /// Render the manifest as TOML, e.g. to show effective settings.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ManifestError> {
        toml::to_string_pretty(self).map_err(|e| ManifestError::Serialize { source: e })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid cistep.toml at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("cannot serialize manifest: {source}")]
    Serialize { source: toml::ser::Error },
}
