// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::resources::{ResourceGroup, parse_resource_groups};
use crate::types::PackingStrategy;

/// Top-level suite description as read from a TOML file.
///
/// ```toml
/// [config]
/// parallel_level = 4
/// resource_spec_file = "resources.json"
///
/// [[test]]
/// name = "build"
/// cmd = "make -C build"
///
/// [[test]]
/// name = "gpu_smoke"
/// cmd = "./gpu_smoke.sh"
/// depends = ["build"]
/// resource_groups = "gpus:2"
/// ```
///
/// Deserialization only; see [`ConfigFile`] for the validated form.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Global behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// All tests from `[[test]]`, in declaration order.
    #[serde(default, rename = "test")]
    pub tests: Vec<TestConfig>,
}

/// A validated suite description.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (or the loader), so the
/// rest of the crate can assume unique names and resolvable dependencies.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub tests: Vec<TestConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(config: ConfigSection, tests: Vec<TestConfig>) -> Self {
        Self { config, tests }
    }

    /// Position of the test called `name`, which is also its `TestId`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.tests.iter().position(|t| t.name == name)
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Maximum sum of `processors` over concurrently running tests.
    ///
    /// `None` means serial unless the CLI asks otherwise.
    #[serde(default)]
    pub parallel_level: Option<usize>,

    /// How resource ids are chosen for a test's resource groups.
    #[serde(default)]
    pub packing_strategy: PackingStrategy,

    /// Optional JSON resource spec; without it `resource_groups` are ignored.
    #[serde(default)]
    pub resource_spec_file: Option<PathBuf>,

    /// Start no new tests once one has failed.
    #[serde(default)]
    pub stop_on_failure: bool,

    /// Hold back new tests while the system load average is at or above
    /// this many processors.
    #[serde(default)]
    pub test_load: Option<usize>,

    /// Where cost data, the checkpoint and their lock files live.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// How long to wait for the advisory lock on shared state files.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// Upper bound on how long the control loop waits for a completion
    /// before re-evaluating what can start.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".testsched")
}

fn default_lock_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            parallel_level: None,
            packing_strategy: PackingStrategy::default(),
            resource_spec_file: None,
            stop_on_failure: false,
            test_load: None,
            state_dir: default_state_dir(),
            lock_timeout_secs: default_lock_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ConfigSection {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// `[[test]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TestConfig {
    /// Unique test name.
    pub name: String,

    /// Shell command that runs the test; exit status 0 means pass.
    pub cmd: String,

    /// Concurrency slots consumed while running.
    #[serde(default = "default_processors")]
    pub processors: usize,

    /// Run with nothing else alongside.
    #[serde(default)]
    pub run_serial: bool,

    /// Exclusivity tokens; two tests sharing a token never overlap.
    #[serde(default)]
    pub resource_lock: Vec<String>,

    /// Resource demand in resource-groups syntax, e.g. `"2,gpus:1"`.
    #[serde(default)]
    pub resource_groups: Option<String>,

    /// Tests that must finish before this one starts.
    #[serde(default)]
    pub depends: Vec<String>,

    /// Declared cost; when 0, historical cost data is used instead.
    #[serde(default)]
    pub cost: f64,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Directory to run `cmd` in, relative to the suite file.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
}

fn default_processors() -> usize {
    1
}

impl TestConfig {
    /// Parsed `resource_groups`, empty when the field is absent.
    pub fn parsed_resource_groups(&self) -> Result<Vec<ResourceGroup>, String> {
        match self.resource_groups.as_deref() {
            Some(text) => parse_resource_groups(text),
            None => Ok(Vec::new()),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
