//! Scenario catalogue loading
//!
//! Catalogues are TOML files with a `[[scenario]]` array, or the builtin
//! catalogue that reproduces the classic file / connection / process
//! walkthrough.
//!
//! # Example vigia.toml
//!
//! ```toml
//! [[scenario]]
//! id = "file-roundtrip"
//! category = "file"
//! path = "/tmp/vigia-test-1"
//! payload = "hello\u0000world"
//!
//! [[scenario]]
//! id = "tcp-bind"
//! category = "network"
//! port = 8080
//!
//! [[scenario]]
//! id = "process-exec"
//! category = "process"
//! executable = "/bin/ls"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use crate::runner::ScenarioRunner;
use crate::scenario::{FileScenario, NetworkScenario, ProcessScenario, Scenario, ScenarioKind};

/// Payload of the builtin file scenario: 35 text bytes, a NUL, then 0xFF
pub const DEFAULT_PAYLOAD: &[u8] = b"This is some data written to a file\0\xFF";
pub const DEFAULT_FILE_PATH: &str = "/tmp/vigia-test-1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_EXECUTABLE: &str = "/bin/ls";

/// Knobs for the builtin catalogue
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinOverrides {
    pub file_path: PathBuf,
    pub port: u16,
    pub executable: PathBuf,
    pub keep_artifacts: bool,
}

impl Default for BuiltinOverrides {
    fn default() -> Self {
        Self {
            file_path: PathBuf::from(DEFAULT_FILE_PATH),
            port: DEFAULT_PORT,
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            keep_artifacts: false,
        }
    }
}

/// Root of a catalogue file
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Catalogue {
    /// Scenarios in run order
    #[serde(default)]
    pub scenario: Vec<Scenario>,
}

impl Catalogue {
    /// Load a catalogue from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content).with_context(|| format!("Invalid catalogue {}", path.display()))
    }

    /// Load a catalogue from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML")
    }

    /// The file / network / process walkthrough
    pub fn builtin(overrides: &BuiltinOverrides) -> Self {
        let mut file = FileScenario::with_bytes(&overrides.file_path, DEFAULT_PAYLOAD);
        file.length = Some(DEFAULT_PAYLOAD.len());
        file.keep = overrides.keep_artifacts;
        let process = ProcessScenario::new(&overrides.executable);

        Self {
            scenario: vec![
                Scenario::new("file-roundtrip", ScenarioKind::File(file)),
                Scenario::new(
                    "tcp-bind",
                    ScenarioKind::Network(NetworkScenario::new(overrides.port)),
                ),
                Scenario::new("process-exec", ScenarioKind::Process(process)),
            ],
        }
    }

    /// Enabled scenarios only
    pub fn enabled_scenarios(&self) -> Vec<&Scenario> {
        self.scenario.iter().filter(|s| s.enabled).collect()
    }

    /// Point every process scenario's stdout/stderr at /dev/null
    pub fn silence_processes(mut self) -> Self {
        for scenario in &mut self.scenario {
            if let ScenarioKind::Process(process) = &mut scenario.kind {
                process.silence_output = true;
            }
        }
        self
    }

    /// Keep only scenarios whose id matches `pattern`, preserving order
    pub fn select(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .with_context(|| format!("Invalid scenario filter regex '{}'", pattern))?;
        self.scenario.retain(|s| regex.is_match(&s.id));
        Ok(self)
    }

    /// Register every enabled scenario; the first configuration error wins
    pub fn into_runner(self) -> Result<ScenarioRunner> {
        let mut runner = ScenarioRunner::new();
        for scenario in self.enabled_scenarios() {
            runner.register(scenario.clone())?;
        }
        Ok(runner)
    }
}
