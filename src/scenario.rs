//! Scenario catalogue entries
//!
//! A scenario is a named, declarative description of one OS interaction.
//! Scenarios are plain data: the runner dispatches on [`ScenarioKind`] and the
//! matching probe does the work.
//!
//! # Example TOML
//!
//! ```toml
//! [[scenario]]
//! id = "file-roundtrip"
//! category = "file"
//! path = "/tmp/vigia-test-1"
//! payload_hex = "546869732069732073..."
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

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

/// Scenario category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// File lifecycle: open, write, close, reopen, read, close
    File,
    /// Socket lifecycle: resolve, socket, bind, close
    Network,
    /// Process lifecycle: fork, exec, wait
    Process,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::File => "file",
            Category::Network => "network",
            Category::Process => "process",
        }
    }

    /// Syscalls an observer should expect to see while this category runs
    ///
    /// Names are the x86_64 Linux ones; libc may pick a sibling (e.g. `clone`
    /// for `fork`, `openat` for `open`).
    pub fn syscalls(self) -> &'static [&'static str] {
        match self {
            Category::File => &["openat", "write", "read", "fstat", "close", "unlink"],
            Category::Network => &["socket", "bind", "close"],
            Category::Process => &["clone", "pipe2", "execve", "read", "wait4", "close"],
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One catalogue entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    /// Unique identifier within the catalogue
    pub id: String,

    /// Category tag and its parameters
    #[serde(flatten)]
    pub kind: ScenarioKind,

    /// If false, the loader drops this scenario before registration
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Category-specific parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum ScenarioKind {
    File(FileScenario),
    Network(NetworkScenario),
    Process(ProcessScenario),
}

impl ScenarioKind {
    pub fn category(&self) -> Category {
        match self {
            ScenarioKind::File(_) => Category::File,
            ScenarioKind::Network(_) => Category::Network,
            ScenarioKind::Process(_) => Category::Process,
        }
    }
}

impl Scenario {
    pub fn new(id: impl Into<String>, kind: ScenarioKind) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: true,
        }
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }

    /// Check parameters without touching the OS
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.id.trim().is_empty() {
            return Err(HarnessError::Configuration(
                "scenario id must not be empty".to_string(),
            ));
        }

        let result = match &self.kind {
            ScenarioKind::File(file) => file.validate(),
            ScenarioKind::Network(_) => Ok(()),
            ScenarioKind::Process(process) => process.validate(),
        };

        result.map_err(|err| match err {
            HarnessError::Configuration(msg) => {
                HarnessError::Configuration(format!("scenario '{}': {}", self.id, msg))
            }
            other => other,
        })
    }
}

/// Write a payload, read it back, compare
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileScenario {
    /// Scratch file path; callers keep it unique across concurrent harnesses
    pub path: PathBuf,

    /// Payload as text (TOML escapes such as `\u0000` allowed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,

    /// Payload as hex, for bytes that are not valid UTF-8
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_hex: Option<String>,

    /// Declared byte count; defaults to the full payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,

    /// Open an independent O_RDWR|O_TRUNC handle while writing
    #[serde(default = "default_true")]
    pub second_handle: bool,

    /// Leave the file on disk afterwards
    #[serde(default)]
    pub keep: bool,
}

impl FileScenario {
    /// Scenario over raw bytes; the payload is stored as hex
    pub fn with_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> Self {
        Self {
            path: path.into(),
            payload: None,
            payload_hex: Some(hex::encode(bytes)),
            length: None,
            second_handle: true,
            keep: false,
        }
    }

    /// Decoded payload bytes
    pub fn payload_bytes(&self) -> Result<Vec<u8>, HarnessError> {
        match (&self.payload, &self.payload_hex) {
            (Some(text), None) => Ok(text.as_bytes().to_vec()),
            (None, Some(encoded)) => hex::decode(encoded.trim()).map_err(|e| {
                HarnessError::Configuration(format!("invalid payload_hex: {}", e))
            }),
            (Some(_), Some(_)) => Err(HarnessError::Configuration(
                "payload and payload_hex are mutually exclusive".to_string(),
            )),
            (None, None) => Err(HarnessError::Configuration(
                "one of payload or payload_hex is required".to_string(),
            )),
        }
    }

    /// The prefix of the payload that is written and read back
    pub fn declared_payload(&self) -> Result<Vec<u8>, HarnessError> {
        let mut bytes = self.payload_bytes()?;
        if let Some(length) = self.length {
            if length > bytes.len() {
                return Err(HarnessError::Configuration(format!(
                    "declared length {} exceeds payload length {}",
                    length,
                    bytes.len()
                )));
            }
            bytes.truncate(length);
        }
        Ok(bytes)
    }

    fn validate(&self) -> Result<(), HarnessError> {
        if self.path.as_os_str().is_empty() {
            return Err(HarnessError::Configuration(
                "file path must not be empty".to_string(),
            ));
        }
        self.declared_payload().map(|_| ())
    }
}

/// Resolver family hint
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AddressFamily {
    #[default]
    Ipv4,
    Ipv6,
    Any,
}

/// What a bind attempt is expected to produce
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BindExpectation {
    /// Some candidate must accept the bind
    #[default]
    Bound,
    /// Every candidate must refuse the bind
    Unavailable,
}

/// Resolve candidates and bind the first one that accepts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkScenario {
    /// Service port
    pub port: u16,

    /// Node to resolve; resolver default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default)]
    pub family: AddressFamily,

    /// Ask for wildcard addresses (AI_PASSIVE)
    #[serde(default)]
    pub passive: bool,

    #[serde(default)]
    pub expect: BindExpectation,

    /// Rebind the same address after closing to prove the port was released
    #[serde(default = "default_true")]
    pub verify_rebind: bool,
}

impl NetworkScenario {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            host: None,
            family: AddressFamily::default(),
            passive: false,
            expect: BindExpectation::default(),
            verify_rebind: true,
        }
    }
}

/// Fork, replace the child image, wait
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessScenario {
    /// Absolute path of the program the child executes
    pub executable: PathBuf,

    #[serde(default)]
    pub expected_exit_code: i32,

    /// Point the child's stdout/stderr at /dev/null
    #[serde(default)]
    pub silence_output: bool,
}

impl ProcessScenario {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            expected_exit_code: 0,
            silence_output: false,
        }
    }

    fn validate(&self) -> Result<(), HarnessError> {
        if !self.executable.is_absolute() {
            return Err(HarnessError::Configuration(format!(
                "executable must be an absolute path, got '{}'",
                self.executable.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_scenario_deserialize() {
        let toml = r#"
            id = "roundtrip"
            category = "file"
            path = "/tmp/x"
            payload = "abc\u0000def"
            length = 5
        "#;

        let scenario: Scenario = toml::from_str(toml).unwrap();

        assert_eq!(scenario.id, "roundtrip");
        assert!(scenario.enabled);
        assert_eq!(scenario.category(), Category::File);

        match scenario.kind {
            ScenarioKind::File(file) => {
                assert_eq!(file.declared_payload().unwrap(), b"abc\0d");
                assert!(file.second_handle);
                assert!(!file.keep);
            }
            _ => panic!("Expected File scenario"),
        }
    }

    #[test]
    fn test_network_scenario_defaults() {
        let toml = r#"
            id = "bind"
            category = "network"
            port = 8080
        "#;

        let scenario: Scenario = toml::from_str(toml).unwrap();

        match scenario.kind {
            ScenarioKind::Network(net) => {
                assert_eq!(net, NetworkScenario::new(8080));
            }
            _ => panic!("Expected Network scenario"),
        }
    }

    #[test]
    fn test_network_scenario_options() {
        let toml = r#"
            id = "bind6"
            category = "network"
            port = 9000
            host = "::1"
            family = "ipv6"
            passive = true
            expect = "unavailable"
            verify_rebind = false
        "#;

        let scenario: Scenario = toml::from_str(toml).unwrap();

        match scenario.kind {
            ScenarioKind::Network(net) => {
                assert_eq!(net.host.as_deref(), Some("::1"));
                assert_eq!(net.family, AddressFamily::Ipv6);
                assert!(net.passive);
                assert_eq!(net.expect, BindExpectation::Unavailable);
                assert!(!net.verify_rebind);
            }
            _ => panic!("Expected Network scenario"),
        }
    }

    #[test]
    fn test_process_scenario_deserialize() {
        let toml = r#"
            id = "exec"
            category = "process"
            executable = "/bin/false"
            expected_exit_code = 1
            enabled = false
        "#;

        let scenario: Scenario = toml::from_str(toml).unwrap();

        assert!(!scenario.enabled);
        match scenario.kind {
            ScenarioKind::Process(p) => {
                assert_eq!(p.executable, PathBuf::from("/bin/false"));
                assert_eq!(p.expected_exit_code, 1);
                assert!(!p.silence_output);
            }
            _ => panic!("Expected Process scenario"),
        }
    }

    #[test]
    fn test_unknown_category_rejected() {
        let toml = r#"
            id = "x"
            category = "memory"
        "#;

        assert!(toml::from_str::<Scenario>(toml).is_err());
    }

    #[test]
    fn test_payload_hex_keeps_non_utf8_bytes() {
        let file = FileScenario::with_bytes("/tmp/x", b"ok\0\xFF");
        assert_eq!(file.payload_hex.as_deref(), Some("6f6b00ff"));
        assert_eq!(file.declared_payload().unwrap(), b"ok\0\xFF");
    }

    #[test]
    fn test_payload_validation() {
        let mut file = FileScenario::with_bytes("/tmp/x", b"abc");
        file.payload = Some("abc".to_string());
        assert!(matches!(
            file.payload_bytes(),
            Err(HarnessError::Configuration(_))
        ));

        file.payload = None;
        file.payload_hex = None;
        assert!(file.payload_bytes().is_err());

        file.payload_hex = Some("zz".to_string());
        assert!(file.payload_bytes().is_err());
    }

    #[test]
    fn test_length_longer_than_payload_rejected() {
        let mut file = FileScenario::with_bytes("/tmp/x", b"abc");
        file.length = Some(4);
        let err = file.declared_payload().unwrap_err();
        assert!(err.to_string().contains("exceeds payload length 3"));
    }

    #[test]
    fn test_validate_prefixes_scenario_id() {
        let scenario = Scenario::new(
            "exec",
            ScenarioKind::Process(ProcessScenario::new("bin/ls")),
        );
        let err = scenario.validate().unwrap_err();
        assert!(err.to_string().contains("scenario 'exec'"));
        assert!(err.to_string().contains("absolute path"));
    }

    #[test]
    fn test_validate_rejects_empty_id() {
        let scenario = Scenario::new(" ", ScenarioKind::Network(NetworkScenario::new(1)));
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn test_syscall_footprints_nonempty() {
        for category in [Category::File, Category::Network, Category::Process] {
            assert!(!category.syscalls().is_empty());
            assert!(category.syscalls().contains(&"close"));
        }
    }
}
