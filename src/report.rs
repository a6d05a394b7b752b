//! Aggregate report: per-scenario lines, summary counts, exit code
//!
//! Text goes to stdout one line per scenario followed by a summary line;
//! `--format json` emits a single object instead.

use std::io::{self, Write};

use serde::Serialize;

use crate::outcome::{Outcome, OutcomeStatus};
use crate::scenario::{Scenario, ScenarioKind};

/// Exit code when every scenario passed
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code when any scenario failed or errored
pub const EXIT_SCENARIO_FAILURE: i32 = 1;
/// Exit code when the catalogue could not be loaded or registered
pub const EXIT_CONFIGURATION_ERROR: i32 = 2;

/// Status counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
}

/// Outcomes of one run plus their summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub scenarios: Vec<Outcome>,
    pub summary: Summary,
}

impl Report {
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        let mut summary = Summary {
            total: outcomes.len(),
            ..Summary::default()
        };
        for outcome in &outcomes {
            match outcome.status {
                OutcomeStatus::Passed => summary.passed += 1,
                OutcomeStatus::Failed => summary.failed += 1,
                OutcomeStatus::Errored => summary.errored += 1,
            }
        }
        Self {
            scenarios: outcomes,
            summary,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.summary.passed == self.summary.total
    }

    /// 0 only when every outcome passed
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            EXIT_SUCCESS
        } else {
            EXIT_SCENARIO_FAILURE
        }
    }

    /// Human-readable report
    pub fn write_text<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for outcome in &self.scenarios {
            writeln!(
                out,
                "[{:<7}] {} ({})",
                outcome.status.label(),
                outcome.id,
                outcome.category
            )?;
            if let Some(message) = &outcome.message {
                writeln!(out, "          {}", message)?;
            }
        }
        writeln!(
            out,
            "{} scenarios: {} passed, {} failed, {} errored",
            self.summary.total, self.summary.passed, self.summary.failed, self.summary.errored
        )
    }

    /// Pretty-printed JSON report
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Print the catalogue with each category's syscall footprint (`--list`)
pub fn write_catalogue<W: Write>(scenarios: &[Scenario], out: &mut W) -> io::Result<()> {
    for scenario in scenarios {
        let category = scenario.category();
        let target = match &scenario.kind {
            ScenarioKind::File(file) => file.path.display().to_string(),
            ScenarioKind::Network(net) => format!(
                "{}:{}",
                net.host.as_deref().unwrap_or("<default>"),
                net.port
            ),
            ScenarioKind::Process(process) => process.executable.display().to_string(),
        };
        writeln!(out, "{:<20} {:<8} {}", scenario.id, category.as_str(), target)?;
        writeln!(out, "{:<20} syscalls: {}", "", category.syscalls().join(", "))?;
    }
    Ok(())
}
