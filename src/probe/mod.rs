//! OS interaction probes, one per scenario category
//!
//! Each probe acquires its handles under scoped guards, performs the
//! interaction, validates what it observed, and releases everything before
//! returning. `Ok` carries an optional note for the report.

pub mod file;
pub mod network;
pub mod process;

use crate::error::HarnessError;
use crate::scenario::ScenarioKind;

/// Dispatch a scenario to the probe for its category
pub fn execute(kind: &ScenarioKind) -> Result<Option<String>, HarnessError> {
    match kind {
        ScenarioKind::File(file) => file::run(file),
        ScenarioKind::Network(network) => network::run(network),
        ScenarioKind::Process(process) => process::run(process),
    }
}
