//! Scenario runner
//!
//! Runs registered scenarios strictly in registration order, one at a time.
//! Scenario-local errors (and panics) are converted to outcomes at this
//! boundary; nothing a probe does can stop later scenarios from running.
//!
//! ```text
//! register(s1), register(s2), ...      ConfigurationError here aborts
//!            │
//!            ▼
//! run_all:  s1: PENDING → RUNNING → PASSED | FAILED | ERRORED
//!           s2: PENDING → RUNNING → ...
//!            │
//!            ▼
//!        Vec<Outcome> (registration order)
//! ```

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use tracing::{debug, info, info_span};

use crate::error::HarnessError;
use crate::outcome::{Outcome, ScenarioState};
use crate::probe;
use crate::scenario::{Scenario, ScenarioKind};

/// Ordered, validated set of scenarios waiting to run
#[derive(Debug, Default)]
pub struct ScenarioRunner {
    scenarios: Vec<Scenario>,
    ids: HashSet<String>,
}

impl ScenarioRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scenario to the end of the run order
    ///
    /// Fails with a configuration error on a duplicate id or invalid
    /// parameters; the runner is left unchanged in that case.
    pub fn register(&mut self, scenario: Scenario) -> Result<(), HarnessError> {
        scenario.validate()?;
        if self.ids.contains(&scenario.id) {
            return Err(HarnessError::Configuration(format!(
                "duplicate scenario id '{}'",
                scenario.id
            )));
        }
        debug!(id = %scenario.id, category = %scenario.category(), "registered scenario");
        self.ids.insert(scenario.id.clone());
        self.scenarios.push(scenario);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Registered scenarios in run order
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Run every scenario with the OS probes
    pub fn run_all(self) -> Vec<Outcome> {
        self.run_all_with(probe::execute)
    }

    /// Run every scenario with a caller-supplied executor
    ///
    /// The runner still owns ordering, state transitions and error/panic
    /// conversion; `execute` only performs the interaction.
    pub fn run_all_with<F>(self, mut execute: F) -> Vec<Outcome>
    where
        F: FnMut(&ScenarioKind) -> Result<Option<String>, HarnessError>,
    {
        self.scenarios
            .iter()
            .map(|scenario| run_one(scenario, &mut execute))
            .collect()
    }
}

fn run_one<F>(scenario: &Scenario, execute: &mut F) -> Outcome
where
    F: FnMut(&ScenarioKind) -> Result<Option<String>, HarnessError>,
{
    let category = scenario.category();
    let span = info_span!("scenario", id = %scenario.id, %category);
    let _enter = span.enter();

    let mut state = ScenarioState::Pending;
    transition(&mut state, ScenarioState::Running);
    info!("running {} scenario", category);

    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| execute(&scenario.kind)))
        .unwrap_or_else(|payload| Err(HarnessError::Panicked(panic_message(payload.as_ref()))));

    let outcome = match result {
        Ok(message) => Outcome::passed(scenario.id.clone(), category, message),
        Err(err) => Outcome::from_error(scenario.id.clone(), category, &err),
    };
    transition(&mut state, ScenarioState::Finished(outcome.status));

    info!(
        status = %outcome.status,
        elapsed_us = started.elapsed().as_micros() as u64,
        "scenario finished"
    );
    outcome
}

fn transition(state: &mut ScenarioState, next: ScenarioState) {
    match state.advance(next) {
        Some(advanced) => {
            debug!(from = ?state, to = ?advanced, "state transition");
            *state = advanced;
        }
        None => debug!(from = ?state, to = ?next, "ignored invalid state transition"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
