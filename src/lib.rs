//! Vigia - deterministic syscall scenario harness
//!
//! Runs a fixed, declarative catalogue of file, network and process
//! scenarios, checks what each one observed, and reports PASSED / FAILED /
//! ERRORED per scenario. Intended as a known-good workload for syscall
//! tracers, sandboxes and monitors.

pub mod catalogue;
pub mod cli;
pub mod error;
pub mod outcome;
pub mod probe;
pub mod report;
pub mod runner;
pub mod scenario;
