//! Harness error taxonomy
//!
//! Every scenario failure is one of these variants. The runner converts them
//! into outcomes via [`HarnessError::status`]; only `Configuration` is allowed
//! to abort a run, and it can only occur before anything executes.

use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::outcome::OutcomeStatus;

/// Errors raised while registering or running scenarios
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Malformed catalogue (duplicate id, bad parameters)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An OS handle could not be acquired or used
    #[error("resource error: {context}: {source}")]
    Resource {
        context: String,
        #[source]
        source: io::Error,
    },

    /// No candidate address could be resolved
    #[error("resolution error: {0}")]
    Resolution(String),

    /// The child could not replace its image with the target executable
    #[error("child process error: failed to execute {}: {source}", executable.display())]
    ChildProcess {
        executable: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The scenario ran but observed data did not match expectations
    #[error("assertion mismatch: {0}")]
    AssertionMismatch(String),

    /// A probe panicked; caught at the runner boundary
    #[error("scenario panicked: {0}")]
    Panicked(String),
}

/// Stable tag for an error variant, used in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Resource,
    Resolution,
    ChildProcess,
    AssertionMismatch,
    Panicked,
}

impl HarnessError {
    /// Build a resource error with a short description of the failed step
    pub fn resource(context: impl Into<String>, source: io::Error) -> Self {
        Self::Resource {
            context: context.into(),
            source,
        }
    }

    /// Variant tag
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Resource { .. } => ErrorKind::Resource,
            Self::Resolution(_) => ErrorKind::Resolution,
            Self::ChildProcess { .. } => ErrorKind::ChildProcess,
            Self::AssertionMismatch(_) => ErrorKind::AssertionMismatch,
            Self::Panicked(_) => ErrorKind::Panicked,
        }
    }

    /// Terminal status a scenario ends in when it raises this error
    ///
    /// Only a mismatch between observed and expected data is a failure;
    /// everything that prevented the check from happening is an error.
    pub fn status(&self) -> OutcomeStatus {
        match self {
            Self::AssertionMismatch(_) => OutcomeStatus::Failed,
            _ => OutcomeStatus::Errored,
        }
    }
}
