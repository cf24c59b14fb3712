//! Errors surfaced by the scenario runner.

use std::{io, path::PathBuf};

use securefield_element::RuntimeError;
use thiserror::Error;

use crate::scenario::Scenario;

/// Anything that stops a scenario.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration file could not be read.
    #[error("cannot read {path}: {source}")]
    ReadConfig {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },

    /// Configuration file is not valid JSON for [`crate::ScenarioConfig`].
    #[error("invalid configuration: {0}")]
    ParseConfig(#[source] serde_json::Error),

    /// Report could not be serialized.
    #[error("cannot encode report: {0}")]
    Report(#[source] serde_json::Error),

    /// The runtime stopped.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// The flow did not end the way the scenario expects.
    #[error("scenario {scenario} ended unexpectedly: {reason}")]
    Unexpected {
        /// Scenario that ran.
        scenario: Scenario,
        /// What was off.
        reason: String,
    },
}
