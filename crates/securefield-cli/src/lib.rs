//! Scenario runner for secure card fields
//!
//! Runs a real [`securefield_element::Runtime`] against simulated frames
//! and reports what the embedder would have seen. Used to reproduce flows
//! (happy path, validation failure, encryption timeout, challenge) outside
//! a browser.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod scenario;

pub use config::ScenarioConfig;
pub use error::CliError;
pub use scenario::{Scenario, ScenarioReport, run_scenario};
