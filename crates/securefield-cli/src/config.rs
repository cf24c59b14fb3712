//! Scenario configuration.
//!
//! A JSON file with the same shape an embedder would pass to the element:
//!
//! ```json
//! {
//!   "element": { "encryptionTimeoutMs": 5000 },
//!   "card": { "hasHolderName": true, "holderNameRequired": true },
//!   "cardNumber": "6703444444444449"
//! }
//! ```
//!
//! Every key is optional.

use std::{fs, path::Path};

use securefield_core::CardConfiguration;
use securefield_element::ElementConfig;
use serde::Deserialize;

use crate::error::CliError;

/// Card number typed when none is configured.
pub const DEFAULT_CARD_NUMBER: &str = "4111111111111111";

/// Element, card and shopper input for one run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScenarioConfig {
    /// Element options.
    pub element: ElementConfig,
    /// Card options.
    pub card: CardConfiguration,
    /// Number the shopper types.
    pub card_number: String,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            element: ElementConfig::default(),
            card: CardConfiguration::default(),
            card_number: DEFAULT_CARD_NUMBER.to_owned(),
        }
    }
}

impl ScenarioConfig {
    /// Read a configuration file.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = fs::read_to_string(path)
            .map_err(|source| CliError::ReadConfig { path: path.to_owned(), source })?;
        Self::parse(&text)
    }

    /// Parse configuration JSON.
    pub fn parse(text: &str) -> Result<Self, CliError> {
        serde_json::from_str(text).map_err(CliError::ParseConfig)
    }
}
