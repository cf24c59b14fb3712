//! Element configuration.

use std::time::Duration;

use securefield_core::RegistryConfig;
use serde::Deserialize;

/// Default time an encryption round may take, in milliseconds.
pub const DEFAULT_ENCRYPTION_TIMEOUT_MS: u64 = 10_000;

/// Amount shown on the pay button.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentAmount {
    /// Minor units.
    pub value: u64,
    /// ISO 4217 code.
    pub currency: String,
}

/// Embedder-supplied element options.
///
/// Deserializes from the camelCase JSON an embedder passes in; every field
/// is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementConfig {
    /// Overrides the variant's type.
    #[serde(rename = "type")]
    pub type_override: Option<String>,
    /// Display name; defaults to the type.
    pub name: Option<String>,
    /// Icon URL; defaults to a logo under `loading_context`.
    pub icon: Option<String>,
    /// Base URL for hosted assets.
    pub loading_context: String,
    /// Amount shown on the pay button.
    pub amount: Option<PaymentAmount>,
    /// Render the built-in pay button.
    pub show_pay_button: bool,
    /// Drive the presenter's status through the payment flow.
    pub set_status_automatically: bool,
    /// Ask the backend to store the card.
    pub store_payment_method: bool,
    /// How long to wait for every frame to return a token.
    #[serde(rename = "encryptionTimeoutMs")]
    pub encryption_timeout_ms: u64,
}

impl Default for ElementConfig {
    fn default() -> Self {
        Self {
            type_override: None,
            name: None,
            icon: None,
            loading_context: "https://checkoutshopper-live.example/checkoutshopper/".to_owned(),
            amount: None,
            show_pay_button: true,
            set_status_automatically: true,
            store_payment_method: false,
            encryption_timeout_ms: DEFAULT_ENCRYPTION_TIMEOUT_MS,
        }
    }
}

impl ElementConfig {
    /// Encryption round timeout.
    pub fn encryption_timeout(&self) -> Duration {
        Duration::from_millis(self.encryption_timeout_ms)
    }

    /// Registry settings derived from this configuration.
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig { encryption_timeout: self.encryption_timeout() }
    }
}
