//! Field requirement policy.
//!
//! Pure mapping from card configuration and detected brand to a
//! [`FieldPolicy`] per field. Re-run on every brand detection event.
//!
//! Security code:
//!
//! ```text
//! hide_cvc set ─────────────────────────> Hidden
//! brand scheme has no CVC ──────────────> Hidden
//! brand scheme makes CVC optional ──────> Optional
//! otherwise (including no brand yet) ───> Required
//! ```

use std::collections::BTreeMap;

use securefield_proto::{FieldName, FieldPolicy};
use serde::{Deserialize, Serialize};

/// Brand whose cards authenticate with password digits instead of a CVC.
pub const KOREAN_LOCAL_CARD: &str = "korean_local_card";

/// Card form configuration supplied by the embedder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CardConfiguration {
    /// Suppress the security code entirely.
    #[serde(alias = "hideCVC")]
    pub hide_cvc: bool,
    /// Show a cardholder name input.
    pub has_holder_name: bool,
    /// Cardholder name must be filled when shown.
    pub holder_name_required: bool,
    /// Collect password digits for Korean issued cards.
    pub korean_authentication_required: bool,
    /// Accepted brands. Empty accepts any.
    pub brands: Vec<String>,
}

impl CardConfiguration {
    /// True when `brand` is accepted by this configuration.
    pub fn accepts_brand(&self, brand: &str) -> bool {
        self.brands.is_empty() || self.brands.iter().any(|b| b == brand)
    }
}

/// How a card scheme treats the security code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvcRequirement {
    /// Every card carries one and the issuer checks it.
    Mandatory,
    /// Some cards carry one; issuers accept payments without it.
    Optional,
    /// Cards of this scheme have no security code.
    NotUsed,
}

impl CvcRequirement {
    /// Requirement for a detected brand.
    pub fn for_brand(brand: &str) -> Self {
        match brand {
            "maestro" | "maestro_uk" => Self::Optional,
            "bcmc" | KOREAN_LOCAL_CARD => Self::NotUsed,
            _ => Self::Mandatory,
        }
    }
}

/// Stateless policy computation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyResolver;

impl PolicyResolver {
    /// Policy for one field.
    pub fn resolve(
        config: &CardConfiguration,
        brand: Option<&str>,
        field: FieldName,
    ) -> FieldPolicy {
        match field {
            FieldName::EncryptedCardNumber
            | FieldName::EncryptedExpiryMonth
            | FieldName::EncryptedExpiryYear => FieldPolicy::Required,
            FieldName::EncryptedSecurityCode => Self::security_code(config, brand),
            FieldName::EncryptedPassword => {
                let korean_card = brand.is_none_or(|b| b == KOREAN_LOCAL_CARD);
                if config.korean_authentication_required && korean_card {
                    FieldPolicy::Required
                } else {
                    FieldPolicy::Hidden
                }
            },
            FieldName::HolderName => match (config.has_holder_name, config.holder_name_required) {
                (false, _) => FieldPolicy::Hidden,
                (true, true) => FieldPolicy::Required,
                (true, false) => FieldPolicy::Optional,
            },
        }
    }

    /// Policy for every known field.
    pub fn resolve_all(
        config: &CardConfiguration,
        brand: Option<&str>,
    ) -> BTreeMap<FieldName, FieldPolicy> {
        FieldName::ALL
            .into_iter()
            .map(|field| (field, Self::resolve(config, brand, field)))
            .collect()
    }

    fn security_code(config: &CardConfiguration, brand: Option<&str>) -> FieldPolicy {
        if config.hide_cvc {
            return FieldPolicy::Hidden;
        }

        match brand.map(CvcRequirement::for_brand) {
            Some(CvcRequirement::NotUsed) => FieldPolicy::Hidden,
            Some(CvcRequirement::Optional) => FieldPolicy::Optional,
            Some(CvcRequirement::Mandatory) | None => FieldPolicy::Required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cvc(config: &CardConfiguration, brand: Option<&str>) -> FieldPolicy {
        PolicyResolver::resolve(config, brand, FieldName::EncryptedSecurityCode)
    }

    #[test]
    fn cvc_defaults_to_required() {
        let config = CardConfiguration::default();
        assert_eq!(cvc(&config, None), FieldPolicy::Required);
        assert_eq!(cvc(&config, Some("visa")), FieldPolicy::Required);
        assert_eq!(cvc(&config, Some("some_new_scheme")), FieldPolicy::Required);
    }

    #[test]
    fn hide_cvc_wins_over_brand() {
        let config = CardConfiguration { hide_cvc: true, ..Default::default() };
        assert_eq!(cvc(&config, None), FieldPolicy::Hidden);
        assert_eq!(cvc(&config, Some("mc")), FieldPolicy::Hidden);
        assert_eq!(cvc(&config, Some("maestro")), FieldPolicy::Hidden);
    }

    #[test]
    fn brand_without_mandatory_cvc_is_optional() {
        let config = CardConfiguration::default();
        assert_eq!(cvc(&config, Some("maestro")), FieldPolicy::Optional);
    }

    #[test]
    fn brand_without_cvc_hides_it() {
        let config = CardConfiguration::default();
        assert_eq!(cvc(&config, Some("bcmc")), FieldPolicy::Hidden);
    }

    #[test]
    fn holder_name_follows_configuration() {
        let hidden = CardConfiguration::default();
        let optional = CardConfiguration { has_holder_name: true, ..Default::default() };
        let required = CardConfiguration {
            has_holder_name: true,
            holder_name_required: true,
            ..Default::default()
        };

        let resolve =
            |c: &CardConfiguration| PolicyResolver::resolve(c, None, FieldName::HolderName);
        assert_eq!(resolve(&hidden), FieldPolicy::Hidden);
        assert_eq!(resolve(&optional), FieldPolicy::Optional);
        assert_eq!(resolve(&required), FieldPolicy::Required);
    }

    #[test]
    fn password_only_for_korean_cards() {
        let config =
            CardConfiguration { korean_authentication_required: true, ..Default::default() };
        let resolve = |b| PolicyResolver::resolve(&config, b, FieldName::EncryptedPassword);

        assert_eq!(resolve(None), FieldPolicy::Required);
        assert_eq!(resolve(Some(KOREAN_LOCAL_CARD)), FieldPolicy::Required);
        assert_eq!(resolve(Some("visa")), FieldPolicy::Hidden);
        assert_eq!(
            PolicyResolver::resolve(
                &CardConfiguration::default(),
                None,
                FieldName::EncryptedPassword
            ),
            FieldPolicy::Hidden
        );
    }

    #[test]
    fn resolve_all_covers_every_field() {
        let policies = PolicyResolver::resolve_all(&CardConfiguration::default(), None);
        assert_eq!(policies.len(), FieldName::ALL.len());
        assert_eq!(policies[&FieldName::EncryptedCardNumber], FieldPolicy::Required);
    }

    #[test]
    fn configuration_deserializes_from_camel_case() {
        let config: CardConfiguration = serde_json::from_str(
            r#"{ "hideCVC": true, "hasHolderName": true, "brands": ["visa"] }"#,
        )
        .unwrap();

        assert!(config.hide_cvc);
        assert!(config.has_holder_name);
        assert!(config.accepts_brand("visa"));
        assert!(!config.accepts_brand("amex"));
    }
}
