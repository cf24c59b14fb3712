//! Payment-method variants.
//!
//! A variant decides which secure fields an element renders, what "valid"
//! means for it beyond the per-field aggregate, and how a completed
//! encryption snapshot becomes submit data.

use securefield_core::{AggregateFormState, CardConfiguration, EncryptedSnapshot};
use securefield_proto::FieldName;
use serde_json::{Map, Value, json};

use crate::{config::ElementConfig, error::ElementError};

/// Payment method type sent for every card variant.
pub const SCHEME: &str = "scheme";

/// Validation side of a variant.
pub trait Validatable {
    /// Fields the variant renders, in display order.
    fn fields(&self) -> &[FieldName];

    /// Whether the form may be submitted.
    ///
    /// Every field the variant renders must be registered and the aggregate
    /// must be valid.
    fn is_valid(&self, form: &AggregateFormState) -> bool {
        covers(self.fields(), form)
    }
}

fn covers(fields: &[FieldName], form: &AggregateFormState) -> bool {
    form.is_valid && fields.iter().all(|field| form.valid.contains_key(field))
}

/// Submission side of a variant.
pub trait Submittable {
    /// Element type, used for the descriptor and icon.
    fn element_type(&self) -> &str;

    /// Brand known before the shopper types anything.
    fn initial_brand(&self) -> Option<&str> {
        None
    }

    /// Name shown when the embedder configured none.
    fn display_name(&self) -> Option<String> {
        None
    }

    /// Pre-submit hook.
    fn start_payment(&mut self) -> Result<(), ElementError> {
        Ok(())
    }

    /// Submit data built from a complete snapshot.
    fn submit_data(
        &self,
        snapshot: &EncryptedSnapshot,
        form: &AggregateFormState,
        config: &ElementConfig,
    ) -> Value;
}

/// New card entered by the shopper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardVariant {
    fields: Vec<FieldName>,
    card: CardConfiguration,
}

impl CardVariant {
    /// Fields follow the card configuration: holder name and password only
    /// when configured.
    pub fn new(config: &CardConfiguration) -> Self {
        let mut fields = vec![
            FieldName::EncryptedCardNumber,
            FieldName::EncryptedExpiryMonth,
            FieldName::EncryptedExpiryYear,
            FieldName::EncryptedSecurityCode,
        ];
        if config.korean_authentication_required {
            fields.push(FieldName::EncryptedPassword);
        }
        if config.has_holder_name {
            fields.push(FieldName::HolderName);
        }
        Self { fields, card: config.clone() }
    }
}

impl Validatable for CardVariant {
    fn fields(&self) -> &[FieldName] {
        &self.fields
    }

    /// A detected brand outside the configured list blocks submission.
    fn is_valid(&self, form: &AggregateFormState) -> bool {
        let accepted = form.brand.as_deref().is_none_or(|brand| self.card.accepts_brand(brand));
        accepted && covers(&self.fields, form)
    }
}

impl Submittable for CardVariant {
    fn element_type(&self) -> &str {
        "card"
    }

    fn submit_data(
        &self,
        snapshot: &EncryptedSnapshot,
        form: &AggregateFormState,
        config: &ElementConfig,
    ) -> Value {
        let mut method = Map::new();
        method.insert("type".into(), SCHEME.into());
        if let Some(brand) = &form.brand {
            method.insert("brand".into(), brand.clone().into());
        }
        for (field, token) in &snapshot.tokens {
            method.insert(field.as_str().into(), token.as_str().into());
        }

        let mut data = Map::new();
        data.insert("paymentMethod".into(), Value::Object(method));
        if config.store_payment_method {
            data.insert("storePaymentMethod".into(), true.into());
        }
        Value::Object(data)
    }
}

/// Card stored on the shopper's account; only the security code is
/// collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCardVariant {
    /// Backend identifier of the stored card.
    pub stored_payment_method_id: String,
    /// Brand of the stored card; drives the security-code policy.
    pub brand: String,
    /// Last four digits, for the display name.
    pub last_four: String,
}

impl Validatable for StoredCardVariant {
    fn fields(&self) -> &[FieldName] {
        &[FieldName::EncryptedSecurityCode]
    }
}

impl Submittable for StoredCardVariant {
    fn element_type(&self) -> &str {
        &self.brand
    }

    fn initial_brand(&self) -> Option<&str> {
        Some(&self.brand)
    }

    fn display_name(&self) -> Option<String> {
        Some(format!("•••• {}", self.last_four))
    }

    fn submit_data(
        &self,
        snapshot: &EncryptedSnapshot,
        _form: &AggregateFormState,
        _config: &ElementConfig,
    ) -> Value {
        let mut method = json!({
            "type": SCHEME,
            "brand": self.brand,
            "storedPaymentMethodId": self.stored_payment_method_id,
        });
        if let (Some(token), Some(object)) =
            (snapshot.tokens.get(&FieldName::EncryptedSecurityCode), method.as_object_mut())
        {
            object.insert(FieldName::EncryptedSecurityCode.as_str().into(), token.as_str().into());
        }
        json!({ "paymentMethod": method })
    }
}

/// Variant an element is built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentMethodVariant {
    /// New card.
    Card(CardVariant),
    /// Stored card.
    StoredCard(StoredCardVariant),
}

impl PaymentMethodVariant {
    /// New-card variant for `config`.
    pub fn card(config: &CardConfiguration) -> Self {
        Self::Card(CardVariant::new(config))
    }

    fn validatable(&self) -> &dyn Validatable {
        match self {
            Self::Card(card) => card,
            Self::StoredCard(stored) => stored,
        }
    }

    fn submittable(&self) -> &dyn Submittable {
        match self {
            Self::Card(card) => card,
            Self::StoredCard(stored) => stored,
        }
    }
}

impl Validatable for PaymentMethodVariant {
    fn fields(&self) -> &[FieldName] {
        self.validatable().fields()
    }

    fn is_valid(&self, form: &AggregateFormState) -> bool {
        self.validatable().is_valid(form)
    }
}

impl Submittable for PaymentMethodVariant {
    fn element_type(&self) -> &str {
        self.submittable().element_type()
    }

    fn initial_brand(&self) -> Option<&str> {
        self.submittable().initial_brand()
    }

    fn display_name(&self) -> Option<String> {
        self.submittable().display_name()
    }

    fn start_payment(&mut self) -> Result<(), ElementError> {
        match self {
            Self::Card(card) => card.start_payment(),
            Self::StoredCard(stored) => stored.start_payment(),
        }
    }

    fn submit_data(
        &self,
        snapshot: &EncryptedSnapshot,
        form: &AggregateFormState,
        config: &ElementConfig,
    ) -> Value {
        self.submittable().submit_data(snapshot, form, config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use securefield_proto::EncryptedToken;

    use super::*;

    fn snapshot(fields: &[FieldName]) -> EncryptedSnapshot {
        let tokens: BTreeMap<_, _> = fields
            .iter()
            .map(|field| (*field, EncryptedToken::new(format!("sf1${}", field.as_str()))))
            .collect();
        EncryptedSnapshot { request_id: 1, tokens }
    }

    #[test]
    fn card_fields_follow_configuration() {
        let config = CardConfiguration {
            has_holder_name: true,
            korean_authentication_required: true,
            ..CardConfiguration::default()
        };

        assert_eq!(
            CardVariant::new(&config).fields(),
            &[
                FieldName::EncryptedCardNumber,
                FieldName::EncryptedExpiryMonth,
                FieldName::EncryptedExpiryYear,
                FieldName::EncryptedSecurityCode,
                FieldName::EncryptedPassword,
                FieldName::HolderName,
            ]
        );
    }

    #[test]
    fn unregistered_field_blocks_variant() {
        let variant = PaymentMethodVariant::card(&CardConfiguration::default());
        let mut form = AggregateFormState { is_valid: true, ..AggregateFormState::default() };
        form.valid.insert(FieldName::EncryptedCardNumber, true);

        assert!(!variant.is_valid(&form));
    }

    #[test]
    fn unaccepted_brand_blocks_card() {
        let config = CardConfiguration {
            brands: vec!["visa".into(), "mc".into()],
            ..CardConfiguration::default()
        };
        let variant = PaymentMethodVariant::card(&config);
        let mut form = AggregateFormState { is_valid: true, ..AggregateFormState::default() };
        for field in variant.fields() {
            form.valid.insert(*field, true);
        }

        form.brand = Some("mc".into());
        assert!(variant.is_valid(&form));

        form.brand = Some("amex".into());
        assert!(!variant.is_valid(&form));
    }

    #[test]
    fn card_submit_data_shape() {
        let variant = PaymentMethodVariant::card(&CardConfiguration::default());
        let form =
            AggregateFormState { brand: Some("visa".into()), ..AggregateFormState::default() };
        let config = ElementConfig { store_payment_method: true, ..ElementConfig::default() };

        let data = variant.submit_data(
            &snapshot(&[FieldName::EncryptedCardNumber, FieldName::EncryptedSecurityCode]),
            &form,
            &config,
        );

        assert_eq!(
            data,
            json!({
                "paymentMethod": {
                    "type": "scheme",
                    "brand": "visa",
                    "encryptedCardNumber": "sf1$encryptedCardNumber",
                    "encryptedSecurityCode": "sf1$encryptedSecurityCode",
                },
                "storePaymentMethod": true,
            })
        );
    }

    #[test]
    fn stored_card_submits_only_security_code() {
        let variant = PaymentMethodVariant::StoredCard(StoredCardVariant {
            stored_payment_method_id: "8415".into(),
            brand: "mc".into(),
            last_four: "4444".into(),
        });

        let data = variant.submit_data(
            &snapshot(&[FieldName::EncryptedSecurityCode]),
            &AggregateFormState::default(),
            &ElementConfig::default(),
        );

        assert_eq!(variant.initial_brand(), Some("mc"));
        assert_eq!(variant.display_name().as_deref(), Some("•••• 4444"));
        assert_eq!(
            data,
            json!({
                "paymentMethod": {
                    "type": "scheme",
                    "brand": "mc",
                    "storedPaymentMethodId": "8415",
                    "encryptedSecurityCode": "sf1$encryptedSecurityCode",
                }
            })
        );
    }
}
