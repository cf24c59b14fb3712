//! Form-level projection of field state.
//!
//! [`ValidationAggregator`] holds no state. It folds the registry's fields
//! into an [`AggregateFormState`] using each field's effective validity (see
//! [`FieldState::is_effectively_valid`]), so a hidden field never blocks
//! submission and an empty optional field never reports an error.

use std::collections::BTreeMap;

use securefield_proto::{EncryptedToken, FieldName};
use serde::Serialize;

use crate::registry::{FieldRegistry, FieldState};

/// Error code for a required field that is still empty.
pub const ERROR_INCOMPLETE: &str = "error.va.incomplete";

/// Error code for a filled field the frame rejected without a specific code.
pub const ERROR_INVALID: &str = "error.va.invalid";

/// Snapshot of the whole form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateFormState {
    /// Every non-hidden field is effectively valid.
    pub is_valid: bool,
    /// Tokens the frames pushed unprompted, by field.
    pub data: BTreeMap<FieldName, EncryptedToken>,
    /// Error code per field that blocks submission.
    pub errors: BTreeMap<FieldName, String>,
    /// Effective validity per field.
    pub valid: BTreeMap<FieldName, bool>,
    /// Brand detected by the card-number frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
}

impl AggregateFormState {
    /// Error code for one field, if it has one.
    pub fn error(&self, field: FieldName) -> Option<&str> {
        self.errors.get(&field).map(String::as_str)
    }
}

/// Pure fold from field states to [`AggregateFormState`].
pub struct ValidationAggregator;

impl ValidationAggregator {
    /// Aggregate every field currently in `registry`.
    pub fn compute(registry: &FieldRegistry) -> AggregateFormState {
        Self::from_fields(registry.fields(), registry.brand())
    }

    /// Aggregate an arbitrary set of fields.
    ///
    /// An empty set is valid.
    pub fn from_fields<'a>(
        fields: impl IntoIterator<Item = (FieldName, &'a FieldState)>,
        brand: Option<&str>,
    ) -> AggregateFormState {
        let mut form = AggregateFormState {
            is_valid: true,
            brand: brand.map(str::to_owned),
            ..AggregateFormState::default()
        };

        for (name, state) in fields {
            let valid = state.is_effectively_valid();
            form.valid.insert(name, valid);

            if let Some(token) = &state.encrypted {
                form.data.insert(name, token.clone());
            }

            if !valid {
                form.is_valid = false;
                form.errors.insert(name, error_code(state));
            }
        }

        form
    }
}

fn error_code(state: &FieldState) -> String {
    match &state.error_code {
        Some(code) => code.clone(),
        None if state.filled() => ERROR_INVALID.to_owned(),
        None => ERROR_INCOMPLETE.to_owned(),
    }
}
