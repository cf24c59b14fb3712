//! Field identifiers and requirement policies.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ProtocolError, Result};

/// Logical card-form field.
///
/// The set is fixed at compile time. Names match the keys the payment
/// backend expects in submitted card data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldName {
    /// Primary account number.
    EncryptedCardNumber,
    /// Expiry month.
    EncryptedExpiryMonth,
    /// Expiry year.
    EncryptedExpiryYear,
    /// Card security code (CVC/CVV).
    EncryptedSecurityCode,
    /// Card password digits (Korean card authentication).
    EncryptedPassword,
    /// Cardholder name.
    HolderName,
}

impl FieldName {
    /// Every field, in wire-id order.
    pub const ALL: [Self; 6] = [
        Self::EncryptedCardNumber,
        Self::EncryptedExpiryMonth,
        Self::EncryptedExpiryYear,
        Self::EncryptedSecurityCode,
        Self::EncryptedPassword,
        Self::HolderName,
    ];

    /// One-byte identifier carried in the envelope header.
    pub const fn wire_id(self) -> u8 {
        match self {
            Self::EncryptedCardNumber => 1,
            Self::EncryptedExpiryMonth => 2,
            Self::EncryptedExpiryYear => 3,
            Self::EncryptedSecurityCode => 4,
            Self::EncryptedPassword => 5,
            Self::HolderName => 6,
        }
    }

    /// Inverse of [`Self::wire_id`].
    pub fn from_wire_id(id: u8) -> Result<Self> {
        Self::ALL.into_iter().find(|f| f.wire_id() == id).ok_or(ProtocolError::UnknownField(id))
    }

    /// Backend key for this field.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EncryptedCardNumber => "encryptedCardNumber",
            Self::EncryptedExpiryMonth => "encryptedExpiryMonth",
            Self::EncryptedExpiryYear => "encryptedExpiryYear",
            Self::EncryptedSecurityCode => "encryptedSecurityCode",
            Self::EncryptedPassword => "encryptedPassword",
            Self::HolderName => "holderName",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a field must be filled for the form to be submittable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldPolicy {
    /// Must be filled and valid.
    #[default]
    Required,
    /// May be left empty; if filled it must be valid.
    Optional,
    /// Not shown; never blocks the form.
    Hidden,
}

impl FieldPolicy {
    /// True for [`FieldPolicy::Hidden`].
    pub const fn is_hidden(self) -> bool {
        matches!(self, Self::Hidden)
    }
}
