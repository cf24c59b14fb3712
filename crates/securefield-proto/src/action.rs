//! Server-issued payment actions.
//!
//! An action arrives from the payment backend after a submit when the payment
//! needs a continuation step (3-D Secure challenge, redirect, QR code, ...).
//! It is opaque to the core apart from its `type`, which selects the
//! continuation element to mount.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque `{type, ...data}` continuation payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PaymentAction {
    /// Action type; absent on malformed payloads.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,

    /// Everything else the backend sent, untouched.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl PaymentAction {
    /// Create an action of the given type with no data.
    pub fn new(action_type: impl Into<String>) -> Self {
        Self { action_type: Some(action_type.into()), data: Map::new() }
    }

    /// Builder-style data insertion.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Parse the type into a known [`ActionType`].
    pub fn kind(&self) -> Option<ActionType> {
        self.action_type.as_deref().and_then(|t| t.parse().ok())
    }
}

/// Action types a continuation element exists for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    /// Full-page or popup redirect to an issuer/acquirer page.
    Redirect,
    /// 3-D Secure 2 fingerprint or challenge.
    ThreeDs2,
    /// QR code the shopper scans with another device.
    QrCode,
    /// Wait for an out-of-band confirmation.
    Await,
    /// Voucher to be paid offline.
    Voucher,
    /// Native SDK hand-off.
    Sdk,
}

impl ActionType {
    /// Wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Redirect => "redirect",
            Self::ThreeDs2 => "threeDS2",
            Self::QrCode => "qrCode",
            Self::Await => "await",
            Self::Voucher => "voucher",
            Self::Sdk => "sdk",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an action type string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownActionType(pub String);

impl FromStr for ActionType {
    type Err = UnknownActionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "redirect" => Ok(Self::Redirect),
            "threeDS2" => Ok(Self::ThreeDs2),
            "qrCode" => Ok(Self::QrCode),
            "await" => Ok(Self::Await),
            "voucher" => Ok(Self::Voucher),
            "sdk" => Ok(Self::Sdk),
            other => Err(UnknownActionType(other.to_string())),
        }
    }
}
