//! Typed payloads for each opcode.
//!
//! The opcode in the header selects the payload shape, so payload bodies are
//! plain CBOR structs with no embedded tag. [`FieldPayload`] covers everything
//! a frame may say to the host; [`HostPayload`] covers everything the host may
//! ask of a frame.

use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{FieldPolicy, Opcode, ProtocolError, Result};

/// Opaque ciphertext produced inside a frame.
///
/// The host never inspects it. `Debug` prints only its length so tokens do
/// not end up in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedToken(String);

impl EncryptedToken {
    /// Wrap a token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Token text, for handing to the payment backend.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EncryptedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedToken(<{} bytes>)", self.0.len())
    }
}

/// A payload that can be carried in an envelope.
pub trait Payload: Sized {
    /// Opcode written to the header.
    fn opcode(&self) -> Opcode;

    /// Append the CBOR body to `buf`.
    fn encode_body(&self, buf: &mut Vec<u8>) -> Result<()>;

    /// Decode the body selected by `opcode`.
    fn decode_body(opcode: Opcode, body: &[u8]) -> Result<Self>;
}

/// Validity flag body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidChange {
    /// New validity.
    pub valid: bool,
}

/// Fill flag body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilledChange {
    /// New fill state.
    pub filled: bool,
}

/// Focus flag body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusChange {
    /// New focus state.
    pub focused: bool,
}

/// Encrypted token body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    /// Encryption round this answers; `None` when the frame pushed the token
    /// unprompted after becoming valid.
    pub request_id: Option<u32>,
    /// The ciphertext.
    pub token: EncryptedToken,
}

/// Error code body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrorBody {
    /// Error code, or `None` to clear.
    pub code: Option<String>,
}

/// Brand detection body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandDetected {
    /// Detected brand, or `None` when detection was lost.
    pub brand: Option<String>,
}

/// Reset acknowledgement body.
///
/// Everything a frame sends after the ack reflects the cleared input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetAck {
    /// Generation of the reset being acknowledged.
    pub generation: u32,
}

/// Encryption request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionRequest {
    /// Round identifier the frame must echo.
    pub request_id: u32,
}

/// Reset request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetRequest {
    /// Per-channel reset counter the frame must echo in its [`ResetAck`].
    pub generation: u32,
}

/// Policy notification body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyUpdate {
    /// The field's new requirement policy.
    pub policy: FieldPolicy,
}

/// Frame → host messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPayload {
    /// `FIELD_VALID_CHANGE`
    ValidChange(ValidChange),
    /// `FIELD_FILLED_CHANGE`
    FilledChange(FilledChange),
    /// `FIELD_FOCUS_CHANGE`
    FocusChange(FocusChange),
    /// `FIELD_ENCRYPTED_DATA`
    EncryptedData(EncryptedData),
    /// `FIELD_ERROR`
    Error(FieldErrorBody),
    /// `FIELD_BRAND`
    Brand(BrandDetected),
    /// `FIELD_RESET_ACK`
    ResetAck(ResetAck),
}

impl FieldPayload {
    /// Shorthand for a validity change.
    pub fn valid(valid: bool) -> Self {
        Self::ValidChange(ValidChange { valid })
    }

    /// Shorthand for a fill change.
    pub fn filled(filled: bool) -> Self {
        Self::FilledChange(FilledChange { filled })
    }

    /// Shorthand for a focus change.
    pub fn focused(focused: bool) -> Self {
        Self::FocusChange(FocusChange { focused })
    }

    /// Shorthand for an encrypted token.
    pub fn encrypted(request_id: Option<u32>, token: EncryptedToken) -> Self {
        Self::EncryptedData(EncryptedData { request_id, token })
    }

    /// Shorthand for an error code change.
    pub fn error(code: Option<String>) -> Self {
        Self::Error(FieldErrorBody { code })
    }

    /// Shorthand for a brand detection.
    pub fn brand(brand: Option<String>) -> Self {
        Self::Brand(BrandDetected { brand })
    }

    /// Shorthand for a reset acknowledgement.
    pub fn reset_ack(generation: u32) -> Self {
        Self::ResetAck(ResetAck { generation })
    }
}

impl Payload for FieldPayload {
    fn opcode(&self) -> Opcode {
        match self {
            Self::ValidChange(_) => Opcode::FieldValidChange,
            Self::FilledChange(_) => Opcode::FieldFilledChange,
            Self::FocusChange(_) => Opcode::FieldFocusChange,
            Self::EncryptedData(_) => Opcode::FieldEncryptedData,
            Self::Error(_) => Opcode::FieldError,
            Self::Brand(_) => Opcode::FieldBrand,
            Self::ResetAck(_) => Opcode::FieldResetAck,
        }
    }

    fn encode_body(&self, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::ValidChange(body) => to_cbor(body, buf),
            Self::FilledChange(body) => to_cbor(body, buf),
            Self::FocusChange(body) => to_cbor(body, buf),
            Self::EncryptedData(body) => to_cbor(body, buf),
            Self::Error(body) => to_cbor(body, buf),
            Self::Brand(body) => to_cbor(body, buf),
            Self::ResetAck(body) => to_cbor(body, buf),
        }
    }

    fn decode_body(opcode: Opcode, body: &[u8]) -> Result<Self> {
        match opcode {
            Opcode::FieldValidChange => from_cbor(body).map(Self::ValidChange),
            Opcode::FieldFilledChange => from_cbor(body).map(Self::FilledChange),
            Opcode::FieldFocusChange => from_cbor(body).map(Self::FocusChange),
            Opcode::FieldEncryptedData => from_cbor(body).map(Self::EncryptedData),
            Opcode::FieldError => from_cbor(body).map(Self::Error),
            Opcode::FieldBrand => from_cbor(body).map(Self::Brand),
            Opcode::FieldResetAck => from_cbor(body).map(Self::ResetAck),
            Opcode::RequestEncryption | Opcode::ApplyPolicy | Opcode::Reset => {
                Err(ProtocolError::WrongDirection(opcode))
            },
        }
    }
}

/// Host → frame requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPayload {
    /// `REQUEST_ENCRYPTION`
    RequestEncryption(EncryptionRequest),
    /// `APPLY_POLICY`
    ApplyPolicy(PolicyUpdate),
    /// `RESET`
    Reset(ResetRequest),
}

impl Payload for HostPayload {
    fn opcode(&self) -> Opcode {
        match self {
            Self::RequestEncryption(_) => Opcode::RequestEncryption,
            Self::ApplyPolicy(_) => Opcode::ApplyPolicy,
            Self::Reset(_) => Opcode::Reset,
        }
    }

    fn encode_body(&self, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::RequestEncryption(body) => to_cbor(body, buf),
            Self::ApplyPolicy(body) => to_cbor(body, buf),
            Self::Reset(body) => to_cbor(body, buf),
        }
    }

    fn decode_body(opcode: Opcode, body: &[u8]) -> Result<Self> {
        match opcode {
            Opcode::RequestEncryption => from_cbor(body).map(Self::RequestEncryption),
            Opcode::ApplyPolicy => from_cbor(body).map(Self::ApplyPolicy),
            Opcode::Reset => from_cbor(body).map(Self::Reset),
            _ => Err(ProtocolError::WrongDirection(opcode)),
        }
    }
}

fn to_cbor<T: Serialize>(value: &T, buf: &mut Vec<u8>) -> Result<()> {
    ciborium::ser::into_writer(value, buf).map_err(|e| ProtocolError::Encode(e.to_string()))
}

fn from_cbor<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    ciborium::de::from_reader(body).map_err(|e| ProtocolError::Decode(e.to_string()))
}
