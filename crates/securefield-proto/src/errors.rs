//! Protocol errors.

use thiserror::Error;

use crate::Opcode;

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Buffer shorter than the structure being read.
    #[error("envelope truncated: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        available: usize,
    },

    /// Header magic did not match `SFLD`.
    #[error("bad envelope magic {0:02x?}")]
    BadMagic([u8; 4]),

    /// Header version is not one we speak.
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u8),

    /// Opcode byte does not name a known message type.
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    /// Field byte does not name a known field.
    #[error("unknown field id {0}")]
    UnknownField(u8),

    /// Payload exceeds [`crate::EnvelopeHeader::MAX_PAYLOAD_SIZE`].
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Actual payload size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Header-declared payload size disagrees with the bytes that follow.
    #[error("payload length mismatch: header declares {declared}, got {actual}")]
    LengthMismatch {
        /// Length from the header.
        declared: usize,
        /// Length actually present.
        actual: usize,
    },

    /// Opcode is valid but not for the direction this envelope travels.
    #[error("opcode {0:?} not valid in this direction")]
    WrongDirection(Opcode),

    /// CBOR serialization failed.
    #[error("CBOR encode failed: {0}")]
    Encode(String),

    /// CBOR deserialization failed.
    #[error("CBOR decode failed: {0}")]
    Decode(String),
}
