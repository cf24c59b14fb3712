//! Wire format for secure card-field frames.
//!
//! Every message crossing the host/frame boundary is an envelope: a fixed
//! 16-byte header (zero-copy binary) followed by a CBOR payload. The header
//! carries the field the message concerns, the opcode selecting the payload
//! shape, a direction flag and a per-channel sequence number, so the host can
//! route and reject messages without touching the payload.
//!
//! Only validity signals, focus/fill state, brand hints and opaque encrypted
//! tokens travel outward. Plaintext card data never appears in any payload
//! defined here.
//!
//! # Security
//!
//! Header parsing uses compile-time verified layouts via `zerocopy`. Payloads
//! are capped at 64 KiB and the declared length must match exactly. No "fast
//! paths" that skip validation.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod action;
pub mod envelope;
pub mod errors;
pub mod field;
pub mod flags;
pub mod header;
pub mod opcodes;
pub mod payloads;

pub use action::{ActionType, PaymentAction};
pub use envelope::{Envelope, FieldMessage, HostRequest};
pub use errors::{ProtocolError, Result};
pub use field::{FieldName, FieldPolicy};
pub use flags::{EnvelopeFlags, FieldFlags};
pub use header::EnvelopeHeader;
pub use opcodes::Opcode;
pub use payloads::{EncryptedToken, FieldPayload, HostPayload, Payload};
