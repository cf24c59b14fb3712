//! Error types for channels and the field registry.

use std::time::Duration;

use securefield_proto::{FieldName, ProtocolError};
use thiserror::Error;

use crate::channel::{FrameId, Origin};

/// Why an inbound envelope was refused by a [`crate::FrameChannel`].
///
/// None of these are fatal: the envelope is dropped and logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The channel was destroyed.
    #[error("channel for {field} is destroyed")]
    Destroyed {
        /// Field the channel carried.
        field: FieldName,
    },

    /// Sender origin is not the sandbox origin this channel was opened with.
    #[error("origin {actual} does not match expected {expected}")]
    OriginMismatch {
        /// Origin the frame was loaded from.
        expected: Origin,
        /// Origin that sent the envelope.
        actual: Origin,
    },

    /// Sender is a different frame instance.
    #[error("message from {actual} on channel bound to {expected}")]
    SourceMismatch {
        /// Frame bound to this channel.
        expected: FrameId,
        /// Frame that sent the envelope.
        actual: FrameId,
    },

    /// Envelope claims to be about another field.
    #[error("message names field {actual}, channel carries {expected}")]
    FieldMismatch {
        /// Field this channel carries.
        expected: FieldName,
        /// Field named in the envelope.
        actual: FieldName,
    },

    /// Sequence number did not advance (replay or reorder).
    #[error("stale sequence {sequence} (last accepted {last})")]
    StaleSequence {
        /// Sequence in the envelope.
        sequence: u32,
        /// Highest sequence accepted so far.
        last: u32,
    },

    /// Frame has not acknowledged a reset yet; the envelope predates it.
    #[error("message predates unacknowledged reset {generation}")]
    ResetPending {
        /// Generation the channel waits for.
        generation: u32,
    },

    /// Envelope did not decode.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Errors from [`crate::FieldRegistry`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Message or request named a field that is not registered.
    #[error("field {0} is not registered")]
    FieldNotRegistered(FieldName),

    /// Inbound envelope came from a frame no registered channel is bound to.
    #[error("no registered channel for {0}")]
    UnknownSource(FrameId),

    /// At least one field did not answer an encryption request in time.
    /// Partial results were discarded.
    #[error("encryption timed out after {waited:?}; no response from {missing:?}")]
    EncryptionTimeout {
        /// Fields that never answered.
        missing: Vec<FieldName>,
        /// Time between request and expiry.
        waited: Duration,
    },

    /// An encryption round is already open.
    #[error("encryption request {0} already in flight")]
    EncryptionInFlight(u32),

    /// Channel refused the envelope.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Failure posting to a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    /// The frame's window is gone.
    #[error("frame detached")]
    Detached,

    /// The platform refused the post.
    #[error("post failed: {0}")]
    Rejected(String),
}
