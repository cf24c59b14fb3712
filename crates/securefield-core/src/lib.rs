//! Secure card-field core
//!
//! Host-side state for card fields whose inputs live in sandboxed frames on
//! another origin. The host never sees plaintext; it sees validity, fill and
//! focus signals, brand hints and opaque encrypted tokens, all arriving as
//! envelopes on one [`channel::FrameChannel`] per field.
//!
//! # Architecture
//!
//! Everything here is a deterministic state machine. Time is passed in by the
//! caller, frames are reached through the [`channel::FramePort`] trait, and
//! nothing blocks. The element runtime (or a test harness) owns the event
//! loop and feeds inbound envelopes and clock ticks in.
//!
//! # Components
//!
//! - [`channel`]: one validated message link to one frame
//! - [`registry`]: canonical per-field state and encryption rounds
//! - [`policy`]: brand/configuration → per-field requirement policy
//! - [`aggregate`]: pure projection of the registry into form state
//! - [`mod@env`]: environment abstraction (time)
//! - [`error`]: channel and registry error types

pub mod aggregate;
pub mod channel;
pub mod env;
pub mod error;
pub mod policy;
pub mod registry;

pub use aggregate::{AggregateFormState, ValidationAggregator};
pub use channel::{FrameChannel, FrameId, FramePort, InboundMessage, Origin};
pub use env::{Environment, SystemEnv};
pub use error::{ChannelError, PortError, RegistryError};
pub use policy::{CardConfiguration, CvcRequirement, PolicyResolver};
pub use registry::{EncryptedSnapshot, FieldRegistry, FieldState, RegistryConfig};
