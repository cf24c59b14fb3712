//! Message link to one sandboxed field frame.
//!
//! A [`FrameChannel`] is bound to exactly one frame instance ([`FrameId`])
//! loaded from exactly one origin. Outbound requests go through a
//! [`FramePort`]; inbound envelopes pass a single gate,
//! [`FrameChannel::receive`], which checks origin, source, field and sequence
//! before anything downstream sees the message.
//!
//! [`FrameChannel::reset`] fences the link: until the frame acknowledges the
//! reset generation, everything it sent before clearing its input is refused.
//!
//! # Lifecycle
//!
//! ```text
//! ┌──────┐  destroy()  ┌───────────┐
//! │ Open │────────────>│ Destroyed │──┐ destroy(): no-op
//! └──────┘             └───────────┘<─┘ send(): no-op
//!                                       receive(): Err(Destroyed)
//! ```

use std::fmt;

use bytes::Bytes;
use securefield_proto::{
    FieldMessage, FieldName, FieldPayload, HostPayload, HostRequest, Payload,
    payloads::{ResetAck, ResetRequest},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{ChannelError, PortError};

/// Origin a frame was loaded from, e.g. `https://fields.example`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(String);

impl Origin {
    /// Wrap an origin string.
    pub fn new(origin: impl Into<String>) -> Self {
        Self(origin.into())
    }

    /// Origin text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one frame instance (the window handle a message came from).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// Raw envelope as delivered by the platform, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Origin reported by the platform for the sender.
    pub origin: Origin,
    /// Frame instance that posted it.
    pub source: FrameId,
    /// Encoded envelope.
    pub data: Bytes,
}

/// Outbound half of the platform link to a frame.
///
/// `post` must not block. Implementations typically wrap a window's
/// `postMessage` or, in simulation, an in-memory queue.
pub trait FramePort: Send {
    /// Deliver an encoded envelope to the frame.
    fn post(&mut self, data: Bytes) -> Result<(), PortError>;

    /// Release platform resources. Called once, on destroy.
    fn close(&mut self) {}
}

type MessageHandler = Box<dyn FnMut(&FieldMessage) + Send>;

/// Validated, ordered message link to one field frame.
pub struct FrameChannel {
    field: FieldName,
    frame: FrameId,
    origin: Origin,
    port: Option<Box<dyn FramePort>>,
    handlers: Vec<MessageHandler>,
    next_sequence: u32,
    last_inbound: Option<u32>,
    reset_generation: u32,
    awaiting_ack: Option<u32>,
}

impl FrameChannel {
    /// Open a channel to `frame`, which was loaded from `origin` and hosts
    /// the input for `field`.
    pub fn new(
        field: FieldName,
        frame: FrameId,
        origin: Origin,
        port: impl FramePort + 'static,
    ) -> Self {
        Self {
            field,
            frame,
            origin,
            port: Some(Box::new(port)),
            handlers: Vec::new(),
            next_sequence: 0,
            last_inbound: None,
            reset_generation: 0,
            awaiting_ack: None,
        }
    }

    /// Field this channel carries.
    pub fn field(&self) -> FieldName {
        self.field
    }

    /// Frame instance this channel is bound to.
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Expected sender origin.
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Reset generation the frame has not acknowledged yet.
    pub fn pending_reset(&self) -> Option<u32> {
        self.awaiting_ack
    }

    /// True once [`Self::destroy`] has run.
    pub fn is_destroyed(&self) -> bool {
        self.port.is_none()
    }

    /// Post a request to the frame.
    ///
    /// Never blocks and never fails from the caller's point of view: after
    /// destroy this is a no-op, and port failures are logged.
    pub fn send(&mut self, payload: HostPayload) {
        let Some(port) = self.port.as_mut() else {
            debug!(field = %self.field, frame = %self.frame, "send on destroyed channel ignored");
            return;
        };

        let request = HostRequest::new(self.field, self.next_sequence, payload);
        self.next_sequence = self.next_sequence.wrapping_add(1);

        let bytes = match request.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(field = %self.field, error = %e, "failed to encode host request");
                return;
            },
        };

        trace!(field = %self.field, opcode = request.payload.opcode().name(), "posting to frame");
        if let Err(e) = port.post(bytes) {
            warn!(field = %self.field, frame = %self.frame, error = %e, "post to frame failed");
        }
    }

    /// Ask the frame to clear its input.
    ///
    /// Inbound messages are refused with [`ChannelError::ResetPending`] until
    /// the frame acknowledges this generation. Returns the generation.
    pub fn reset(&mut self) -> u32 {
        self.reset_generation = self.reset_generation.wrapping_add(1);
        let generation = self.reset_generation;
        self.awaiting_ack = Some(generation);
        self.send(HostPayload::Reset(ResetRequest { generation }));
        generation
    }

    /// Register a listener for every message that passes validation.
    pub fn on_message(&mut self, handler: impl FnMut(&FieldMessage) + Send + 'static) {
        self.handlers.push(Box::new(handler));
    }

    /// Validate an inbound envelope and, if it passes, hand it to every
    /// listener and return it.
    pub fn receive(&mut self, inbound: &InboundMessage) -> Result<FieldMessage, ChannelError> {
        if self.port.is_none() {
            return Err(ChannelError::Destroyed { field: self.field });
        }

        if inbound.origin != self.origin {
            return Err(ChannelError::OriginMismatch {
                expected: self.origin.clone(),
                actual: inbound.origin.clone(),
            });
        }

        if inbound.source != self.frame {
            return Err(ChannelError::SourceMismatch {
                expected: self.frame,
                actual: inbound.source,
            });
        }

        let message = FieldMessage::decode(&inbound.data)?;

        if message.field != self.field {
            return Err(ChannelError::FieldMismatch { expected: self.field, actual: message.field });
        }

        if let Some(last) = self.last_inbound {
            if message.sequence <= last {
                return Err(ChannelError::StaleSequence { sequence: message.sequence, last });
            }
        }
        self.last_inbound = Some(message.sequence);

        if let Some(generation) = self.awaiting_ack {
            match &message.payload {
                FieldPayload::ResetAck(ResetAck { generation: acked }) if *acked == generation => {
                    self.awaiting_ack = None;
                },
                _ => return Err(ChannelError::ResetPending { generation }),
            }
        }

        for handler in &mut self.handlers {
            handler(&message);
        }

        Ok(message)
    }

    /// Release the link. Returns `false` if it was already destroyed.
    pub fn destroy(&mut self) -> bool {
        let Some(mut port) = self.port.take() else {
            return false;
        };

        port.close();
        self.handlers.clear();
        debug!(field = %self.field, frame = %self.frame, "channel destroyed");
        true
    }
}

impl Drop for FrameChannel {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for FrameChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameChannel")
            .field("field", &self.field)
            .field("frame", &self.frame)
            .field("origin", &self.origin)
            .field("destroyed", &self.is_destroyed())
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use securefield_proto::{ProtocolError, payloads::EncryptionRequest};

    use super::*;

    #[derive(Clone, Default)]
    struct RecordingPort {
        sent: Arc<Mutex<Vec<Bytes>>>,
        closed: Arc<AtomicUsize>,
    }

    impl FramePort for RecordingPort {
        fn post(&mut self, data: Bytes) -> Result<(), PortError> {
            self.sent.lock().unwrap().push(data);
            Ok(())
        }

        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FailingPort;

    impl FramePort for FailingPort {
        fn post(&mut self, _data: Bytes) -> Result<(), PortError> {
            Err(PortError::Detached)
        }
    }

    const ORIGIN: &str = "https://fields.example";

    fn channel(port: impl FramePort + 'static) -> FrameChannel {
        FrameChannel::new(FieldName::EncryptedCardNumber, FrameId(7), Origin::new(ORIGIN), port)
    }

    fn inbound(sequence: u32, payload: FieldPayload) -> InboundMessage {
        let message = FieldMessage::new(FieldName::EncryptedCardNumber, sequence, payload);
        InboundMessage {
            origin: Origin::new(ORIGIN),
            source: FrameId(7),
            data: message.encode().unwrap(),
        }
    }

    #[test]
    fn send_posts_encoded_request_with_increasing_sequence() {
        let port = RecordingPort::default();
        let mut channel = channel(port.clone());

        channel.send(HostPayload::Reset(ResetRequest { generation: 1 }));
        channel.send(HostPayload::RequestEncryption(EncryptionRequest { request_id: 4 }));

        let sent = port.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        let first = HostRequest::decode(&sent[0]).unwrap();
        let second = HostRequest::decode(&sent[1]).unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert_eq!(
            second.payload,
            HostPayload::RequestEncryption(EncryptionRequest { request_id: 4 })
        );
    }

    #[test]
    fn send_after_destroy_is_noop() {
        let port = RecordingPort::default();
        let mut channel = channel(port.clone());

        assert!(channel.destroy());
        channel.send(HostPayload::Reset(ResetRequest { generation: 1 }));

        assert!(port.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn double_destroy_closes_port_once() {
        let port = RecordingPort::default();
        let mut channel = channel(port.clone());

        assert!(channel.destroy());
        assert!(!channel.destroy());
        drop(channel);

        assert_eq!(port.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_destroys() {
        let port = RecordingPort::default();
        drop(channel(port.clone()));
        assert_eq!(port.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_port_is_absorbed() {
        let mut channel = channel(FailingPort);
        channel.send(HostPayload::Reset(ResetRequest { generation: 1 }));
        assert!(!channel.is_destroyed());
    }

    #[test]
    fn receive_accepts_valid_message_and_notifies_handlers() {
        let mut channel = channel(RecordingPort::default());
        let seen = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&seen);
        channel.on_message(move |msg| {
            assert_eq!(msg.payload, FieldPayload::valid(true));
            flag.store(true, Ordering::SeqCst);
        });

        let message = channel.receive(&inbound(0, FieldPayload::valid(true))).unwrap();

        assert_eq!(message.payload, FieldPayload::valid(true));
        assert!(seen.load(Ordering::SeqCst));
    }

    #[test]
    fn receive_rejects_foreign_origin_without_calling_handler() {
        let mut channel = channel(RecordingPort::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        channel.on_message(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut message = inbound(0, FieldPayload::valid(true));
        message.origin = Origin::new("https://evil.example");

        assert!(matches!(channel.receive(&message), Err(ChannelError::OriginMismatch { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn receive_rejects_other_frame() {
        let mut channel = channel(RecordingPort::default());
        let mut message = inbound(0, FieldPayload::filled(true));
        message.source = FrameId(8);

        assert_eq!(
            channel.receive(&message),
            Err(ChannelError::SourceMismatch { expected: FrameId(7), actual: FrameId(8) })
        );
    }

    #[test]
    fn receive_rejects_message_for_other_field() {
        let mut channel = channel(RecordingPort::default());
        let message =
            FieldMessage::new(FieldName::EncryptedSecurityCode, 0, FieldPayload::valid(true));
        let raw = InboundMessage {
            origin: Origin::new(ORIGIN),
            source: FrameId(7),
            data: message.encode().unwrap(),
        };

        assert!(matches!(channel.receive(&raw), Err(ChannelError::FieldMismatch { .. })));
    }

    #[test]
    fn receive_rejects_replayed_sequence() {
        let mut channel = channel(RecordingPort::default());
        channel.receive(&inbound(3, FieldPayload::focused(true))).unwrap();

        assert_eq!(
            channel.receive(&inbound(3, FieldPayload::focused(false))),
            Err(ChannelError::StaleSequence { sequence: 3, last: 3 })
        );
        assert!(channel.receive(&inbound(4, FieldPayload::focused(false))).is_ok());
    }

    #[test]
    fn receive_rejects_garbage() {
        let mut channel = channel(RecordingPort::default());
        let raw = InboundMessage {
            origin: Origin::new(ORIGIN),
            source: FrameId(7),
            data: Bytes::from_static(b"definitely not an envelope"),
        };

        assert!(matches!(
            channel.receive(&raw),
            Err(ChannelError::Protocol(ProtocolError::BadMagic(_)))
        ));
    }

    #[test]
    fn reset_refuses_messages_until_acknowledged() {
        let port = RecordingPort::default();
        let mut channel = channel(port.clone());
        channel.receive(&inbound(0, FieldPayload::filled(true))).unwrap();

        assert_eq!(channel.reset(), 1);
        let sent = port.sent.lock().unwrap().clone();
        assert_eq!(
            HostRequest::decode(&sent[0]).unwrap().payload,
            HostPayload::Reset(ResetRequest { generation: 1 })
        );

        assert_eq!(
            channel.receive(&inbound(1, FieldPayload::valid(true))),
            Err(ChannelError::ResetPending { generation: 1 })
        );
        assert_eq!(
            channel.receive(&inbound(2, FieldPayload::reset_ack(0))),
            Err(ChannelError::ResetPending { generation: 1 })
        );

        let ack = channel.receive(&inbound(3, FieldPayload::reset_ack(1))).unwrap();
        assert_eq!(ack.payload, FieldPayload::reset_ack(1));
        assert_eq!(channel.pending_reset(), None);
        assert!(channel.receive(&inbound(4, FieldPayload::filled(true))).is_ok());
    }

    #[test]
    fn second_reset_needs_its_own_ack() {
        let mut channel = channel(RecordingPort::default());
        channel.reset();
        channel.reset();

        assert_eq!(
            channel.receive(&inbound(0, FieldPayload::reset_ack(1))),
            Err(ChannelError::ResetPending { generation: 2 })
        );
        assert!(channel.receive(&inbound(1, FieldPayload::reset_ack(2))).is_ok());
    }

    #[test]
    fn receive_after_destroy_fails() {
        let mut channel = channel(RecordingPort::default());
        channel.destroy();

        assert_eq!(
            channel.receive(&inbound(0, FieldPayload::valid(true))),
            Err(ChannelError::Destroyed { field: FieldName::EncryptedCardNumber })
        );
    }
}
