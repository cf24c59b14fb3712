//! Simulated sandboxed field frames.
//!
//! A [`SimFrame`] plays the page that hosts one secure input: it keeps the
//! plaintext the shopper typed, validates it, detects the card brand and
//! returns seeded pseudo-random tokens on request. Everything it sends goes
//! through an [`Outbox`], either a queue a test drains by hand or a channel
//! feeding a `Runtime`.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use securefield_core::{
    FieldRegistry, FrameChannel, FrameId, FramePort, InboundMessage, Origin, PortError,
};
use securefield_proto::{
    EncryptedToken, FieldMessage, FieldName, FieldPayload, FieldPolicy, HostPayload, HostRequest,
};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Origin every simulated frame is served from.
pub const FRAME_ORIGIN: &str = "https://securefields.sim";

/// Where frame messages go.
#[derive(Debug, Clone)]
pub enum Outbox {
    /// In-memory queue, drained by the test.
    Queue(Arc<Mutex<VecDeque<InboundMessage>>>),
    /// Channel into a runtime.
    Channel(mpsc::UnboundedSender<InboundMessage>),
}

impl Outbox {
    /// Empty queue outbox.
    pub fn queue() -> Self {
        Self::Queue(Arc::new(Mutex::new(VecDeque::new())))
    }

    /// Channel outbox and the receiver to hand to a runtime.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<InboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::Channel(tx), rx)
    }

    /// Take everything queued. Always empty for a channel outbox.
    pub fn drain(&self) -> Vec<InboundMessage> {
        match self {
            Self::Queue(queue) => lock(queue).drain(..).collect(),
            Self::Channel(_) => Vec::new(),
        }
    }

    fn push(&self, messages: Vec<InboundMessage>) {
        match self {
            Self::Queue(queue) => lock(queue).extend(messages),
            Self::Channel(tx) => {
                for message in messages {
                    if tx.send(message).is_err() {
                        debug!("runtime gone; frame message dropped");
                    }
                }
            },
        }
    }
}

/// One sandboxed input.
#[derive(Debug)]
pub struct SimFrame {
    field: FieldName,
    frame: FrameId,
    origin: Origin,
    policy: FieldPolicy,
    input: String,
    filled: bool,
    valid: bool,
    error: Option<String>,
    brand: Option<String>,
    sequence: u32,
    responsive: bool,
    closed: bool,
    requests: Vec<u32>,
    rng: ChaCha8Rng,
}

impl SimFrame {
    /// Frame for `field`, identified by the field's wire id.
    pub fn new(field: FieldName, seed: u64) -> Self {
        Self {
            field,
            frame: FrameId(u64::from(field.wire_id())),
            origin: Origin::new(FRAME_ORIGIN),
            policy: FieldPolicy::Required,
            input: String::new(),
            filled: false,
            valid: false,
            error: None,
            brand: None,
            sequence: 0,
            responsive: true,
            closed: false,
            requests: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed ^ u64::from(field.wire_id())),
        }
    }

    /// Field this frame hosts.
    pub fn field(&self) -> FieldName {
        self.field
    }

    /// Frame identity.
    pub fn frame_id(&self) -> FrameId {
        self.frame
    }

    /// Policy last applied by the host.
    pub fn policy(&self) -> FieldPolicy {
        self.policy
    }

    /// Current plaintext.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Encryption request ids received, in order.
    pub fn requests(&self) -> &[u32] {
        &self.requests
    }

    /// True once the host closed the link.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop (or resume) answering encryption requests.
    pub fn set_responsive(&mut self, responsive: bool) {
        self.responsive = responsive;
    }

    /// Replace the input and report whatever changed.
    pub fn type_text(&mut self, text: &str) -> Vec<InboundMessage> {
        self.input = text.to_owned();
        let mut out = Vec::new();

        if self.field == FieldName::EncryptedCardNumber {
            let brand = detect_brand(&self.input).map(str::to_owned);
            if brand != self.brand {
                self.brand.clone_from(&brand);
                out.extend(self.emit(FieldPayload::brand(brand)));
            }
        }

        let filled = !self.input.is_empty();
        if filled != self.filled {
            self.filled = filled;
            out.extend(self.emit(FieldPayload::filled(filled)));
        }

        let verdict = validate_input(self.field, &self.input);
        let valid = verdict.is_ok();
        if valid != self.valid {
            self.valid = valid;
            out.extend(self.emit(FieldPayload::valid(valid)));
            if valid {
                let token = self.token();
                out.extend(self.emit(FieldPayload::encrypted(None, token)));
            }
        }

        let error = verdict.err().filter(|_| filled).map(str::to_owned);
        if error != self.error {
            self.error.clone_from(&error);
            out.extend(self.emit(FieldPayload::error(error)));
        }

        out
    }

    /// Report focus.
    pub fn focus(&mut self, focused: bool) -> Vec<InboundMessage> {
        self.emit(FieldPayload::focused(focused)).into_iter().collect()
    }

    /// Act on a host request and return the replies.
    pub fn handle_request(&mut self, request: &HostRequest) -> Vec<InboundMessage> {
        match &request.payload {
            HostPayload::RequestEncryption(req) => {
                self.requests.push(req.request_id);
                if !self.responsive {
                    trace!(field = %self.field, request_id = req.request_id, "frame not answering");
                    return Vec::new();
                }
                if !self.valid {
                    let code = validate_input(self.field, &self.input).err().map(str::to_owned);
                    return self.emit(FieldPayload::error(code)).into_iter().collect();
                }
                let token = self.token();
                self.emit(FieldPayload::encrypted(Some(req.request_id), token))
                    .into_iter()
                    .collect()
            },
            HostPayload::ApplyPolicy(update) => {
                self.policy = update.policy;
                Vec::new()
            },
            HostPayload::Reset(reset) => {
                self.input.clear();
                self.filled = false;
                self.valid = false;
                self.error = None;
                self.emit(FieldPayload::reset_ack(reset.generation)).into_iter().collect()
            },
        }
    }

    fn token(&mut self) -> EncryptedToken {
        EncryptedToken::new(format!("sf1${}${:016x}", self.field.as_str(), self.rng.next_u64()))
    }

    fn emit(&mut self, payload: FieldPayload) -> Option<InboundMessage> {
        let message = FieldMessage::new(self.field, self.sequence, payload);
        self.sequence = self.sequence.wrapping_add(1);

        match message.encode() {
            Ok(data) => {
                Some(InboundMessage { origin: self.origin.clone(), source: self.frame, data })
            },
            Err(e) => {
                warn!(field = %self.field, error = %e, "frame failed to encode message");
                None
            },
        }
    }
}

/// Shared handle to a frame and the outbox its messages go to.
#[derive(Debug, Clone)]
pub struct FrameHandle {
    frame: Arc<Mutex<SimFrame>>,
    outbox: Outbox,
}

impl FrameHandle {
    /// Wrap `frame`.
    pub fn new(frame: SimFrame, outbox: Outbox) -> Self {
        Self { frame: Arc::new(Mutex::new(frame)), outbox }
    }

    /// Shopper typed `text` into this field.
    pub fn type_text(&self, text: &str) {
        let messages = lock(&self.frame).type_text(text);
        self.outbox.push(messages);
    }

    /// Shopper moved focus in or out.
    pub fn focus(&self, focused: bool) {
        let messages = lock(&self.frame).focus(focused);
        self.outbox.push(messages);
    }

    /// Stop (or resume) answering encryption requests.
    pub fn set_responsive(&self, responsive: bool) {
        lock(&self.frame).set_responsive(responsive);
    }

    /// Inspect the frame.
    pub fn frame(&self) -> MutexGuard<'_, SimFrame> {
        lock(&self.frame)
    }

    /// Port for the host side of the link.
    pub fn port(&self) -> SimFramePort {
        SimFramePort { handle: self.clone() }
    }
}

/// Host-side port delivering requests straight into a [`SimFrame`].
#[derive(Debug)]
pub struct SimFramePort {
    handle: FrameHandle,
}

impl FramePort for SimFramePort {
    fn post(&mut self, data: Bytes) -> Result<(), PortError> {
        let request =
            HostRequest::decode(&data).map_err(|e| PortError::Rejected(e.to_string()))?;

        let replies = {
            let mut frame = self.handle.frame();
            if frame.closed {
                return Err(PortError::Detached);
            }
            frame.handle_request(&request)
        };
        self.handle.outbox.push(replies);
        Ok(())
    }

    fn close(&mut self) {
        self.handle.frame().closed = true;
    }
}

/// Create a frame for `field`, register it with `registry` and return its
/// handle.
pub fn attach_frame(
    registry: &mut FieldRegistry,
    field: FieldName,
    outbox: &Outbox,
    seed: u64,
) -> FrameHandle {
    let frame = SimFrame::new(field, seed);
    let frame_id = frame.frame_id();
    let handle = FrameHandle::new(frame, outbox.clone());

    let channel = FrameChannel::new(field, frame_id, Origin::new(FRAME_ORIGIN), handle.port());
    registry.register_field(field, channel);
    handle
}

/// Brand the card-number frame reports for a partial number.
pub fn detect_brand(number: &str) -> Option<&'static str> {
    let brand = if number.starts_with("6703") {
        "bcmc"
    } else if number.starts_with("6759") || number.starts_with("50") {
        "maestro"
    } else if number.starts_with('4') {
        "visa"
    } else if ["51", "52", "53", "54", "55"].iter().any(|prefix| number.starts_with(prefix)) {
        "mc"
    } else if number.starts_with("34") || number.starts_with("37") {
        "amex"
    } else if number.starts_with('9') {
        "korean_local_card"
    } else {
        return None;
    };
    Some(brand)
}

/// Validate plaintext the way the field page does. Empty input is never
/// valid; the error code only matters once something was typed.
pub fn validate_input(field: FieldName, input: &str) -> Result<(), &'static str> {
    let digits = !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit());

    match field {
        FieldName::EncryptedCardNumber => {
            if !digits {
                Err("error.va.sf-cc-num.invalid")
            } else if input.len() < 12 {
                Err("error.va.sf-cc-num.incomplete")
            } else if input.len() > 19 || !luhn(input) {
                Err("error.va.sf-cc-num.invalid")
            } else {
                Ok(())
            }
        },
        FieldName::EncryptedExpiryMonth => {
            let month = input.parse::<u8>().ok().filter(|_| digits && input.len() <= 2);
            if month.is_some_and(|m| (1..=12).contains(&m)) {
                Ok(())
            } else {
                Err("error.va.sf-cc-mth.invalid")
            }
        },
        FieldName::EncryptedExpiryYear => {
            if digits && matches!(input.len(), 2 | 4) {
                Ok(())
            } else {
                Err("error.va.sf-cc-yr.invalid")
            }
        },
        FieldName::EncryptedSecurityCode => {
            if digits && matches!(input.len(), 3 | 4) {
                Ok(())
            } else {
                Err("error.va.sf-cc-cvc.invalid")
            }
        },
        FieldName::EncryptedPassword => {
            if digits && input.len() == 2 {
                Ok(())
            } else {
                Err("error.va.sf-kcp-pwd.invalid")
            }
        },
        FieldName::HolderName => {
            if input.trim().is_empty() {
                Err("error.va.sf-ch-name.invalid")
            } else {
                Ok(())
            }
        },
    }
}

fn luhn(number: &str) -> bool {
    let sum: u32 = number
        .bytes()
        .rev()
        .map(|b| u32::from(b - b'0'))
        .enumerate()
        .map(|(i, d)| if i % 2 == 1 { if d * 2 > 9 { d * 2 - 9 } else { d * 2 } } else { d })
        .sum();
    sum % 10 == 0
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
