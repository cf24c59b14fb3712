//! Canonical per-field state.
//!
//! [`FieldRegistry`] owns one [`FieldState`] and one [`FrameChannel`] per
//! registered field and is the only place either is mutated. State changes
//! come from validated inbound envelopes and from policy re-evaluation when
//! the detected brand or the configuration changes.
//!
//! # Encryption rounds
//!
//! ```text
//! request_encrypted_data(now)
//!     │  REQUEST_ENCRYPTION{id} → every contributing frame
//!     ▼
//! ┌──────────────┐  FIELD_ENCRYPTED_DATA{id}   ┌──────────┐
//! │ awaiting = S │────────────────────────────>│ S empty  │── poll: Ok(snapshot)
//! └──────────────┘   (removes field from S)    └──────────┘
//!     │
//!     │ now >= deadline
//!     ▼
//! poll: Err(EncryptionTimeout), partial tokens dropped
//! ```
//!
//! The target set is fixed when the round opens. Field changes during the
//! round show up in the next aggregate, not in the round.

use std::{
    collections::{BTreeMap, BTreeSet},
    time::{Duration, Instant},
};

use securefield_proto::{
    EncryptedToken, FieldFlags, FieldName, FieldPayload, FieldPolicy, HostPayload,
    payloads::{
        BrandDetected, EncryptedData, EncryptionRequest, FieldErrorBody, FilledChange, FocusChange,
        PolicyUpdate, ResetAck, ValidChange,
    },
};
use tracing::{debug, info, warn};

use crate::{
    channel::{FrameChannel, InboundMessage},
    error::RegistryError,
    policy::{CardConfiguration, PolicyResolver},
};

/// Registry settings.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long an encryption round waits for every frame to answer.
    pub encryption_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { encryption_timeout: Duration::from_secs(10) }
    }
}

/// What the host knows about one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldState {
    /// Filled / valid / focused as last reported by the frame.
    pub flags: FieldFlags,
    /// Error code last reported by the frame.
    pub error_code: Option<String>,
    /// Current requirement policy.
    pub policy: FieldPolicy,
    /// Token the frame pushed on its own after becoming valid.
    pub encrypted: Option<EncryptedToken>,
}

impl FieldState {
    /// Fresh state for a newly registered field.
    pub fn new(policy: FieldPolicy) -> Self {
        Self { flags: FieldFlags::empty(), error_code: None, policy, encrypted: None }
    }

    /// Frame reports a non-empty input.
    pub fn filled(&self) -> bool {
        self.flags.contains(FieldFlags::FILLED)
    }

    /// Frame reports a valid input.
    pub fn valid(&self) -> bool {
        self.flags.contains(FieldFlags::VALID)
    }

    /// Frame reports focus.
    pub fn focused(&self) -> bool {
        self.flags.contains(FieldFlags::FOCUSED)
    }

    /// Validity as it counts toward the form.
    ///
    /// Hidden fields always count as valid. Optional fields count as valid
    /// while empty.
    pub fn is_effectively_valid(&self) -> bool {
        match self.policy {
            FieldPolicy::Hidden => true,
            FieldPolicy::Required => self.valid(),
            FieldPolicy::Optional => self.valid() || !self.filled(),
        }
    }

    /// Fill state as it counts toward the form. Hidden fields count as filled.
    pub fn is_effectively_filled(&self) -> bool {
        self.policy.is_hidden() || self.filled()
    }

    /// Whether the field is encrypted on submit.
    pub fn contributes(&self) -> bool {
        match self.policy {
            FieldPolicy::Hidden => false,
            FieldPolicy::Required => true,
            FieldPolicy::Optional => self.filled(),
        }
    }

    fn reset(&mut self) {
        self.flags.remove(FieldFlags::FILLED | FieldFlags::VALID);
        self.error_code = None;
        self.encrypted = None;
    }
}

/// Tokens from one completed encryption round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSnapshot {
    /// Round identifier.
    pub request_id: u32,
    /// One token per targeted field.
    pub tokens: BTreeMap<FieldName, EncryptedToken>,
}

#[derive(Debug)]
struct FieldEntry {
    state: FieldState,
    channel: FrameChannel,
}

#[derive(Debug)]
struct EncryptionRound {
    request_id: u32,
    started: Instant,
    deadline: Instant,
    awaiting: BTreeSet<FieldName>,
    tokens: BTreeMap<FieldName, EncryptedToken>,
}

type StateObserver = Box<dyn FnMut(FieldName, &FieldState) + Send>;

/// Owner of all field state and frame channels.
pub struct FieldRegistry {
    config: CardConfiguration,
    settings: RegistryConfig,
    brand: Option<String>,
    fields: BTreeMap<FieldName, FieldEntry>,
    observers: Vec<StateObserver>,
    round: Option<EncryptionRound>,
    next_request_id: u32,
    revision: u64,
}

impl FieldRegistry {
    /// Create an empty registry.
    pub fn new(config: CardConfiguration, settings: RegistryConfig) -> Self {
        Self {
            config,
            settings,
            brand: None,
            fields: BTreeMap::new(),
            observers: Vec::new(),
            round: None,
            next_request_id: 1,
            revision: 0,
        }
    }

    /// Card configuration policies are resolved against.
    pub fn configuration(&self) -> &CardConfiguration {
        &self.config
    }

    /// Registry settings.
    pub fn settings(&self) -> &RegistryConfig {
        &self.settings
    }

    /// Brand last reported by the card-number frame.
    pub fn brand(&self) -> Option<&str> {
        self.brand.as_deref()
    }

    /// Counter bumped on every observable change; used to cache projections.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Register a listener called after every field state change.
    pub fn subscribe(&mut self, observer: impl FnMut(FieldName, &FieldState) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// State of one field.
    pub fn field(&self, name: FieldName) -> Option<&FieldState> {
        self.fields.get(&name).map(|entry| &entry.state)
    }

    /// Channel of one field.
    pub fn channel(&self, name: FieldName) -> Option<&FrameChannel> {
        self.fields.get(&name).map(|entry| &entry.channel)
    }

    /// Every registered field, in [`FieldName`] order.
    pub fn fields(&self) -> impl Iterator<Item = (FieldName, &FieldState)> {
        self.fields.iter().map(|(name, entry)| (*name, &entry.state))
    }

    /// True when `name` is registered.
    pub fn is_registered(&self, name: FieldName) -> bool {
        self.fields.contains_key(&name)
    }

    /// Start tracking a field. Replaces (and destroys) any previous channel
    /// for the same name.
    pub fn register_field(&mut self, name: FieldName, mut channel: FrameChannel) {
        let policy = PolicyResolver::resolve(&self.config, self.brand.as_deref(), name);
        channel.send(HostPayload::ApplyPolicy(PolicyUpdate { policy }));

        let entry = FieldEntry { state: FieldState::new(policy), channel };
        if let Some(mut previous) = self.fields.insert(name, entry) {
            previous.channel.destroy();
            debug!(field = %name, "field re-registered, previous channel destroyed");
        }

        debug!(field = %name, ?policy, "field registered");
        self.touch(name);
    }

    /// Stop tracking a field and destroy its channel.
    ///
    /// Observers see the field's last state once more. Returns `false` if the
    /// field was not registered.
    pub fn unregister_field(&mut self, name: FieldName) -> bool {
        let Some(mut entry) = self.fields.remove(&name) else {
            return false;
        };

        entry.channel.destroy();
        debug!(field = %name, "field unregistered");
        self.revision += 1;
        for observer in &mut self.observers {
            observer(name, &entry.state);
        }
        true
    }

    /// Route a raw envelope to the channel bound to its source frame,
    /// validate it there and apply it.
    ///
    /// Returns whether observable state changed.
    pub fn handle_inbound(&mut self, inbound: &InboundMessage) -> Result<bool, RegistryError> {
        let Some((name, entry)) =
            self.fields.iter_mut().find(|(_, entry)| entry.channel.frame() == inbound.source)
        else {
            warn!(source = %inbound.source, "envelope from unknown frame dropped");
            return Err(RegistryError::UnknownSource(inbound.source));
        };
        let name = *name;

        let message = entry.channel.receive(inbound).inspect_err(|e| {
            warn!(field = %name, error = %e, "envelope rejected by channel");
        })?;

        self.apply_message(name, message.payload)
    }

    /// Apply one validated message to the named field.
    ///
    /// Returns whether observable state changed. Encryption responses that
    /// belong to a round are collected into the round and do not count as a
    /// change.
    pub fn apply_message(
        &mut self,
        name: FieldName,
        payload: FieldPayload,
    ) -> Result<bool, RegistryError> {
        let Some(entry) = self.fields.get_mut(&name) else {
            warn!(field = %name, "message for unregistered field ignored");
            return Err(RegistryError::FieldNotRegistered(name));
        };
        let state = &mut entry.state;

        let changed = match payload {
            FieldPayload::ValidChange(ValidChange { valid }) => {
                if !valid {
                    state.encrypted = None;
                }
                set_flag(state, FieldFlags::VALID, valid)
            },
            FieldPayload::FilledChange(FilledChange { filled }) => {
                set_flag(state, FieldFlags::FILLED, filled)
            },
            FieldPayload::FocusChange(FocusChange { focused }) => {
                set_flag(state, FieldFlags::FOCUSED, focused)
            },
            FieldPayload::Error(FieldErrorBody { code }) => {
                let changed = state.error_code != code;
                state.error_code = code;
                changed
            },
            FieldPayload::EncryptedData(EncryptedData { request_id: None, token }) => {
                state.encrypted = Some(token);
                true
            },
            FieldPayload::EncryptedData(EncryptedData { request_id: Some(id), token }) => {
                self.record_encryption(name, id, token);
                return Ok(false);
            },
            FieldPayload::Brand(BrandDetected { brand }) => {
                return Ok(self.set_brand(brand));
            },
            FieldPayload::ResetAck(ResetAck { generation }) => {
                debug!(field = %name, generation, "frame acknowledged reset");
                false
            },
        };

        if changed {
            self.touch(name);
        }
        Ok(changed)
    }

    /// Record a new detected brand and re-evaluate every policy.
    ///
    /// Returns `false` if the brand did not change.
    pub fn set_brand(&mut self, brand: Option<String>) -> bool {
        if self.brand == brand {
            return false;
        }

        debug!(from = ?self.brand, to = ?brand, "brand changed");
        self.brand = brand;
        self.reevaluate_policies();
        self.revision += 1;
        true
    }

    /// Replace the configuration and re-evaluate every policy.
    pub fn set_configuration(&mut self, config: CardConfiguration) {
        self.config = config;
        self.reevaluate_policies();
        self.revision += 1;
    }

    /// Open an encryption round over every field that contributes data:
    /// visible fields, except optional ones left empty.
    ///
    /// Resolve it with [`Self::poll_encryption`].
    pub fn request_encrypted_data(&mut self, now: Instant) -> Result<u32, RegistryError> {
        if let Some(round) = &self.round {
            return Err(RegistryError::EncryptionInFlight(round.request_id));
        }

        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);

        let mut awaiting = BTreeSet::new();
        for (name, entry) in &mut self.fields {
            if !entry.state.contributes() {
                continue;
            }
            entry.channel.send(HostPayload::RequestEncryption(EncryptionRequest { request_id }));
            awaiting.insert(*name);
        }

        debug!(request_id, fields = awaiting.len(), "encryption round opened");
        self.round = Some(EncryptionRound {
            request_id,
            started: now,
            deadline: now + self.settings.encryption_timeout,
            awaiting,
            tokens: BTreeMap::new(),
        });

        Ok(request_id)
    }

    /// Resolve the open encryption round if it is complete or expired.
    ///
    /// `None` while no round is open or the round is still waiting.
    pub fn poll_encryption(
        &mut self,
        now: Instant,
    ) -> Option<Result<EncryptedSnapshot, RegistryError>> {
        let round = self.round.as_ref()?;

        if round.awaiting.is_empty() {
            let round = self.round.take()?;
            debug!(request_id = round.request_id, "encryption round complete");
            let snapshot = EncryptedSnapshot { request_id: round.request_id, tokens: round.tokens };
            return Some(Ok(snapshot));
        }

        if now >= round.deadline {
            let round = self.round.take()?;
            let missing: Vec<FieldName> = round.awaiting.into_iter().collect();
            warn!(
                request_id = round.request_id,
                ?missing,
                discarded = round.tokens.len(),
                "encryption round timed out"
            );
            return Some(Err(RegistryError::EncryptionTimeout {
                missing,
                waited: now.saturating_duration_since(round.started),
            }));
        }

        None
    }

    /// Drop the open encryption round, if any. Late responses to it are
    /// ignored.
    pub fn abandon_encryption(&mut self) -> Option<u32> {
        let round = self.round.take()?;
        debug!(
            request_id = round.request_id,
            pending = round.awaiting.len(),
            "encryption round abandoned"
        );
        Some(round.request_id)
    }

    /// Deadline of the open encryption round.
    pub fn encryption_deadline(&self) -> Option<Instant> {
        self.round.as_ref().map(|round| round.deadline)
    }

    /// True while an encryption round is open.
    pub fn is_encrypting(&self) -> bool {
        self.round.is_some()
    }

    /// Destroy every channel and drop any open round.
    ///
    /// Field state is kept for inspection. Returns how many channels were
    /// actually destroyed by this call.
    pub fn teardown(&mut self) -> usize {
        let destroyed = self
            .fields
            .values_mut()
            .map(|entry| entry.channel.destroy())
            .filter(|destroyed| *destroyed)
            .count();

        if let Some(round) = self.round.take() {
            debug!(request_id = round.request_id, "encryption round abandoned on teardown");
        }

        self.revision += 1;
        info!(destroyed, "field registry torn down");
        destroyed
    }

    fn record_encryption(&mut self, name: FieldName, request_id: u32, token: EncryptedToken) {
        if let Some(round) = self.round.as_mut().filter(|round| round.request_id == request_id) {
            if round.awaiting.remove(&name) {
                round.tokens.insert(name, token);
                return;
            }
        }
        debug!(field = %name, request_id, "late encryption response dropped");
    }

    fn reevaluate_policies(&mut self) {
        let brand = self.brand.as_deref();
        let mut changed = Vec::new();

        for (name, entry) in &mut self.fields {
            let policy = PolicyResolver::resolve(&self.config, brand, *name);
            let previous = entry.state.policy;
            if policy == previous {
                continue;
            }

            if previous.is_hidden() {
                entry.state.reset();
                entry.channel.reset();
            }
            entry.state.policy = policy;
            entry.channel.send(HostPayload::ApplyPolicy(PolicyUpdate { policy }));

            debug!(field = %name, from = ?previous, to = ?policy, "policy changed");
            changed.push(*name);
        }

        for name in changed {
            self.touch(name);
        }
    }

    fn touch(&mut self, name: FieldName) {
        self.revision += 1;
        if let Some(entry) = self.fields.get(&name) {
            for observer in &mut self.observers {
                observer(name, &entry.state);
            }
        }
    }
}

fn set_flag(state: &mut FieldState, flag: FieldFlags, on: bool) -> bool {
    let changed = state.flags.contains(flag) != on;
    state.flags.set(flag, on);
    changed
}

impl std::fmt::Debug for FieldRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRegistry")
            .field("brand", &self.brand)
            .field("fields", &self.fields)
            .field("round", &self.round)
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}
