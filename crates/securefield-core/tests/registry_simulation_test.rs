//! Registry tests against simulated frames.
//!
//! Every field gets a [`SimFrame`](securefield_harness::SimFrame) behind a
//! real [`FrameChannel`], so requests and replies cross the envelope codec
//! in both directions.

use std::time::Duration;

use securefield_core::{
    CardConfiguration, ChannelError, Environment, FieldRegistry, FrameId, InboundMessage, Origin,
    RegistryConfig, RegistryError, ValidationAggregator,
};
use securefield_harness::{FrameHandle, Outbox, SimEnv, attach_frame, valid_input};
use securefield_proto::{FieldMessage, FieldName, FieldPayload, FieldPolicy};

const CARD_FIELDS: [FieldName; 4] = [
    FieldName::EncryptedCardNumber,
    FieldName::EncryptedExpiryMonth,
    FieldName::EncryptedExpiryYear,
    FieldName::EncryptedSecurityCode,
];

struct World {
    env: SimEnv,
    registry: FieldRegistry,
    outbox: Outbox,
    frames: Vec<FrameHandle>,
}

impl World {
    fn new(config: CardConfiguration) -> Self {
        let mut registry = FieldRegistry::new(config, RegistryConfig::default());
        let outbox = Outbox::queue();
        let frames =
            CARD_FIELDS.iter().map(|f| attach_frame(&mut registry, *f, &outbox, 42)).collect();
        Self { env: SimEnv::new(), registry, outbox, frames }
    }

    fn frame(&self, field: FieldName) -> &FrameHandle {
        &self.frames[CARD_FIELDS.iter().position(|f| *f == field).unwrap()]
    }

    fn deliver(&mut self) -> Vec<Result<bool, RegistryError>> {
        let mut results = Vec::new();
        loop {
            let pending = self.outbox.drain();
            if pending.is_empty() {
                return results;
            }
            results.extend(pending.iter().map(|m| self.registry.handle_inbound(m)));
        }
    }

    fn type_into(&mut self, field: FieldName, text: &str) {
        self.frame(field).type_text(text);
        self.deliver();
    }

    fn fill_valid(&mut self) {
        for field in CARD_FIELDS {
            self.type_into(field, valid_input(field));
        }
    }
}

#[test]
fn frames_receive_initial_policy() {
    let world = World::new(CardConfiguration { hide_cvc: true, ..CardConfiguration::default() });

    assert_eq!(world.frame(FieldName::EncryptedCardNumber).frame().policy(), FieldPolicy::Required);
    assert_eq!(world.frame(FieldName::EncryptedSecurityCode).frame().policy(), FieldPolicy::Hidden);
}

#[test]
fn typing_reaches_registry_state() {
    let mut world = World::new(CardConfiguration::default());

    world.type_into(FieldName::EncryptedCardNumber, "4111");
    let state = world.registry.field(FieldName::EncryptedCardNumber).unwrap();
    assert!(state.filled());
    assert!(!state.valid());
    assert_eq!(state.error_code.as_deref(), Some("error.va.sf-cc-num.incomplete"));
    assert_eq!(world.registry.brand(), Some("visa"));

    world.type_into(FieldName::EncryptedCardNumber, "4111111111111111");
    let state = world.registry.field(FieldName::EncryptedCardNumber).unwrap();
    assert!(state.valid());
    assert!(state.error_code.is_none());
    assert!(state.encrypted.is_some());
}

#[test]
fn full_round_collects_every_token() {
    let mut world = World::new(CardConfiguration::default());
    world.fill_valid();

    let request_id = world.registry.request_encrypted_data(world.env.now()).unwrap();
    world.deliver();

    let snapshot = world.registry.poll_encryption(world.env.now()).unwrap().unwrap();
    assert_eq!(snapshot.request_id, request_id);
    assert_eq!(snapshot.tokens.len(), 4);
    for field in CARD_FIELDS {
        assert_eq!(world.frame(field).frame().requests(), [request_id]);
    }
}

#[test]
fn silent_frame_fails_whole_round() {
    let mut world = World::new(CardConfiguration::default());
    world.fill_valid();
    world.frame(FieldName::EncryptedExpiryYear).set_responsive(false);

    world.registry.request_encrypted_data(world.env.now()).unwrap();
    world.deliver();
    assert!(world.registry.poll_encryption(world.env.now()).is_none());

    world.env.advance(Duration::from_secs(10));
    let err = world.registry.poll_encryption(world.env.now()).unwrap().unwrap_err();

    assert_eq!(err, RegistryError::EncryptionTimeout {
        missing: vec![FieldName::EncryptedExpiryYear],
        waited: Duration::from_secs(10),
    });
    assert!(!world.registry.is_encrypting());
}

#[test]
fn brand_switch_resets_returning_cvc_frame() {
    let mut world = World::new(CardConfiguration::default());
    world.fill_valid();

    world.type_into(FieldName::EncryptedCardNumber, "6703444444444449");
    assert_eq!(
        world.frame(FieldName::EncryptedSecurityCode).frame().policy(),
        FieldPolicy::Hidden
    );
    assert!(ValidationAggregator::compute(&world.registry).is_valid);

    world.type_into(FieldName::EncryptedCardNumber, "4111111111111111");
    assert_eq!(world.frame(FieldName::EncryptedSecurityCode).frame().input(), "");
    let form = ValidationAggregator::compute(&world.registry);
    assert!(!form.is_valid);
    assert_eq!(form.error(FieldName::EncryptedSecurityCode), Some("error.va.incomplete"));
}

#[test]
fn input_sent_before_reset_ack_does_not_survive_reset() {
    let mut world = World::new(CardConfiguration::default());
    world.type_into(FieldName::EncryptedCardNumber, "6703444444444449");
    let cvc = FieldName::EncryptedSecurityCode;
    assert_eq!(world.registry.field(cvc).unwrap().policy, FieldPolicy::Hidden);

    // Both frames report before the host reacts to either.
    let visa = valid_input(FieldName::EncryptedCardNumber);
    world.frame(FieldName::EncryptedCardNumber).type_text(visa);
    world.frame(cvc).type_text("737");
    let results = world.deliver();

    assert!(results.contains(&Err(RegistryError::Channel(ChannelError::ResetPending {
        generation: 1
    }))));
    assert_eq!(world.frame(cvc).frame().input(), "");
    assert_eq!(world.registry.channel(cvc).unwrap().pending_reset(), None);

    let state = world.registry.field(cvc).unwrap();
    assert_eq!(state.policy, FieldPolicy::Required);
    assert!(!state.filled());
    assert!(!state.valid());
    assert!(state.encrypted.is_none());

    let form = ValidationAggregator::compute(&world.registry);
    assert!(!form.is_valid);
    assert!(!form.data.contains_key(&cvc));
    assert_eq!(form.error(cvc), Some("error.va.incomplete"));

    world.type_into(cvc, "737");
    assert!(world.registry.field(cvc).unwrap().valid());
}

#[test]
fn replayed_envelope_is_rejected() {
    let mut world = World::new(CardConfiguration::default());

    world.frame(FieldName::EncryptedExpiryMonth).type_text("03");
    let pending = world.outbox.drain();
    assert!(!pending.is_empty());
    for message in &pending {
        assert!(world.registry.handle_inbound(message).is_ok());
    }

    let replay = world.registry.handle_inbound(&pending[0]);
    assert!(matches!(replay, Err(RegistryError::Channel(_))));
}

#[test]
fn forged_origin_is_rejected() {
    let mut world = World::new(CardConfiguration::default());
    let data = FieldMessage::new(FieldName::EncryptedCardNumber, 0, FieldPayload::valid(true))
        .encode()
        .unwrap();
    let forged = InboundMessage {
        origin: Origin::new("https://evil.example"),
        source: world.frame(FieldName::EncryptedCardNumber).frame().frame_id(),
        data,
    };

    assert!(world.registry.handle_inbound(&forged).is_err());
    assert!(!world.registry.field(FieldName::EncryptedCardNumber).unwrap().valid());
}

#[test]
fn unknown_frame_is_rejected() {
    let mut world = World::new(CardConfiguration::default());
    let data = FieldMessage::new(FieldName::EncryptedCardNumber, 0, FieldPayload::valid(true))
        .encode()
        .unwrap();
    let stray = InboundMessage {
        origin: Origin::new(securefield_harness::FRAME_ORIGIN),
        source: FrameId(99),
        data,
    };

    assert_eq!(
        world.registry.handle_inbound(&stray),
        Err(RegistryError::UnknownSource(FrameId(99)))
    );
}

#[test]
fn teardown_closes_every_frame() {
    let mut world = World::new(CardConfiguration::default());

    assert_eq!(world.registry.teardown(), 4);
    for field in CARD_FIELDS {
        assert!(world.frame(field).frame().is_closed());
    }
}
