//! Card form scenarios.
//!
//! [`CardForm`] wires an [`ElementLifecycle`] to one [`SimFrame`] per field
//! through a queue outbox and a [`SimEnv`] clock, and delivers frame
//! messages until the system is quiet after every step. Tests drive it the
//! way a shopper would and inspect the emitted [`ElementAction`]s.
//!
//! [`SimFrame`]: crate::SimFrame

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use securefield_core::{CardConfiguration, Environment};
use securefield_element::{
    ElementAction, ElementConfig, ElementEvent, ElementLifecycle, PaymentMethodVariant,
    SubmitState, Validatable,
};
use securefield_proto::FieldName;

use crate::{
    sim_env::SimEnv,
    sim_frame::{FrameHandle, Outbox, attach_frame},
};

/// Input every field accepts.
pub fn valid_input(field: FieldName) -> &'static str {
    match field {
        FieldName::EncryptedCardNumber => "4111111111111111",
        FieldName::EncryptedExpiryMonth => "03",
        FieldName::EncryptedExpiryYear => "2030",
        FieldName::EncryptedSecurityCode => "737",
        FieldName::EncryptedPassword => "12",
        FieldName::HolderName => "J. Smith",
    }
}

/// Builder for [`CardForm`].
#[derive(Debug, Clone, Default)]
pub struct CardFormBuilder {
    element: ElementConfig,
    card: CardConfiguration,
    variant: Option<PaymentMethodVariant>,
    unresponsive: BTreeSet<FieldName>,
    seed: u64,
}

impl CardFormBuilder {
    /// Element options.
    #[must_use]
    pub fn element_config(mut self, config: ElementConfig) -> Self {
        self.element = config;
        self
    }

    /// Card options.
    #[must_use]
    pub fn card_config(mut self, config: CardConfiguration) -> Self {
        self.card = config;
        self
    }

    /// Use `variant` instead of a new-card variant.
    #[must_use]
    pub fn variant(mut self, variant: PaymentMethodVariant) -> Self {
        self.variant = Some(variant);
        self
    }

    /// Frame for `field` never answers encryption requests.
    #[must_use]
    pub fn unresponsive(mut self, field: FieldName) -> Self {
        self.unresponsive.insert(field);
        self
    }

    /// RNG seed for frame tokens.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Mount the element and attach a frame per variant field.
    pub fn build(self) -> CardForm {
        let variant = self.variant.unwrap_or_else(|| PaymentMethodVariant::card(&self.card));
        let fields = variant.fields().to_vec();
        let mut element = ElementLifecycle::new(self.element, variant, self.card);

        let outbox = Outbox::queue();
        let mut frames = BTreeMap::new();
        for field in fields {
            let handle = attach_frame(element.registry_mut(), field, &outbox, self.seed);
            if self.unresponsive.contains(&field) {
                handle.set_responsive(false);
            }
            frames.insert(field, handle);
        }

        let mut form = CardForm { env: SimEnv::new(), element, frames, outbox, log: Vec::new() };
        form.deliver();
        form
    }
}

/// An element with simulated frames behind every field.
#[derive(Debug)]
pub struct CardForm {
    env: SimEnv,
    element: ElementLifecycle,
    frames: BTreeMap<FieldName, FrameHandle>,
    outbox: Outbox,
    log: Vec<ElementAction>,
}

impl CardForm {
    /// Start building a form.
    pub fn builder() -> CardFormBuilder {
        CardFormBuilder::default()
    }

    /// New-card form with default options.
    pub fn card() -> Self {
        Self::builder().build()
    }

    /// Virtual clock.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// The element under test.
    pub fn element(&self) -> &ElementLifecycle {
        &self.element
    }

    /// The element under test, mutably.
    pub fn element_mut(&mut self) -> &mut ElementLifecycle {
        &mut self.element
    }

    /// Frame behind `field`.
    pub fn frame(&self, field: FieldName) -> Option<&FrameHandle> {
        self.frames.get(&field)
    }

    /// Fields with a frame.
    pub fn fields(&self) -> impl Iterator<Item = FieldName> + '_ {
        self.frames.keys().copied()
    }

    /// Every action emitted so far.
    pub fn actions(&self) -> &[ElementAction] {
        &self.log
    }

    /// Every submit emitted so far.
    pub fn submissions(&self) -> Vec<&SubmitState> {
        self.log
            .iter()
            .filter_map(|action| match action {
                ElementAction::Submit(state) => Some(state),
                _ => None,
            })
            .collect()
    }

    /// Type `text` into `field` and deliver what follows.
    pub fn type_into(&mut self, field: FieldName, text: &str) -> Vec<ElementAction> {
        if let Some(frame) = self.frames.get(&field) {
            frame.type_text(text);
        }
        self.deliver()
    }

    /// Focus or blur `field`.
    pub fn focus(&mut self, field: FieldName, focused: bool) -> Vec<ElementAction> {
        if let Some(frame) = self.frames.get(&field) {
            frame.focus(focused);
        }
        self.deliver()
    }

    /// Type valid input into every field.
    pub fn fill_valid(&mut self) -> Vec<ElementAction> {
        let fields: Vec<FieldName> = self.fields().collect();
        fields.into_iter().flat_map(|field| self.type_into(field, valid_input(field))).collect()
    }

    /// Press pay.
    pub fn submit(&mut self) -> Vec<ElementAction> {
        self.handle(ElementEvent::Submit)
    }

    /// Move the clock and let deadlines fire.
    pub fn advance(&mut self, by: Duration) -> Vec<ElementAction> {
        self.env.advance(by);
        self.handle(ElementEvent::Tick)
    }

    /// Feed `event` and deliver what follows.
    pub fn handle(&mut self, event: ElementEvent) -> Vec<ElementAction> {
        let now = self.env.now();
        let mut actions = self.element.handle(event, now);
        self.log.extend(actions.iter().cloned());
        actions.extend(self.deliver());
        actions
    }

    /// Deliver queued frame messages until none are left.
    pub fn deliver(&mut self) -> Vec<ElementAction> {
        let mut actions = Vec::new();
        loop {
            let pending = self.outbox.drain();
            if pending.is_empty() {
                return actions;
            }
            for message in pending {
                let now = self.env.now();
                let emitted = self.element.handle(ElementEvent::Inbound(message), now);
                self.log.extend(emitted.iter().cloned());
                actions.extend(emitted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_attaches_a_frame_per_field() {
        let form = CardForm::card();

        assert_eq!(form.fields().count(), 4);
        for field in form.fields() {
            assert!(form.element().registry().is_registered(field));
        }
    }

    #[test]
    fn filled_form_is_valid() {
        let mut form = CardForm::card();

        form.fill_valid();

        assert!(form.element_mut().is_valid());
        assert_eq!(form.element().registry().brand(), Some("visa"));
    }

    #[test]
    fn code_typed_while_hidden_is_dropped_when_revealed() {
        let cvc = FieldName::EncryptedSecurityCode;
        let mut form = CardForm::card();
        for field in [FieldName::EncryptedExpiryMonth, FieldName::EncryptedExpiryYear] {
            form.type_into(field, valid_input(field));
        }
        form.type_into(FieldName::EncryptedCardNumber, "6703444444444449");

        form.frame(FieldName::EncryptedCardNumber).unwrap().type_text("4111111111111111");
        form.frame(cvc).unwrap().type_text("737");
        let actions = form.deliver();

        for action in &actions {
            match action {
                ElementAction::Changed(state) => assert!(!state.data.contains_key(&cvc)),
                ElementAction::Valid(_) => panic!("form reported valid with a cleared code"),
                _ => {},
            }
        }
        assert_eq!(form.frame(cvc).unwrap().frame().input(), "");
        assert_eq!(form.element_mut().aggregate().error(cvc), Some("error.va.incomplete"));

        assert_eq!(form.submit(), vec![ElementAction::ShowValidation]);

        form.type_into(cvc, "737");
        form.submit();
        let submitted = form.submissions();
        assert_eq!(submitted.len(), 1);
        assert!(submitted[0].data["paymentMethod"].get(cvc.as_str()).is_some());
    }
}
