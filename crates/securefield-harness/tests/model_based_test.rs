//! Model-based property tests.
//!
//! Random shopper sessions run against a [`CardForm`] (real element, real
//! registry, simulated frames) and a [`FormModel`] side by side. After every
//! operation the two must agree on brand, policies, validity and what a
//! submit did.
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!       FormModel      CardForm        Compare
//!      (reference)   (sim frames)     Results
//! ```

use std::time::Duration;

use proptest::prelude::*;
use securefield_element::{ElementAction, ElementEvent, ElementStatus, SubmitOutcome};
use securefield_harness::{
    CardForm, FormModel, InputKind, MODEL_FIELDS, Operation, SimBrand, SubmitExpectation,
    model_field,
};
use securefield_proto::FieldName;

/// Apply `op` to the real form. Returns what a submit did.
fn apply(form: &mut CardForm, op: &Operation) -> Option<SubmitExpectation> {
    match op {
        Operation::Type { field, input } => {
            let field = model_field(*field);
            form.type_into(field, input.text(field));
        },
        Operation::CardNumber { brand } => {
            form.type_into(FieldName::EncryptedCardNumber, brand.number());
        },
        Operation::Focus { field, focused } => {
            form.focus(model_field(*field), *focused);
        },
        Operation::Submit => {
            let before = form.element().status();
            let actions = form.submit();
            return Some(classify(before, &actions));
        },
        Operation::Reject => {
            form.handle(ElementEvent::SubmitResolved(SubmitOutcome::Rejected("declined".into())));
        },
        Operation::AdvanceTime { millis } => {
            form.advance(Duration::from_millis(u64::from(*millis)));
        },
        Operation::SetResponsive { field, responsive } => {
            if let Some(frame) = form.frame(model_field(*field)) {
                frame.set_responsive(*responsive);
            }
        },
    }
    None
}

fn classify(before: ElementStatus, actions: &[ElementAction]) -> SubmitExpectation {
    if actions.iter().any(|a| matches!(a, ElementAction::Submit(_))) {
        SubmitExpectation::Submitted
    } else if actions.iter().any(|a| matches!(a, ElementAction::ShowValidation)) {
        SubmitExpectation::Invalid
    } else if before == ElementStatus::Loading {
        SubmitExpectation::Ignored
    } else {
        SubmitExpectation::Waiting
    }
}

fn input_strategy() -> impl Strategy<Value = InputKind> {
    prop_oneof![
        1 => Just(InputKind::Empty),
        4 => Just(InputKind::Valid),
        1 => Just(InputKind::Invalid),
        1 => Just(InputKind::Partial),
    ]
}

fn brand_strategy() -> impl Strategy<Value = SimBrand> {
    prop_oneof![
        Just(SimBrand::Visa),
        Just(SimBrand::Mastercard),
        Just(SimBrand::Amex),
        Just(SimBrand::Bcmc),
        Just(SimBrand::Maestro),
        Just(SimBrand::KoreanLocal),
    ]
}

/// Strategy for generating operations.
fn operation_strategy() -> impl Strategy<Value = Operation> {
    let field = 0..4u8;

    prop_oneof![
        // Weight towards typing, which drives everything else
        6 => (field.clone(), input_strategy())
            .prop_map(|(field, input)| Operation::Type { field, input }),
        2 => brand_strategy().prop_map(|brand| Operation::CardNumber { brand }),
        1 => (field.clone(), any::<bool>())
            .prop_map(|(field, focused)| Operation::Focus { field, focused }),
        3 => Just(Operation::Submit),
        1 => Just(Operation::Reject),
        2 => any::<u16>().prop_map(|millis| Operation::AdvanceTime { millis }),
        1 => (field, prop::bool::weighted(0.7))
            .prop_map(|(field, responsive)| Operation::SetResponsive { field, responsive }),
    ]
}

proptest! {
    /// Brand, policies, validity and submit results match the model after
    /// every operation.
    #[test]
    fn prop_model_matches_real(
        seed in any::<u64>(),
        ops in prop::collection::vec(operation_strategy(), 0..60)
    ) {
        let mut model = FormModel::default();
        let mut form = CardForm::builder().seed(seed).build();

        for (i, op) in ops.iter().enumerate() {
            let expected = model.apply(op);
            let actual = apply(&mut form, op);

            prop_assert_eq!(
                expected, actual,
                "Divergence at operation {}: {:?}", i, op
            );
            prop_assert_eq!(form.element().registry().brand(), model.brand());
            for field in MODEL_FIELDS {
                let state = form.element().registry().field(field);
                prop_assert_eq!(
                    state.map(|s| s.policy),
                    Some(model.policy(field)),
                    "policy of {} after {:?}", field, op
                );
            }
            prop_assert_eq!(
                form.element_mut().is_valid(),
                model.expected_valid(),
                "validity after operation {}: {:?}", i, op
            );
            prop_assert_eq!(form.element().registry().is_encrypting(), model.is_waiting());
        }

        prop_assert_eq!(form.submissions().len(), model.submissions());
    }

    /// An encryption round is only ever open while the element is loading.
    #[test]
    fn prop_round_implies_loading(
        ops in prop::collection::vec(operation_strategy(), 0..80)
    ) {
        let mut form = CardForm::card();

        for op in &ops {
            apply(&mut form, op);
            let element = form.element();
            prop_assert!(
                !element.registry().is_encrypting() || element.status() == ElementStatus::Loading,
                "round open in {:?} after {:?}", element.status(), op
            );
        }
    }

    /// Every submitted payload carries the number and expiry tokens, and a
    /// security code token exactly when the code was required.
    #[test]
    fn prop_submissions_carry_required_tokens(
        seed in any::<u64>(),
        brand in brand_strategy(),
    ) {
        let mut form = CardForm::builder().seed(seed).build();
        form.fill_valid();
        form.type_into(FieldName::EncryptedCardNumber, brand.number());
        if brand != SimBrand::Bcmc && brand != SimBrand::KoreanLocal {
            form.type_into(FieldName::EncryptedSecurityCode, "7373");
        }

        form.submit();

        let submissions = form.submissions();
        prop_assert_eq!(submissions.len(), 1);
        let method = &submissions[0].data["paymentMethod"];
        for field in [
            FieldName::EncryptedCardNumber,
            FieldName::EncryptedExpiryMonth,
            FieldName::EncryptedExpiryYear,
        ] {
            let token = method[field.as_str()].as_str().unwrap_or_default();
            let prefix = format!("sf1${}$", field.as_str());
            prop_assert!(token.starts_with(&prefix), "{} token was {:?}", field, token);
        }
        let cvc = method.get(FieldName::EncryptedSecurityCode.as_str());
        let hidden = matches!(brand, SimBrand::Bcmc | SimBrand::KoreanLocal);
        prop_assert_eq!(cvc.is_none(), hidden);
    }
}

#[test]
fn same_seed_gives_same_tokens() {
    let run = |seed| {
        let mut form = CardForm::builder().seed(seed).build();
        form.fill_valid();
        form.submit();
        form.submissions()[0].data.clone()
    };

    assert_eq!(run(7), run(7));
    assert_ne!(run(7), run(8));
}
