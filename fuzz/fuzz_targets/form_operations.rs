//! Arbitrary shopper sessions: the element must agree with the reference
//! model after every operation.

#![no_main]

use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use securefield_element::{ElementEvent, SubmitOutcome};
use securefield_harness::{CardForm, FormModel, MODEL_FIELDS, Operation, model_field};
use securefield_proto::FieldName;

const MAX_OPS: usize = 128;

fuzz_target!(|ops: Vec<Operation>| {
    let mut model = FormModel::default();
    let mut form = CardForm::card();

    for op in ops.iter().take(MAX_OPS) {
        model.apply(op);
        apply(&mut form, op);

        assert_eq!(form.element().registry().brand(), model.brand(), "{op:?}");
        for field in MODEL_FIELDS {
            let policy = form.element().registry().field(field).map(|state| state.policy);
            assert_eq!(policy, Some(model.policy(field)), "{field} after {op:?}");
        }
        assert_eq!(form.element_mut().is_valid(), model.expected_valid(), "{op:?}");
        assert_eq!(form.element().registry().is_encrypting(), model.is_waiting(), "{op:?}");
    }

    assert_eq!(form.submissions().len(), model.submissions());
});

fn apply(form: &mut CardForm, op: &Operation) {
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
            form.submit();
        },
        Operation::Reject => {
            form.handle(ElementEvent::SubmitResolved(SubmitOutcome::Rejected("fuzz".into())));
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
}
