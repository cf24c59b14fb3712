//! Reference model for model-based testing.
//!
//! [`FormModel`] predicts, from plaintext alone, what the element should
//! conclude: which brand is active, which policy each field has, whether
//! the form is valid and whether a submit produces data, fails validation
//! or times out. Property tests drive a [`CardForm`] and the model with
//! the same [`Operation`]s and compare.
//!
//! [`CardForm`]: crate::CardForm

use std::collections::{BTreeMap, BTreeSet};

use arbitrary::Arbitrary;
use securefield_core::{CardConfiguration, PolicyResolver};
use securefield_proto::{FieldName, FieldPolicy};

use crate::sim_frame::{detect_brand, validate_input};

/// Index of a card field. Wraps modulo [`MODEL_FIELDS`].
pub type ModelField = u8;

/// Fields a default card form renders.
pub const MODEL_FIELDS: [FieldName; 4] = [
    FieldName::EncryptedCardNumber,
    FieldName::EncryptedExpiryMonth,
    FieldName::EncryptedExpiryYear,
    FieldName::EncryptedSecurityCode,
];

/// Encryption timeout of a default form, in milliseconds.
pub const MODEL_TIMEOUT_MS: u64 = 10_000;

/// Resolve a model index to a field.
pub fn model_field(index: ModelField) -> FieldName {
    MODEL_FIELDS[usize::from(index) % MODEL_FIELDS.len()]
}

/// Shape of typed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum InputKind {
    /// Cleared.
    Empty,
    /// Complete and correct.
    Valid,
    /// Complete but wrong.
    Invalid,
    /// Half-typed.
    Partial,
}

impl InputKind {
    /// Text of this kind for `field`.
    pub fn text(self, field: FieldName) -> &'static str {
        match (self, field) {
            (Self::Empty, _) => "",
            (Self::Valid, _) => crate::scenario::valid_input(field),
            (Self::Invalid, FieldName::EncryptedCardNumber) => "4111111111111112",
            (Self::Invalid, FieldName::EncryptedExpiryMonth) => "13",
            (Self::Invalid, FieldName::EncryptedExpiryYear) => "203",
            (Self::Invalid, FieldName::EncryptedSecurityCode) => "7a7",
            (Self::Invalid, FieldName::EncryptedPassword) => "123",
            (Self::Partial, FieldName::EncryptedCardNumber) => "4111",
            (Self::Partial, FieldName::EncryptedExpiryMonth) => "0",
            (Self::Partial, FieldName::EncryptedExpiryYear) => "2",
            (Self::Partial, FieldName::EncryptedSecurityCode) => "73",
            (Self::Partial, FieldName::EncryptedPassword) => "1",
            (Self::Invalid | Self::Partial, FieldName::HolderName) => " ",
        }
    }
}

/// Card brands with a valid test number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum SimBrand {
    /// Mandatory CVC.
    Visa,
    /// Mandatory CVC.
    Mastercard,
    /// Mandatory four-digit CVC.
    Amex,
    /// No CVC.
    Bcmc,
    /// Optional CVC.
    Maestro,
    /// No CVC.
    KoreanLocal,
}

impl SimBrand {
    /// Luhn-valid number for this brand.
    pub fn number(self) -> &'static str {
        match self {
            Self::Visa => "4111111111111111",
            Self::Mastercard => "5555555555554444",
            Self::Amex => "378282246310005",
            Self::Bcmc => "6703444444444449",
            Self::Maestro => "6759000000000000",
            Self::KoreanLocal => "9490220006611406",
        }
    }
}

/// One step a shopper or merchant takes.
#[derive(Debug, Clone, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// Type into a field.
    Type {
        /// Target field.
        field: ModelField,
        /// What gets typed.
        input: InputKind,
    },
    /// Type a full number of a given brand into the card number.
    CardNumber {
        /// Brand of the number.
        brand: SimBrand,
    },
    /// Focus or blur a field.
    Focus {
        /// Target field.
        field: ModelField,
        /// Focus in or out.
        focused: bool,
    },
    /// Press pay.
    Submit,
    /// Merchant rejects the outstanding submit.
    Reject,
    /// Let time pass.
    AdvanceTime {
        /// How long.
        millis: u16,
    },
    /// Make a frame stop or resume answering encryption requests.
    SetResponsive {
        /// Target field.
        field: ModelField,
        /// Whether it answers.
        responsive: bool,
    },
}

/// What the model expects a submit to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitExpectation {
    /// Element is busy; nothing happens.
    Ignored,
    /// Form is invalid; validation is shown.
    Invalid,
    /// Every contributing frame answers; data is submitted.
    Submitted,
    /// Some contributing frame stays silent; the round is pending.
    Waiting,
}

/// Reference model of a default card form.
#[derive(Debug, Clone)]
pub struct FormModel {
    config: CardConfiguration,
    inputs: BTreeMap<FieldName, String>,
    silent: BTreeSet<FieldName>,
    busy: bool,
    deadline: Option<u64>,
    elapsed_ms: u64,
    submissions: usize,
    timeouts: usize,
}

impl Default for FormModel {
    fn default() -> Self {
        Self::new(CardConfiguration::default())
    }
}

impl FormModel {
    /// Empty form under `config`.
    pub fn new(config: CardConfiguration) -> Self {
        Self {
            config,
            inputs: MODEL_FIELDS.iter().map(|field| (*field, String::new())).collect(),
            silent: BTreeSet::new(),
            busy: false,
            deadline: None,
            elapsed_ms: 0,
            submissions: 0,
            timeouts: 0,
        }
    }

    /// Apply `op` and return the submit expectation when `op` is a submit.
    pub fn apply(&mut self, op: &Operation) -> Option<SubmitExpectation> {
        match op {
            Operation::Type { field, input } => {
                let field = model_field(*field);
                self.type_text(field, input.text(field));
            },
            Operation::CardNumber { brand } => {
                self.type_text(FieldName::EncryptedCardNumber, brand.number());
            },
            Operation::Focus { .. } => {},
            Operation::Submit => return Some(self.submit()),
            Operation::Reject => {
                if self.busy {
                    self.busy = false;
                    self.deadline = None;
                }
            },
            Operation::AdvanceTime { millis } => {
                self.elapsed_ms += u64::from(*millis);
                if self.deadline.is_some_and(|deadline| self.elapsed_ms >= deadline) {
                    self.deadline = None;
                    self.busy = false;
                    self.timeouts += 1;
                }
            },
            Operation::SetResponsive { field, responsive } => {
                let field = model_field(*field);
                if *responsive {
                    self.silent.remove(&field);
                } else {
                    self.silent.insert(field);
                }
            },
        }
        None
    }

    /// Brand the card-number frame reports.
    pub fn brand(&self) -> Option<&'static str> {
        detect_brand(self.input(FieldName::EncryptedCardNumber))
    }

    /// Policy of `field` under the current brand.
    pub fn policy(&self, field: FieldName) -> FieldPolicy {
        PolicyResolver::resolve(&self.config, self.brand(), field)
    }

    /// Plaintext in `field`.
    pub fn input(&self, field: FieldName) -> &str {
        self.inputs.get(&field).map_or("", String::as_str)
    }

    /// Whether the element should consider the form valid.
    pub fn expected_valid(&self) -> bool {
        MODEL_FIELDS.iter().all(|field| {
            let ok = validate_input(*field, self.input(*field)).is_ok();
            match self.policy(*field) {
                FieldPolicy::Hidden => true,
                FieldPolicy::Required => ok,
                FieldPolicy::Optional => ok || self.input(*field).is_empty(),
            }
        })
    }

    /// Fields an encryption round asks for.
    pub fn contributing(&self) -> Vec<FieldName> {
        MODEL_FIELDS
            .iter()
            .copied()
            .filter(|field| match self.policy(*field) {
                FieldPolicy::Hidden => false,
                FieldPolicy::Required => true,
                FieldPolicy::Optional => !self.input(*field).is_empty(),
            })
            .collect()
    }

    /// True between a submit the form accepted and its resolution.
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// True while an encryption round waits on a silent frame.
    pub fn is_waiting(&self) -> bool {
        self.deadline.is_some()
    }

    /// Submits that produced data.
    pub fn submissions(&self) -> usize {
        self.submissions
    }

    /// Rounds that timed out.
    pub fn timeouts(&self) -> usize {
        self.timeouts
    }

    fn type_text(&mut self, field: FieldName, text: &str) {
        let before: Vec<FieldPolicy> = MODEL_FIELDS.iter().map(|f| self.policy(*f)).collect();
        self.inputs.insert(field, text.to_owned());

        // A field coming back from hidden starts empty.
        for (field, was) in MODEL_FIELDS.iter().zip(before) {
            if was == FieldPolicy::Hidden && self.policy(*field) != FieldPolicy::Hidden {
                self.inputs.insert(*field, String::new());
            }
        }
    }

    fn submit(&mut self) -> SubmitExpectation {
        if self.busy {
            return SubmitExpectation::Ignored;
        }
        if !self.expected_valid() {
            return SubmitExpectation::Invalid;
        }

        self.busy = true;
        if self.contributing().iter().any(|field| self.silent.contains(field)) {
            self.deadline = Some(self.elapsed_ms + MODEL_TIMEOUT_MS);
            SubmitExpectation::Waiting
        } else {
            self.submissions += 1;
            SubmitExpectation::Submitted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> FormModel {
        let mut model = FormModel::default();
        for field in 0..4 {
            model.apply(&Operation::Type { field, input: InputKind::Valid });
        }
        model
    }

    #[test]
    fn valid_inputs_make_a_valid_form() {
        let model = filled();
        assert!(model.expected_valid());
        assert_eq!(model.brand(), Some("visa"));
    }

    #[test]
    fn bcmc_hides_cvc_then_visa_clears_it() {
        let mut model = filled();

        model.apply(&Operation::CardNumber { brand: SimBrand::Bcmc });
        assert_eq!(model.policy(FieldName::EncryptedSecurityCode), FieldPolicy::Hidden);
        assert!(model.expected_valid());

        model.apply(&Operation::CardNumber { brand: SimBrand::Visa });
        assert_eq!(model.input(FieldName::EncryptedSecurityCode), "");
        assert!(!model.expected_valid());
    }

    #[test]
    fn maestro_skips_empty_cvc() {
        let mut model = filled();
        model.apply(&Operation::CardNumber { brand: SimBrand::Maestro });
        model.apply(&Operation::Type { field: 3, input: InputKind::Empty });

        assert!(model.expected_valid());
        assert_eq!(model.contributing().len(), 3);
    }

    #[test]
    fn silent_frame_times_out() {
        let mut model = filled();
        model.apply(&Operation::SetResponsive { field: 1, responsive: false });

        assert_eq!(model.apply(&Operation::Submit), Some(SubmitExpectation::Waiting));
        assert_eq!(model.apply(&Operation::Submit), Some(SubmitExpectation::Ignored));

        model.apply(&Operation::AdvanceTime { millis: 9_999 });
        assert!(model.is_waiting());
        model.apply(&Operation::AdvanceTime { millis: 1 });
        assert!(!model.is_busy());
        assert_eq!(model.timeouts(), 1);
    }

    #[test]
    fn every_brand_number_is_valid() {
        for brand in [
            SimBrand::Visa,
            SimBrand::Mastercard,
            SimBrand::Amex,
            SimBrand::Bcmc,
            SimBrand::Maestro,
            SimBrand::KoreanLocal,
        ] {
            assert_eq!(validate_input(FieldName::EncryptedCardNumber, brand.number()), Ok(()));
        }
    }
}
