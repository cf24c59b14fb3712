//! Callbacks that record every call.

use std::collections::VecDeque;

use async_trait::async_trait;
use securefield_core::AggregateFormState;
use securefield_element::{
    AdditionalDetails, ElementCallbacks, ElementError, SubmitOutcome, SubmitState, UiStatus,
    ValidState,
};
use serde_json::Value;

/// One recorded callback invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackRecord {
    /// `on_submit`
    Submit(SubmitState),
    /// `on_change`
    Change(AggregateFormState),
    /// `on_valid`
    Valid(ValidState),
    /// `on_error`
    Error(ElementError),
    /// `on_additional_details`
    AdditionalDetails(AdditionalDetails),
    /// `on_complete`
    Complete(Value),
    /// `show_validation`
    ShowValidation,
    /// `set_status`
    Status(UiStatus),
}

/// [`ElementCallbacks`] that records calls and answers submits from a
/// script.
#[derive(Debug, Default)]
pub struct RecordingCallbacks {
    calls: Vec<CallbackRecord>,
    outcomes: VecDeque<SubmitOutcome>,
}

impl RecordingCallbacks {
    /// Answer the next submit with `outcome`. Unscripted submits stay
    /// pending.
    #[must_use]
    pub fn respond_with(mut self, outcome: SubmitOutcome) -> Self {
        self.outcomes.push_back(outcome);
        self
    }

    /// Every call, in order.
    pub fn calls(&self) -> &[CallbackRecord] {
        &self.calls
    }

    /// Submitted states.
    pub fn submits(&self) -> Vec<&SubmitState> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                CallbackRecord::Submit(state) => Some(state),
                _ => None,
            })
            .collect()
    }

    /// Reported errors.
    pub fn errors(&self) -> Vec<&ElementError> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                CallbackRecord::Error(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    /// Statuses pushed to the presenter.
    pub fn statuses(&self) -> Vec<UiStatus> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                CallbackRecord::Status(status) => Some(*status),
                _ => None,
            })
            .collect()
    }

    /// Number of calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&CallbackRecord) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }
}

#[async_trait]
impl ElementCallbacks for RecordingCallbacks {
    async fn on_submit(&mut self, state: &SubmitState) -> SubmitOutcome {
        self.calls.push(CallbackRecord::Submit(state.clone()));
        self.outcomes.pop_front().unwrap_or(SubmitOutcome::Pending)
    }

    async fn on_change(&mut self, state: &AggregateFormState) {
        self.calls.push(CallbackRecord::Change(state.clone()));
    }

    async fn on_valid(&mut self, state: &ValidState) {
        self.calls.push(CallbackRecord::Valid(state.clone()));
    }

    async fn on_error(&mut self, error: &ElementError) {
        self.calls.push(CallbackRecord::Error(error.clone()));
    }

    async fn on_additional_details(&mut self, details: &AdditionalDetails) {
        self.calls.push(CallbackRecord::AdditionalDetails(details.clone()));
    }

    async fn on_complete(&mut self, state: &Value) {
        self.calls.push(CallbackRecord::Complete(state.clone()));
    }

    fn show_validation(&mut self) {
        self.calls.push(CallbackRecord::ShowValidation);
    }

    fn set_status(&mut self, status: UiStatus) {
        self.calls.push(CallbackRecord::Status(status));
    }
}
