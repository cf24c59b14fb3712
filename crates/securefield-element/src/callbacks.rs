//! Embedder callbacks.

use async_trait::async_trait;
use securefield_core::AggregateFormState;
use serde_json::Value;

use crate::{
    error::ElementError,
    lifecycle::{AdditionalDetails, SubmitOutcome, SubmitState, UiStatus, ValidState},
};

/// Hooks the runtime calls as the element moves through its lifecycle.
///
/// Every method has a no-op default; an embedder overrides what it needs.
#[async_trait]
pub trait ElementCallbacks: Send {
    /// Encrypted payment data is ready. The returned outcome drives the rest
    /// of the flow.
    async fn on_submit(&mut self, _state: &SubmitState) -> SubmitOutcome {
        SubmitOutcome::Pending
    }

    /// Some field changed.
    async fn on_change(&mut self, _state: &AggregateFormState) {}

    /// A change left the form valid.
    async fn on_valid(&mut self, _state: &ValidState) {}

    /// Something failed.
    async fn on_error(&mut self, _error: &ElementError) {}

    /// A continuation step finished.
    async fn on_additional_details(&mut self, _details: &AdditionalDetails) {}

    /// The payment finished.
    async fn on_complete(&mut self, _state: &Value) {}

    /// Reveal per-field validation errors.
    fn show_validation(&mut self) {}

    /// Show a status (spinner, success mark, ...).
    fn set_status(&mut self, _status: UiStatus) {}
}

/// Callbacks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallbacks;

impl ElementCallbacks for NoopCallbacks {}
