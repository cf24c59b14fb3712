//! Element lifecycle state machine.
//!
//! # Architecture: Action-Based State Machine
//!
//! [`ElementLifecycle::handle`] takes an [`ElementEvent`] and the current
//! time and returns the [`ElementAction`]s the runtime must execute. It never
//! awaits and never calls embedder code itself.
//!
//! # State Machine
//!
//! ```text
//!            Submit             valid           snapshot ready
//! ┌──────┐ ──────> ┌────────────┐ ───> ┌─────────┐ ──> Submit(data)
//! │ Idle │         │ Validating │      │ Loading │
//! └──────┘ <────┐  └────────────┘      └─────────┘
//!    ▲          │        │ invalid       │    │   │ complete
//!    │  field   │        ▼               │    │   ▼
//!    │  change  │   ┌───────┐  timeout/  │    │ ┌─────────┐
//!    │          └───│ Error │<──reject───┘    │ │ Success │
//!    │              └───────┘                 │ └─────────┘
//!    │                                 action │
//!    │ mounted  ┌───────────────────────────┐ │
//!    └──────────│ AwaitingAdditionalDetails │<┘
//!               └───────────────────────────┘
//! ```
//!
//! A `Submit` outside `Idle`/`Error` is dropped, never queued. A submit only
//! ever carries a complete encryption snapshot.

use std::{collections::BTreeMap, fmt, time::Instant};

use securefield_core::{
    AggregateFormState, CardConfiguration, EncryptedSnapshot, FieldRegistry, InboundMessage,
    RegistryError, ValidationAggregator,
};
use securefield_proto::{EncryptedToken, FieldName, PaymentAction};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    config::ElementConfig,
    dispatcher::DetailsForwarder,
    error::{DispatchError, ElementError, InvalidAction},
    variant::{PaymentMethodVariant, Submittable, Validatable},
};

/// Lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementStatus {
    /// Waiting for input or a submit.
    Idle,
    /// Checking the aggregate after a submit.
    Validating,
    /// Encrypting or waiting for the embedder's submit outcome.
    Loading,
    /// A continuation element owns the flow.
    AwaitingAdditionalDetails,
    /// Last attempt failed; a new submit is allowed.
    Error,
    /// Payment finished.
    Success,
}

/// Status pushed to the presenter when status is driven automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UiStatus {
    /// Interactive.
    Ready,
    /// Spinner.
    Loading,
    /// Finished.
    Success,
}

/// Payload passed to `on_submit`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitState {
    /// Backend-ready payment data.
    pub data: Value,
    /// Always true; a submit is never emitted for an invalid form.
    pub is_valid: bool,
}

/// Payload passed to `on_valid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidState {
    /// Tokens the frames pushed unprompted.
    pub data: BTreeMap<FieldName, EncryptedToken>,
}

/// Output of a continuation step, routed back to the original element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalDetails {
    /// Step-specific result.
    pub details: serde_json::Map<String, Value>,
    /// Opaque state the backend asked to be echoed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_data: Option<String>,
}

/// What the embedder's submit handler decided.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Payment finished with this result.
    Completed(Value),
    /// Backend returned a continuation action.
    Action(PaymentAction),
    /// Payment refused.
    Rejected(String),
    /// Outcome will arrive later through the runtime.
    Pending,
}

/// Inputs to the state machine.
#[derive(Debug, Clone)]
pub enum ElementEvent {
    /// Shopper pressed pay.
    Submit,
    /// Envelope from a field frame.
    Inbound(InboundMessage),
    /// Clock advanced; used to expire encryption rounds.
    Tick,
    /// Embedder's submit handler returned.
    SubmitResolved(SubmitOutcome),
    /// Embedder supplied a continuation action.
    ActionReceived(PaymentAction),
    /// Continuation element mounted in our place.
    ActionMounted,
    /// Continuation element could not be built.
    ActionFailed(DispatchError),
    /// Embedder reported the payment finished.
    Completed(Value),
    /// A continuation step produced additional details.
    AdditionalDetails(AdditionalDetails),
    /// Element is being unmounted.
    Teardown,
}

/// Outputs of the state machine, executed by the runtime in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementAction {
    /// Call `on_change`.
    Changed(AggregateFormState),
    /// Call `on_valid`.
    Valid(ValidState),
    /// Ask the presenter to reveal field errors.
    ShowValidation,
    /// Push a status to the presenter.
    SetStatus(UiStatus),
    /// Call `on_submit`.
    Submit(SubmitState),
    /// Call `on_error`.
    Error(ElementError),
    /// Call `on_complete`.
    Complete(Value),
    /// Dispatch this action to a continuation element.
    HandleAction(PaymentAction),
    /// Call `on_additional_details`.
    AdditionalDetails(AdditionalDetails),
}

/// Host-side element: owns the field registry and drives submission.
pub struct ElementLifecycle {
    config: ElementConfig,
    variant: PaymentMethodVariant,
    registry: FieldRegistry,
    status: ElementStatus,
    cache: Option<(u64, AggregateFormState)>,
    forwarder: DetailsForwarder,
}

impl ElementLifecycle {
    /// Build an element. Fields are registered afterwards by the rendering
    /// layer through [`Self::registry_mut`].
    pub fn new(
        config: ElementConfig,
        variant: PaymentMethodVariant,
        card: CardConfiguration,
    ) -> Self {
        let mut registry = FieldRegistry::new(card, config.registry_config());
        if let Some(brand) = variant.initial_brand() {
            registry.set_brand(Some(brand.to_owned()));
        }

        Self {
            config,
            variant,
            registry,
            status: ElementStatus::Idle,
            cache: None,
            forwarder: DetailsForwarder::discard(),
        }
    }

    /// Route continuation details through `forwarder`.
    #[must_use]
    pub fn with_forwarder(mut self, forwarder: DetailsForwarder) -> Self {
        self.forwarder = forwarder;
        self
    }

    /// Where continuation details for this element go.
    pub fn forwarder(&self) -> &DetailsForwarder {
        &self.forwarder
    }

    /// Current status.
    pub fn status(&self) -> ElementStatus {
        self.status
    }

    /// Element options.
    pub fn config(&self) -> &ElementConfig {
        &self.config
    }

    /// Payment-method variant.
    pub fn variant(&self) -> &PaymentMethodVariant {
        &self.variant
    }

    /// Field registry.
    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    /// Field registry, for registering and unregistering fields.
    ///
    /// Changes made here are not reported as `Changed`; only changes caused
    /// by an event are.
    pub fn registry_mut(&mut self) -> &mut FieldRegistry {
        &mut self.registry
    }

    /// Aggregate form state, recomputed only after the registry changed.
    pub fn aggregate(&mut self) -> &AggregateFormState {
        cached_aggregate(&mut self.cache, &self.registry)
    }

    /// Whether a submit would pass validation right now.
    pub fn is_valid(&mut self) -> bool {
        let form = cached_aggregate(&mut self.cache, &self.registry);
        self.variant.is_valid(form)
    }

    /// Element type.
    pub fn element_type(&self) -> &str {
        self.config.type_override.as_deref().unwrap_or_else(|| self.variant.element_type())
    }

    /// Name shown to the shopper: the configured name, then the variant's
    /// own (masked digits for a stored card), then the element type.
    pub fn display_name(&self) -> String {
        self.config
            .name
            .clone()
            .or_else(|| self.variant.display_name())
            .unwrap_or_else(|| self.element_type().to_owned())
    }

    /// Name used for assistive technology.
    pub fn accessible_name(&self) -> String {
        self.display_name()
    }

    /// Icon URL.
    pub fn icon(&self) -> String {
        match &self.config.icon {
            Some(icon) => icon.clone(),
            None => {
                format!("{}images/logos/{}.svg", self.config.loading_context, self.element_type())
            },
        }
    }

    /// Destroy every frame channel. Field state stays readable.
    pub fn teardown(&mut self) {
        let destroyed = self.registry.teardown();
        debug!(destroyed, "element torn down");
    }

    /// Advance the state machine.
    pub fn handle(&mut self, event: ElementEvent, now: Instant) -> Vec<ElementAction> {
        let mut actions = Vec::new();
        let revision = self.registry.revision();

        match event {
            ElementEvent::Submit => self.submit(now, &mut actions),
            ElementEvent::Inbound(inbound) => {
                // Rejections are logged by the registry and otherwise absorbed.
                let changed = self.registry.handle_inbound(&inbound).unwrap_or(false);
                if changed && self.status == ElementStatus::Error {
                    self.transition(ElementStatus::Idle);
                }
                self.poll_encryption(now, &mut actions);
            },
            ElementEvent::Tick => self.poll_encryption(now, &mut actions),
            ElementEvent::SubmitResolved(outcome) => self.submit_resolved(outcome, &mut actions),
            ElementEvent::ActionReceived(action) => self.action_received(action, &mut actions),
            ElementEvent::ActionMounted => {
                if self.status == ElementStatus::AwaitingAdditionalDetails {
                    self.transition(ElementStatus::Idle);
                } else {
                    debug!(status = ?self.status, "action mounted outside awaiting state");
                }
            },
            ElementEvent::ActionFailed(err) => self.fail(err.into(), &mut actions),
            ElementEvent::Completed(state) => self.complete(state, &mut actions),
            ElementEvent::AdditionalDetails(details) => {
                actions.push(ElementAction::AdditionalDetails(details));
            },
            ElementEvent::Teardown => {
                self.teardown();
                return actions;
            },
        }

        if self.registry.revision() != revision {
            self.notify_changes(&mut actions);
        }
        actions
    }

    fn submit(&mut self, now: Instant, actions: &mut Vec<ElementAction>) {
        if !matches!(self.status, ElementStatus::Idle | ElementStatus::Error) {
            debug!(status = ?self.status, "submit ignored");
            return;
        }

        if let Err(err) = self.variant.start_payment() {
            self.fail(err, actions);
            return;
        }

        self.transition(ElementStatus::Validating);
        if !self.is_valid() {
            self.transition(ElementStatus::Error);
            actions.push(ElementAction::ShowValidation);
            return;
        }

        self.transition(ElementStatus::Loading);
        if self.config.set_status_automatically {
            actions.push(ElementAction::SetStatus(UiStatus::Loading));
        }

        if let Err(err) = self.registry.request_encrypted_data(now) {
            self.fail(err.into(), actions);
            return;
        }
        // A round with no visible fields completes immediately.
        self.poll_encryption(now, actions);
    }

    fn poll_encryption(&mut self, now: Instant, actions: &mut Vec<ElementAction>) {
        match self.registry.poll_encryption(now) {
            None => {},
            Some(Ok(snapshot)) => self.encrypted(&snapshot, actions),
            Some(Err(err)) => self.encryption_failed(err, actions),
        }
    }

    fn encrypted(&mut self, snapshot: &EncryptedSnapshot, actions: &mut Vec<ElementAction>) {
        if self.status != ElementStatus::Loading {
            debug!(status = ?self.status, request_id = snapshot.request_id, "snapshot dropped");
            return;
        }

        let form = cached_aggregate(&mut self.cache, &self.registry);
        let data = self.variant.submit_data(snapshot, form, &self.config);
        debug!(request_id = snapshot.request_id, "submitting encrypted snapshot");
        actions.push(ElementAction::Submit(SubmitState { data, is_valid: true }));
    }

    fn encryption_failed(&mut self, err: RegistryError, actions: &mut Vec<ElementAction>) {
        warn!(error = %err, "encryption round failed");
        if self.status == ElementStatus::Loading {
            self.fail(err.into(), actions);
        }
    }

    fn submit_resolved(&mut self, outcome: SubmitOutcome, actions: &mut Vec<ElementAction>) {
        match outcome {
            SubmitOutcome::Completed(state) => self.complete(state, actions),
            SubmitOutcome::Action(action) => self.action_received(action, actions),
            SubmitOutcome::Rejected(reason) => {
                if self.status == ElementStatus::Loading {
                    self.fail(ElementError::SubmitRejected(reason), actions);
                } else {
                    debug!(status = ?self.status, "late submit rejection ignored");
                }
            },
            SubmitOutcome::Pending => {},
        }
    }

    fn action_received(&mut self, action: PaymentAction, actions: &mut Vec<ElementAction>) {
        if self.status == ElementStatus::Success {
            debug!("action after success ignored");
            return;
        }

        let invalid = match (&action.action_type, action.kind()) {
            (_, Some(_)) => None,
            (None, None) => Some(InvalidAction::MissingType),
            (Some(unknown), None) => Some(InvalidAction::UnknownType(unknown.clone())),
        };
        if let Some(reason) = invalid {
            let err = ElementError::Dispatch(DispatchError::InvalidAction(reason));
            if self.status == ElementStatus::Loading {
                self.fail(err, actions);
            } else {
                warn!(error = %err, "invalid action refused");
                actions.push(ElementAction::Error(err));
            }
            return;
        }

        self.registry.abandon_encryption();
        self.transition(ElementStatus::AwaitingAdditionalDetails);
        actions.push(ElementAction::HandleAction(action));
    }

    fn complete(&mut self, state: Value, actions: &mut Vec<ElementAction>) {
        let finishable = matches!(
            self.status,
            ElementStatus::Loading | ElementStatus::AwaitingAdditionalDetails
        );
        if !finishable {
            debug!(status = ?self.status, "completion ignored");
            return;
        }

        self.transition(ElementStatus::Success);
        if self.config.set_status_automatically {
            actions.push(ElementAction::SetStatus(UiStatus::Success));
        }
        actions.push(ElementAction::Complete(state));
    }

    fn fail(&mut self, err: ElementError, actions: &mut Vec<ElementAction>) {
        let was_busy = matches!(
            self.status,
            ElementStatus::Loading | ElementStatus::AwaitingAdditionalDetails
        );

        self.registry.abandon_encryption();
        self.transition(ElementStatus::Error);
        if was_busy && self.config.set_status_automatically {
            actions.push(ElementAction::SetStatus(UiStatus::Ready));
        }
        actions.push(ElementAction::Error(err));
    }

    fn notify_changes(&mut self, actions: &mut Vec<ElementAction>) {
        let form = cached_aggregate(&mut self.cache, &self.registry).clone();
        let valid = self.variant.is_valid(&form);
        let data = form.data.clone();

        actions.push(ElementAction::Changed(form));
        if valid {
            actions.push(ElementAction::Valid(ValidState { data }));
        }
    }

    fn transition(&mut self, to: ElementStatus) {
        if self.status == to {
            return;
        }

        match to {
            ElementStatus::Success | ElementStatus::AwaitingAdditionalDetails => {
                info!(from = ?self.status, to = ?to, "element transition");
            },
            _ => debug!(from = ?self.status, to = ?to, "element transition"),
        }
        self.status = to;
    }
}

fn cached_aggregate<'a>(
    cache: &'a mut Option<(u64, AggregateFormState)>,
    registry: &FieldRegistry,
) -> &'a AggregateFormState {
    let revision = registry.revision();
    if cache.as_ref().is_none_or(|(cached, _)| *cached != revision) {
        *cache = Some((revision, ValidationAggregator::compute(registry)));
    }
    &cache.get_or_insert_with(|| (revision, ValidationAggregator::compute(registry))).1
}

impl fmt::Debug for ElementLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementLifecycle")
            .field("status", &self.status)
            .field("variant", &self.variant)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
