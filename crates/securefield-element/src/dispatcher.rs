//! Payment action dispatch.
//!
//! [`ActionDispatcher`] owns what is mounted at each [`MountPoint`]. A
//! dispatch replaces the mounted element with a continuation built by an
//! [`ActionFactory`]; validation happens before anything is unmounted, so a
//! failed dispatch leaves the slot exactly as it was.

use std::{collections::HashMap, fmt, sync::Arc};

use securefield_proto::{ActionType, PaymentAction};
use tracing::{debug, info};

use crate::{
    error::{DispatchError, InvalidAction},
    lifecycle::{AdditionalDetails, ElementLifecycle},
};

/// Named anchor an element is mounted at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountPoint(String);

impl MountPoint {
    /// Create a mount point.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Anchor name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sends a continuation's additional details back to the element that
/// started the flow.
#[derive(Clone)]
pub struct DetailsForwarder(Arc<dyn Fn(AdditionalDetails) + Send + Sync>);

impl DetailsForwarder {
    /// Forward through `f`.
    pub fn new(f: impl Fn(AdditionalDetails) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Forwarder that drops everything.
    pub fn discard() -> Self {
        Self::new(|_| debug!("additional details dropped; no forwarder bound"))
    }

    /// Deliver `details`.
    pub fn forward(&self, details: AdditionalDetails) {
        (self.0)(details);
    }
}

impl fmt::Debug for DetailsForwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DetailsForwarder")
    }
}

/// Element mounted in place of the original after an action.
#[derive(Debug)]
pub struct ContinuationElement {
    kind: ActionType,
    action: PaymentAction,
    forwarder: DetailsForwarder,
    completed: bool,
}

impl ContinuationElement {
    /// Build a continuation for `action`, forwarding through `forwarder`.
    pub fn new(kind: ActionType, action: PaymentAction, forwarder: DetailsForwarder) -> Self {
        Self { kind, action, forwarder, completed: false }
    }

    /// Action type this element handles.
    pub fn kind(&self) -> ActionType {
        self.kind
    }

    /// The action as received.
    pub fn action(&self) -> &PaymentAction {
        &self.action
    }

    /// True once details were forwarded.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Forward the step's result. Only the first call forwards anything.
    pub fn submit_additional_details(&mut self, details: AdditionalDetails) -> bool {
        if self.completed {
            debug!(kind = %self.kind, "additional details already forwarded");
            return false;
        }

        self.completed = true;
        self.forwarder.forward(details);
        true
    }
}

/// Whatever occupies a mount point.
#[derive(Debug)]
pub enum MountedElement {
    /// A card form.
    Form(Box<ElementLifecycle>),
    /// A continuation step.
    Continuation(ContinuationElement),
}

impl MountedElement {
    /// Forwarder a successor of this element should inherit.
    pub fn forwarder(&self) -> DetailsForwarder {
        match self {
            Self::Form(element) => element.forwarder().clone(),
            Self::Continuation(continuation) => continuation.forwarder.clone(),
        }
    }

    /// The form, if this is one.
    pub fn as_form(&self) -> Option<&ElementLifecycle> {
        match self {
            Self::Form(element) => Some(element),
            Self::Continuation(_) => None,
        }
    }

    /// The continuation, if this is one.
    pub fn as_continuation(&self) -> Option<&ContinuationElement> {
        match self {
            Self::Form(_) => None,
            Self::Continuation(continuation) => Some(continuation),
        }
    }

    fn unmount(&mut self) {
        if let Self::Form(element) = self {
            element.teardown();
        }
    }
}

/// Builds continuation elements.
pub trait ActionFactory: Send {
    /// Build an element for `action`, or `None` if this type is unsupported.
    fn create(
        &mut self,
        kind: ActionType,
        action: &PaymentAction,
        forwarder: DetailsForwarder,
    ) -> Option<ContinuationElement>;
}

/// Factory supporting a fixed set of action types.
#[derive(Debug, Clone)]
pub struct DefaultActionFactory {
    supported: Vec<ActionType>,
}

impl DefaultActionFactory {
    /// Support only `kinds`.
    pub fn only(kinds: impl IntoIterator<Item = ActionType>) -> Self {
        Self { supported: kinds.into_iter().collect() }
    }
}

impl Default for DefaultActionFactory {
    fn default() -> Self {
        Self::only([
            ActionType::Redirect,
            ActionType::ThreeDs2,
            ActionType::QrCode,
            ActionType::Await,
            ActionType::Voucher,
            ActionType::Sdk,
        ])
    }
}

impl ActionFactory for DefaultActionFactory {
    fn create(
        &mut self,
        kind: ActionType,
        action: &PaymentAction,
        forwarder: DetailsForwarder,
    ) -> Option<ContinuationElement> {
        self.supported
            .contains(&kind)
            .then(|| ContinuationElement::new(kind, action.clone(), forwarder))
    }
}

/// Result of a successful dispatch.
#[derive(Debug)]
pub struct Dispatched {
    /// Type of the mounted continuation.
    pub kind: ActionType,
    /// Element that was unmounted, already torn down.
    pub previous: Option<MountedElement>,
}

/// One element per mount point; actions swap it for a continuation.
pub struct ActionDispatcher<F = DefaultActionFactory> {
    factory: F,
    slots: HashMap<MountPoint, MountedElement>,
}

impl<F: ActionFactory> ActionDispatcher<F> {
    /// Create a dispatcher with nothing mounted.
    pub fn new(factory: F) -> Self {
        Self { factory, slots: HashMap::new() }
    }

    /// Mount `element` at `point`, unmounting and returning what was there.
    pub fn mount(&mut self, point: MountPoint, element: MountedElement) -> Option<MountedElement> {
        debug!(mount = %point, "element mounted");
        let mut previous = self.slots.insert(point, element)?;
        previous.unmount();
        Some(previous)
    }

    /// Unmount whatever is at `point`.
    pub fn unmount(&mut self, point: &MountPoint) -> Option<MountedElement> {
        let mut previous = self.slots.remove(point)?;
        previous.unmount();
        Some(previous)
    }

    /// What is mounted at `point`.
    pub fn mounted(&self, point: &MountPoint) -> Option<&MountedElement> {
        self.slots.get(point)
    }

    /// The form mounted at `point`, if a form is mounted there.
    pub fn form_mut(&mut self, point: &MountPoint) -> Option<&mut ElementLifecycle> {
        match self.slots.get_mut(point)? {
            MountedElement::Form(element) => Some(element),
            MountedElement::Continuation(_) => None,
        }
    }

    /// The continuation mounted at `point`, if one is mounted there.
    pub fn continuation_mut(&mut self, point: &MountPoint) -> Option<&mut ContinuationElement> {
        match self.slots.get_mut(point)? {
            MountedElement::Form(_) => None,
            MountedElement::Continuation(continuation) => Some(continuation),
        }
    }

    /// Number of occupied mount points.
    pub fn mounted_count(&self) -> usize {
        self.slots.len()
    }

    /// Replace the element at `point` with a continuation for `action`.
    ///
    /// The continuation forwards its additional details wherever the current
    /// element's details go.
    pub fn dispatch(
        &mut self,
        action: &PaymentAction,
        point: &MountPoint,
    ) -> Result<Dispatched, DispatchError> {
        let kind = match (&action.action_type, action.kind()) {
            (_, Some(kind)) => kind,
            (None, None) => return Err(InvalidAction::MissingType.into()),
            (Some(unknown), None) => {
                return Err(InvalidAction::UnknownType(unknown.clone()).into());
            },
        };

        let forwarder =
            self.slots.get(point).map_or_else(DetailsForwarder::discard, MountedElement::forwarder);
        let successor = self
            .factory
            .create(kind, action, forwarder)
            .ok_or(InvalidAction::NoSuccessor(kind))?;

        let previous = self.slots.insert(point.clone(), MountedElement::Continuation(successor));
        let previous = previous.map(|mut element| {
            element.unmount();
            element
        });

        info!(mount = %point, %kind, "continuation mounted");
        Ok(Dispatched { kind, previous })
    }
}

impl<F> fmt::Debug for ActionDispatcher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDispatcher").field("slots", &self.slots).finish_non_exhaustive()
    }
}
