//! Async runtime for one mounted element.
//!
//! [`Runtime`] is the only async piece. It waits on frame envelopes,
//! forwarded continuation details and the encryption deadline, turns each
//! into an [`ElementEvent`] and executes the resulting actions against the
//! embedder's [`ElementCallbacks`] and the [`ActionDispatcher`].

use std::collections::VecDeque;

use securefield_core::{Environment, InboundMessage};
use securefield_proto::PaymentAction;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    callbacks::ElementCallbacks,
    dispatcher::{
        ActionDispatcher, ActionFactory, ContinuationElement, DefaultActionFactory,
        DetailsForwarder, MountPoint, MountedElement,
    },
    error::RuntimeError,
    lifecycle::{AdditionalDetails, ElementAction, ElementEvent, ElementLifecycle},
};

/// Event loop driving one element and whatever replaces it.
pub struct Runtime<E, C, F = DefaultActionFactory>
where
    E: Environment,
    C: ElementCallbacks,
    F: ActionFactory,
{
    env: E,
    callbacks: C,
    dispatcher: ActionDispatcher<F>,
    mount_point: MountPoint,
    /// Original element once a continuation has replaced it.
    origin: Option<Box<ElementLifecycle>>,
    inbound: mpsc::UnboundedReceiver<InboundMessage>,
    details: mpsc::UnboundedReceiver<AdditionalDetails>,
}

impl<E, C, F> Runtime<E, C, F>
where
    E: Environment,
    C: ElementCallbacks,
    F: ActionFactory,
{
    /// Mount `element` at `mount_point` and drive it.
    ///
    /// `inbound` carries raw envelopes from every field frame of the element.
    pub fn new(
        env: E,
        callbacks: C,
        factory: F,
        mount_point: MountPoint,
        element: ElementLifecycle,
        inbound: mpsc::UnboundedReceiver<InboundMessage>,
    ) -> Self {
        let (details_tx, details) = mpsc::unbounded_channel();
        let forwarder = DetailsForwarder::new(move |forwarded| {
            if details_tx.send(forwarded).is_err() {
                debug!("runtime stopped; additional details dropped");
            }
        });

        let mut dispatcher = ActionDispatcher::new(factory);
        dispatcher.mount(
            mount_point.clone(),
            MountedElement::Form(Box::new(element.with_forwarder(forwarder))),
        );

        Self { env, callbacks, dispatcher, mount_point, origin: None, inbound, details }
    }

    /// The original element, mounted or not.
    pub fn element(&self) -> Option<&ElementLifecycle> {
        self.origin.as_deref().or_else(|| {
            self.dispatcher.mounted(&self.mount_point).and_then(MountedElement::as_form)
        })
    }

    /// Mount slots.
    pub fn dispatcher(&self) -> &ActionDispatcher<F> {
        &self.dispatcher
    }

    /// Embedder callbacks.
    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    /// Continuation currently mounted, if any.
    pub fn continuation_mut(&mut self) -> Option<&mut ContinuationElement> {
        self.dispatcher.continuation_mut(&self.mount_point)
    }

    /// Shopper pressed pay.
    pub async fn submit(&mut self) -> Result<(), RuntimeError> {
        self.process(ElementEvent::Submit).await
    }

    /// Mount a continuation for `action`.
    pub async fn handle_action(&mut self, action: PaymentAction) -> Result<(), RuntimeError> {
        self.process(ElementEvent::ActionReceived(action)).await
    }

    /// The payment finished outside the submit handler.
    pub async fn complete(&mut self, state: Value) -> Result<(), RuntimeError> {
        self.process(ElementEvent::Completed(state)).await
    }

    /// Wait for the next frame message, forwarded detail or deadline and
    /// process it.
    pub async fn step(&mut self) -> Result<(), RuntimeError> {
        let deadline =
            self.element().and_then(|element| element.registry().encryption_deadline());
        let timer = {
            let env = self.env.clone();
            let wait = deadline.map(|deadline| deadline.saturating_duration_since(env.now()));
            async move {
                match wait {
                    Some(wait) => env.sleep(wait).await,
                    None => std::future::pending().await,
                }
            }
        };

        let event = tokio::select! {
            biased;
            inbound = self.inbound.recv() => match inbound {
                Some(message) => ElementEvent::Inbound(message),
                None => return Err(RuntimeError::InboundClosed),
            },
            Some(details) = self.details.recv() => ElementEvent::AdditionalDetails(details),
            () = timer => ElementEvent::Tick,
        };

        self.process(event).await
    }

    /// Process events until every frame sender is gone, then tear down.
    pub async fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            match self.step().await {
                Ok(()) => {},
                Err(RuntimeError::InboundClosed) => {
                    self.shutdown();
                    return Ok(());
                },
                Err(err) => return Err(err),
            }
        }
    }

    /// Unmount everything.
    pub fn shutdown(&mut self) {
        self.dispatcher.unmount(&self.mount_point);
        if let Some(origin) = &mut self.origin {
            origin.teardown();
        }
        debug!(mount = %self.mount_point, "runtime shut down");
    }

    async fn process(&mut self, event: ElementEvent) -> Result<(), RuntimeError> {
        let mut queue = VecDeque::from(self.feed(event)?);

        while let Some(action) = queue.pop_front() {
            match action {
                ElementAction::Changed(state) => self.callbacks.on_change(&state).await,
                ElementAction::Valid(state) => self.callbacks.on_valid(&state).await,
                ElementAction::ShowValidation => self.callbacks.show_validation(),
                ElementAction::SetStatus(status) => self.callbacks.set_status(status),
                ElementAction::Submit(state) => {
                    let outcome = self.callbacks.on_submit(&state).await;
                    queue.extend(self.feed(ElementEvent::SubmitResolved(outcome))?);
                },
                ElementAction::Error(err) => self.callbacks.on_error(&err).await,
                ElementAction::Complete(state) => self.callbacks.on_complete(&state).await,
                ElementAction::HandleAction(action) => {
                    let event = match self.dispatcher.dispatch(&action, &self.mount_point) {
                        Ok(dispatched) => {
                            if let Some(MountedElement::Form(element)) = dispatched.previous {
                                self.origin = Some(element);
                            }
                            ElementEvent::ActionMounted
                        },
                        Err(err) => {
                            warn!(error = %err, "action dispatch failed");
                            ElementEvent::ActionFailed(err)
                        },
                    };
                    queue.extend(self.feed(event)?);
                },
                ElementAction::AdditionalDetails(details) => {
                    self.callbacks.on_additional_details(&details).await;
                },
            }
        }

        Ok(())
    }

    fn feed(&mut self, event: ElementEvent) -> Result<Vec<ElementAction>, RuntimeError> {
        let now = self.env.now();
        let element = match &mut self.origin {
            Some(origin) => Some(&mut **origin),
            None => self.dispatcher.form_mut(&self.mount_point),
        };
        let element =
            element.ok_or_else(|| RuntimeError::NotMounted(self.mount_point.to_string()))?;
        Ok(element.handle(event, now))
    }
}
