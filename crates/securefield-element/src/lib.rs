//! Secure card-field element
//!
//! The host-side element that turns a set of secure fields into a payment:
//! validate, encrypt, hand the snapshot to the embedder, and swap in a
//! continuation element when the backend answers with an action.
//!
//! # Components
//!
//! - [`ElementLifecycle`]: action-based state machine (no I/O, time passed in)
//! - [`ActionDispatcher`]: one element per mount point; actions replace it
//! - [`PaymentMethodVariant`]: card and stored-card validation and submit data
//! - [`ElementCallbacks`]: embedder hooks
//! - [`Runtime`]: async loop feeding frame messages and timers into the
//!   lifecycle and executing its actions

mod callbacks;
mod config;
mod dispatcher;
mod error;
mod lifecycle;
mod runtime;
mod variant;

pub use callbacks::{ElementCallbacks, NoopCallbacks};
pub use config::{DEFAULT_ENCRYPTION_TIMEOUT_MS, ElementConfig, PaymentAmount};
pub use dispatcher::{
    ActionDispatcher, ActionFactory, ContinuationElement, DefaultActionFactory, DetailsForwarder,
    Dispatched, MountPoint, MountedElement,
};
pub use error::{DispatchError, ElementError, InvalidAction, RuntimeError};
pub use lifecycle::{
    AdditionalDetails, ElementAction, ElementEvent, ElementLifecycle, ElementStatus, SubmitOutcome,
    SubmitState, UiStatus, ValidState,
};
pub use runtime::Runtime;
pub use variant::{
    CardVariant, PaymentMethodVariant, SCHEME, StoredCardVariant, Submittable, Validatable,
};
