//! Element error types.

use std::time::Duration;

use securefield_core::RegistryError;
use securefield_proto::{ActionType, FieldName};
use thiserror::Error;

/// Failure surfaced to the embedder through `on_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElementError {
    /// Not every frame returned a token before the deadline.
    #[error("encryption timed out after {waited:?}; no response from {missing:?}")]
    EncryptionTimeout {
        /// Fields that never answered.
        missing: Vec<FieldName>,
        /// Time spent waiting.
        waited: Duration,
    },

    /// The encryption round could not be opened.
    #[error("encryption failed: {0}")]
    Encryption(RegistryError),

    /// The variant's pre-submit hook refused to start.
    #[error("payment could not start: {0}")]
    StartPayment(String),

    /// The embedder's submit handler rejected the payment.
    #[error("submit rejected: {0}")]
    SubmitRejected(String),

    /// A payment action could not be turned into an element.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl From<RegistryError> for ElementError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::EncryptionTimeout { missing, waited } => {
                Self::EncryptionTimeout { missing, waited }
            },
            other => Self::Encryption(other),
        }
    }
}

/// Why an action was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidAction {
    /// The action has no `type`.
    #[error("action has no type")]
    MissingType,

    /// The `type` is not one we know.
    #[error("unrecognized action type {0:?}")]
    UnknownType(String),

    /// The factory cannot build an element for this type.
    #[error("no element handles {0} actions")]
    NoSuccessor(ActionType),
}

/// Action dispatch failure. Nothing is mounted or unmounted when returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The action cannot be handled.
    #[error("invalid action: {0}")]
    InvalidAction(#[from] InvalidAction),
}

/// Runtime loop failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// No element is mounted at the runtime's mount point.
    #[error("no element mounted at {0}")]
    NotMounted(String),

    /// Every frame sender has been dropped.
    #[error("frame message stream closed")]
    InboundClosed,
}
