//! Deterministic simulation harness for secure card fields.
//!
//! Simulated frames that validate, detect brands and encrypt the way the
//! sandboxed field pages do, a virtual clock, recording callbacks, and a
//! reference model for model-based testing. Everything is seeded and
//! in-memory, so a failing sequence replays exactly.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod callbacks;
pub mod model;
pub mod scenario;
pub mod sim_env;
pub mod sim_frame;

pub use callbacks::{CallbackRecord, RecordingCallbacks};
pub use model::{
    FormModel, InputKind, MODEL_FIELDS, ModelField, Operation, SimBrand, SubmitExpectation,
    model_field,
};
pub use scenario::{CardForm, CardFormBuilder, valid_input};
pub use sim_env::SimEnv;
pub use sim_frame::{
    FRAME_ORIGIN, FrameHandle, Outbox, SimFrame, SimFramePort, attach_frame, detect_brand,
    validate_input,
};
