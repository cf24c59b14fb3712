//! Scenario flows.
//!
//! Each run builds an element from [`ScenarioConfig`], attaches a simulated
//! frame per field, types into them and presses pay. The runtime loop is
//! stepped until it goes quiet; an open encryption round always finishes,
//! either by the frames answering or by the deadline firing.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use clap::ValueEnum;
use securefield_core::{AggregateFormState, Environment};
use securefield_element::{
    AdditionalDetails, DefaultActionFactory, ElementCallbacks, ElementError, ElementLifecycle,
    ElementStatus, MountPoint, PaymentMethodVariant, Runtime, SubmitOutcome, SubmitState,
    UiStatus, ValidState, Validatable,
};
use securefield_harness::{FrameHandle, Outbox, attach_frame, valid_input};
use securefield_proto::{FieldName, PaymentAction};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::{config::ScenarioConfig, error::CliError};

/// How long the loop must stay idle before a step counts as settled.
const QUIET: Duration = Duration::from_millis(50);

/// Flow to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Scenario {
    /// Valid card, backend authorises immediately.
    Happy,
    /// Incomplete card number; submit shows validation.
    Invalid,
    /// Security code frame never answers; the round times out.
    Timeout,
    /// Backend asks for a 3-D Secure challenge.
    Challenge,
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Happy => "happy",
            Self::Invalid => "invalid",
            Self::Timeout => "timeout",
            Self::Challenge => "challenge",
        };
        f.write_str(name)
    }
}

impl Scenario {
    fn submit_outcome(self) -> SubmitOutcome {
        match self {
            Self::Happy => SubmitOutcome::Completed(json!({ "resultCode": "Authorised" })),
            Self::Challenge => SubmitOutcome::Action(
                PaymentAction::new("threeDS2").with("token", "sim-challenge-token"),
            ),
            Self::Invalid | Self::Timeout => SubmitOutcome::Pending,
        }
    }

    /// Check that `report` is how this flow should end.
    pub fn verify(self, report: &ScenarioReport) -> Result<(), CliError> {
        let reason = match self {
            Self::Happy if !report.completed => Some("payment did not complete"),
            Self::Invalid if report.validation_shown == 0 => Some("validation was not shown"),
            Self::Invalid if report.submitted > 0 => Some("invalid card was submitted"),
            Self::Timeout if report.submitted > 0 => Some("round completed despite silent frame"),
            Self::Timeout if report.errors.is_empty() => Some("no timeout error reported"),
            Self::Challenge if report.additional_details != 1 => {
                Some("challenge result was not forwarded")
            },
            _ => None,
        };

        match reason {
            Some(reason) => Err(CliError::Unexpected { scenario: self, reason: reason.to_owned() }),
            None => Ok(()),
        }
    }
}

/// What the embedder saw during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    /// `on_submit` calls.
    pub submitted: usize,
    /// `on_change` calls.
    pub changes: usize,
    /// `show_validation` calls.
    pub validation_shown: usize,
    /// Statuses pushed to the presenter, in order.
    pub statuses: Vec<UiStatus>,
    /// Errors reported, rendered.
    pub errors: Vec<String>,
    /// `on_additional_details` calls.
    pub additional_details: usize,
    /// `on_complete` was called.
    pub completed: bool,
    /// Lifecycle status at the end of the run.
    pub final_status: Option<ElementStatus>,
    /// Time that passed on the run's clock, in milliseconds.
    pub elapsed_ms: u64,
}

/// Callbacks that log every call and fill a [`ScenarioReport`].
#[derive(Debug)]
struct ReportingCallbacks {
    outcome: Option<SubmitOutcome>,
    report: ScenarioReport,
}

#[async_trait]
impl ElementCallbacks for ReportingCallbacks {
    async fn on_submit(&mut self, state: &SubmitState) -> SubmitOutcome {
        self.report.submitted += 1;
        let fields = state.data["paymentMethod"].as_object().map_or(0, Map::len);
        info!(fields, "payment data submitted");
        self.outcome.take().unwrap_or(SubmitOutcome::Pending)
    }

    async fn on_change(&mut self, state: &AggregateFormState) {
        self.report.changes += 1;
        debug!(
            valid = state.is_valid,
            brand = ?state.brand,
            errors = state.errors.len(),
            "form changed"
        );
    }

    async fn on_valid(&mut self, _state: &ValidState) {
        debug!("form valid");
    }

    async fn on_error(&mut self, error: &ElementError) {
        warn!(%error, "element error");
        self.report.errors.push(error.to_string());
    }

    async fn on_additional_details(&mut self, details: &AdditionalDetails) {
        self.report.additional_details += 1;
        info!(keys = details.details.len(), "additional details received");
    }

    async fn on_complete(&mut self, state: &Value) {
        self.report.completed = true;
        info!(result = %state, "payment complete");
    }

    fn show_validation(&mut self) {
        self.report.validation_shown += 1;
        info!("showing validation errors");
    }

    fn set_status(&mut self, status: UiStatus) {
        debug!(?status, "status");
        self.report.statuses.push(status);
    }
}

type ScenarioRuntime<E> = Runtime<E, ReportingCallbacks>;

/// Run `scenario` on `env`'s clock.
pub async fn run_scenario<E: Environment>(
    env: E,
    scenario: Scenario,
    config: &ScenarioConfig,
    seed: u64,
) -> Result<ScenarioReport, CliError> {
    let started = env.now();
    let variant = PaymentMethodVariant::card(&config.card);
    let fields = variant.fields().to_vec();
    let mut element = ElementLifecycle::new(config.element.clone(), variant, config.card.clone());

    let (outbox, inbound) = Outbox::channel();
    let frames: Vec<(FieldName, FrameHandle)> = fields
        .iter()
        .map(|field| (*field, attach_frame(element.registry_mut(), *field, &outbox, seed)))
        .collect();
    drop(outbox);

    let callbacks = ReportingCallbacks {
        outcome: Some(scenario.submit_outcome()),
        report: ScenarioReport::default(),
    };
    let mut runtime = Runtime::new(
        env.clone(),
        callbacks,
        DefaultActionFactory::default(),
        MountPoint::new("#card-container"),
        element,
        inbound,
    );
    info!(%scenario, fields = frames.len(), "scenario started");

    for (field, frame) in &frames {
        let text = match (scenario, *field) {
            (Scenario::Invalid, FieldName::EncryptedCardNumber) => "4111",
            (_, FieldName::EncryptedCardNumber) => config.card_number.as_str(),
            (_, other) => valid_input(other),
        };
        frame.type_text(text);
        if scenario == Scenario::Timeout && *field == FieldName::EncryptedSecurityCode {
            frame.set_responsive(false);
        }
    }
    settle(&mut runtime).await?;

    runtime.submit().await?;
    settle(&mut runtime).await?;

    if let Some(continuation) = runtime.continuation_mut() {
        info!(kind = %continuation.kind(), "continuation mounted; completing challenge");
        let mut details = Map::new();
        details.insert("threeDSResult".to_owned(), Value::from("sim-result"));
        continuation.submit_additional_details(AdditionalDetails {
            details,
            payment_data: Some("sim-payment-data".to_owned()),
        });
        settle(&mut runtime).await?;
    }

    let final_status = runtime.element().map(ElementLifecycle::status);
    runtime.shutdown();

    let mut report = runtime.callbacks().report.clone();
    report.final_status = final_status;
    report.elapsed_ms =
        u64::try_from(env.now().saturating_duration_since(started).as_millis()).unwrap_or(u64::MAX);
    info!(%scenario, ?final_status, "scenario finished");
    Ok(report)
}

/// Step until no message is queued and no encryption round is open.
async fn settle<E: Environment>(runtime: &mut ScenarioRuntime<E>) -> Result<(), CliError> {
    loop {
        let encrypting =
            runtime.element().is_some_and(|element| element.registry().is_encrypting());
        if encrypting {
            runtime.step().await?;
            continue;
        }

        match tokio::time::timeout(QUIET, runtime.step()).await {
            Ok(result) => result?,
            Err(_) => return Ok(()),
        }
    }
}
