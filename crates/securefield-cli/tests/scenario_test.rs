//! Every scenario ends the way it claims to, on a virtual clock.

use insta::assert_snapshot;
use securefield_cli::{Scenario, ScenarioConfig, run_scenario};
use securefield_element::{ElementStatus, UiStatus};
use securefield_harness::SimEnv;

#[tokio::test]
async fn happy_path_completes() {
    let report =
        run_scenario(SimEnv::new(), Scenario::Happy, &ScenarioConfig::default(), 1).await.unwrap();

    Scenario::Happy.verify(&report).unwrap();
    assert_eq!(report.submitted, 1);
    assert_eq!(report.statuses, [UiStatus::Loading, UiStatus::Success]);
    assert_eq!(report.final_status, Some(ElementStatus::Success));
    assert_eq!(report.elapsed_ms, 0);
}

#[tokio::test]
async fn invalid_card_is_not_submitted() {
    let report = run_scenario(SimEnv::new(), Scenario::Invalid, &ScenarioConfig::default(), 1)
        .await
        .unwrap();

    Scenario::Invalid.verify(&report).unwrap();
    assert_eq!(report.final_status, Some(ElementStatus::Error));
    assert!(report.statuses.is_empty());
}

#[tokio::test]
async fn silent_cvc_times_out() {
    let report = run_scenario(SimEnv::new(), Scenario::Timeout, &ScenarioConfig::default(), 1)
        .await
        .unwrap();

    Scenario::Timeout.verify(&report).unwrap();
    assert_eq!(report.elapsed_ms, 10_000);
    assert_eq!(report.statuses, [UiStatus::Loading, UiStatus::Ready]);
    assert_snapshot!(
        report.errors.join("\n"),
        @"encryption timed out after 10s; no response from [EncryptedSecurityCode]"
    );
}

#[tokio::test]
async fn configured_timeout_is_honoured() {
    let config =
        ScenarioConfig::parse(r#"{ "element": { "encryptionTimeoutMs": 2500 } }"#).unwrap();

    let report = run_scenario(SimEnv::new(), Scenario::Timeout, &config, 1).await.unwrap();

    assert_eq!(report.elapsed_ms, 2_500);
}

#[tokio::test]
async fn challenge_forwards_details() {
    let report = run_scenario(SimEnv::new(), Scenario::Challenge, &ScenarioConfig::default(), 1)
        .await
        .unwrap();

    Scenario::Challenge.verify(&report).unwrap();
    assert_eq!(report.submitted, 1);
    assert_eq!(report.final_status, Some(ElementStatus::Idle));
}

#[tokio::test]
async fn bcmc_card_needs_no_security_code() {
    let config = ScenarioConfig::parse(r#"{ "cardNumber": "6703444444444449" }"#).unwrap();

    let report = run_scenario(SimEnv::new(), Scenario::Timeout, &config, 1).await.unwrap();

    // The silent frame is hidden, so the round never waits on it.
    assert_eq!(report.submitted, 1);
    assert!(Scenario::Timeout.verify(&report).is_err());
}
