// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reactor stop-condition tests.

use orket_odr::{run_round, ReactorConfig, ReactorState, StopReason};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn architect(requirement: &str) -> String {
    [
        "### REQUIREMENT",
        requirement,
        "### CHANGELOG",
        "- revised per audit",
        "### ASSUMPTIONS",
        "- workers remain reachable",
        "### OPEN_QUESTIONS",
        "",
    ]
    .join("\n")
}

fn auditor() -> String {
    [
        "### CRITIQUE",
        "- tighten the retry wording",
        "### PATCHES",
        "### EDGE_CASES",
        "- empty worker pool",
        "### TEST_GAPS",
        "",
    ]
    .join("\n")
}

const REQ_A: &str = "The coordinator shall hand out leases and reclaim them after expiry.";
const REQ_B: &str =
    "The coordinator shall hand out leases, renew them on request, reclaim them after \
     expiry, and publish exactly one terminal result for every card it owns.";

// ---------------------------------------------------------------------------
// Stop conditions
// ---------------------------------------------------------------------------

#[test]
fn diff_floor_stops_after_stable_rounds() {
    let cfg = ReactorConfig::default();
    let mut state = ReactorState::new();

    run_round(&mut state, &architect(REQ_A), &auditor(), &cfg);
    assert_eq!(state.stop_reason, None);
    run_round(&mut state, &architect(REQ_A), &auditor(), &cfg);
    assert_eq!(state.stop_reason, None);
    assert_eq!(state.stable_count, 1);
    run_round(&mut state, &architect(REQ_A), &auditor(), &cfg);
    assert_eq!(state.stop_reason, Some(StopReason::DiffFloor));
    assert_eq!(state.history_rounds.last().unwrap().metrics.stable_count, 2);
}

#[test]
fn circularity_detects_a_loop_back() {
    let cfg = ReactorConfig::default();
    let mut state = ReactorState::new();

    run_round(&mut state, &architect(REQ_A), &auditor(), &cfg);
    run_round(&mut state, &architect(REQ_B), &auditor(), &cfg);
    run_round(&mut state, &architect(REQ_A), &auditor(), &cfg);

    assert_eq!(state.stop_reason, Some(StopReason::Circularity));
    let metrics = &state.history_rounds.last().unwrap().metrics;
    assert_eq!(metrics.sim_loop, Some(1.0));
    assert!(metrics.sim_loop > metrics.sim_prev);
}

#[test]
fn max_rounds_fires_at_exactly_n_and_then_noops() {
    let cfg = ReactorConfig {
        max_rounds: 2,
        stable_rounds: 10,
        ..ReactorConfig::default()
    };
    let mut state = ReactorState::new();

    run_round(&mut state, &architect(REQ_A), &auditor(), &cfg);
    assert_eq!(state.stop_reason, None);
    run_round(&mut state, &architect(REQ_B), &auditor(), &cfg);
    assert_eq!(state.stop_reason, Some(StopReason::MaxRounds));
    assert_eq!(state.history_rounds.len(), 2);

    // Stopped reactors ignore further input entirely.
    run_round(&mut state, &architect(REQ_A), &auditor(), &cfg);
    assert_eq!(state.history_rounds.len(), 2);
    assert_eq!(state.history_v.len(), 2);
}

#[test]
fn code_leak_stops_before_parsing() {
    let cfg = ReactorConfig::default();
    let mut state = ReactorState::new();
    let leaky = format!("{}\n```rust\nfn main() {{}}\n```", architect(REQ_A));

    run_round(&mut state, &leaky, &auditor(), &cfg);
    assert_eq!(state.stop_reason, Some(StopReason::CodeLeak));
    let record = &state.history_rounds[0];
    assert!(record.metrics.code_leak_hit);
    assert!(record.architect_parsed.is_none());
    assert!(state.history_v.is_empty());
}

#[test]
fn shape_violation_reports_the_offending_source() {
    let cfg = ReactorConfig::default();
    let mut state = ReactorState::new();

    run_round(&mut state, &architect(REQ_A), "not auditor shaped", &cfg);
    assert_eq!(state.stop_reason, Some(StopReason::ShapeViolation));
    let record = &state.history_rounds[0];
    assert_eq!(record.parse_errors.len(), 1);
    assert_eq!(record.parse_errors[0].source, "auditor");
    assert_eq!(record.parse_errors[0].code, "MISSING_HEADER");
    // The attempted requirement was not accepted.
    assert!(state.history_v.is_empty());
}

// ---------------------------------------------------------------------------
// Records and determinism
// ---------------------------------------------------------------------------

#[test]
fn records_carry_normalized_inputs_and_config() {
    let cfg = ReactorConfig::default();
    let mut state = ReactorState::new();
    let crlf_architect = architect(REQ_A).replace('\n', "\r\n");

    run_round(&mut state, &crlf_architect, &auditor(), &cfg);
    let record = &state.history_rounds[0];
    assert_eq!(record.round, 1);
    assert!(!record.architect_raw.contains('\r'));
    assert_eq!(record.run_config, cfg);
    assert_eq!(record.metrics.n, 1);
    assert_eq!(record.metrics.diff_ratio, None);
}

#[test]
fn identical_inputs_reproduce_identical_histories() {
    let cfg = ReactorConfig::default();
    let inputs = [
        (architect(REQ_A), auditor()),
        (architect(REQ_B), auditor()),
        (architect(REQ_A), auditor()),
    ];

    let mut first = ReactorState::new();
    let mut second = ReactorState::new();
    for (a, b) in &inputs {
        run_round(&mut first, a, b, &cfg);
        run_round(&mut second, a, b, &cfg);
    }
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}
